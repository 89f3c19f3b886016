use log::info;
use mongodb::bson::{doc, oid::ObjectId};
use rocket::{response::status::Created, serde::json::Json, Route, State};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        problem::{ProblemDescription, ProblemSpec},
        query::ListQuery,
        survey::{SurveyDescription, SurveySpec, SurveySummary},
    },
    auth::Viewer,
    db::{
        problem::{NewProblem, Problem},
        survey::{NewSurvey, Survey},
    },
    lifecycle::{self, return_updated, Lifecycle, Transition},
    mongodb::{inserted_id, numeric_id_filter, Coll, Counter, MongoCollection},
};

use super::common::{created, list_by_id, set_with_timestamp};

pub fn routes() -> Vec<Route> {
    routes![
        create_survey,
        list_surveys,
        get_survey,
        rename_survey,
        delete_survey,
        recover_survey,
        create_problem,
    ]
}

#[post("/", data = "<spec>", format = "json")]
async fn create_survey(
    viewer: Viewer,
    config: &State<Config>,
    spec: Json<SurveySpec>,
    surveys: Coll<Survey>,
    new_surveys: Coll<NewSurvey>,
    counters: Coll<Counter>,
) -> Result<Created<Json<SurveySummary>>> {
    viewer.require_admin(config)?;
    let name = spec.name()?;
    Survey::ensure_name_free(&surveys, name, None).await?;

    let id = Counter::next(&counters, Survey::NAME).await?;
    let survey = NewSurvey::new(id, name.to_string());
    let object_id = inserted_id(&new_surveys.insert_one(&survey, None).await?)?;
    info!("Created survey {id} '{name}'");

    let survey = Survey {
        object_id,
        survey,
    };
    Ok(created(
        format!("/api/survey/{id}"),
        SurveySummary::new(survey, 0),
    ))
}

#[get("/?<query..>")]
async fn list_surveys(
    viewer: Viewer,
    config: &State<Config>,
    query: ListQuery,
    surveys: Coll<Survey>,
    problems: Coll<Problem>,
) -> Result<Json<Vec<SurveySummary>>> {
    if query.is_deleted {
        viewer.require_admin(config)?;
    }
    let found = list_by_id(&surveys, query.state().filter()).await?;
    let mut summaries = Vec::with_capacity(found.len());
    for survey in found {
        summaries.push(summarize(survey, &problems).await?);
    }
    Ok(Json(summaries))
}

/// Summarise a survey, counting only the linked problems that are live.
async fn summarize(survey: Survey, problems: &Coll<Problem>) -> Result<SurveySummary> {
    let linked: Vec<ObjectId> = survey.problems.iter().map(|id| **id).collect();
    let filter = Lifecycle::Active.restrict(doc! { "_id": { "$in": linked } });
    let count = problems.count_documents(filter, None).await?;
    Ok(SurveySummary::new(survey, count))
}

#[get("/<id>")]
async fn get_survey(
    id: u32,
    surveys: Coll<Survey>,
    problems: Coll<Problem>,
) -> Result<Json<SurveyDescription>> {
    let survey = Survey::live(&surveys, id).await?;
    let filter = Lifecycle::Active.restrict(doc! {
        "_id": { "$in": survey.problems.iter().map(|id| **id).collect::<Vec<_>>() },
    });
    let mut live_problems = list_by_id(&problems, filter).await?;
    live_problems.sort_by_key(|problem| problem.problem_id);
    Ok(Json(SurveyDescription::new(survey, live_problems)))
}

#[put("/<id>", data = "<spec>", format = "json")]
async fn rename_survey(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    spec: Json<SurveySpec>,
    surveys: Coll<Survey>,
    problems: Coll<Problem>,
) -> Result<Json<SurveySummary>> {
    viewer.require_admin(config)?;
    let name = spec.name()?;
    let survey = Survey::live(&surveys, id).await?;
    Survey::ensure_name_free(&surveys, name, Some(survey.object_id)).await?;

    let update = set_with_timestamp(doc! { "name": name });
    let renamed = surveys
        .find_one_and_update(Lifecycle::Active.restrict(survey.object_id.as_doc()), update, return_updated())
        .await?
        .ok_or_else(|| Error::not_found(format!("Survey {id}")))?;
    info!("Renamed survey {id} to '{name}'");
    Ok(Json(summarize(renamed, &problems).await?))
}

#[delete("/<id>")]
async fn delete_survey(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    surveys: Coll<Survey>,
    problems: Coll<Problem>,
) -> Result<Json<SurveySummary>> {
    viewer.require_admin(config)?;
    let survey = lifecycle::apply(
        &surveys,
        numeric_id_filter(id),
        Transition::Delete,
        format!("Survey {id}"),
    )
    .await?;
    Ok(Json(summarize(survey, &problems).await?))
}

#[post("/<id>/recover")]
async fn recover_survey(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    surveys: Coll<Survey>,
    problems: Coll<Problem>,
) -> Result<Json<SurveySummary>> {
    viewer.require_admin(config)?;
    let survey = Survey::find(&surveys, id, Lifecycle::Deleted)
        .await?
        .ok_or_else(|| Error::not_found(format!("Deleted Survey {id}")))?;
    Survey::ensure_name_free(&surveys, &survey.name, Some(survey.object_id)).await?;

    let survey = lifecycle::apply(
        &surveys,
        numeric_id_filter(id),
        Transition::Recover,
        format!("Survey {id}"),
    )
    .await?;
    Ok(Json(summarize(survey, &problems).await?))
}

#[post("/<id>/problem", data = "<spec>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn create_problem(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    spec: Json<ProblemSpec>,
    surveys: Coll<Survey>,
    problems: Coll<Problem>,
    new_problems: Coll<NewProblem>,
    counters: Coll<Counter>,
) -> Result<Created<Json<ProblemDescription>>> {
    viewer.require_admin(config)?;
    let content = spec.content.trim();
    if content.is_empty() {
        return Err(Error::invalid_input("content must not be empty"));
    }
    let survey = Survey::live(&surveys, id).await?;
    Problem::ensure_number_free(&problems, id, spec.problem_id, None).await?;

    let problem_id = Counter::next(&counters, Problem::NAME).await?;
    let problem = NewProblem::new(problem_id, spec.problem_id, id, content.to_string());
    let object_id = inserted_id(&new_problems.insert_one(&problem, None).await?)?;

    // Link the problem to its survey.
    let link = doc! {
        "$push": { "problems": *object_id },
        "$currentDate": { "updatedAt": true },
    };
    surveys.update_one(survey.object_id.as_doc(), link, None).await?;
    info!("Created problem {problem_id} in survey {id}");

    let problem = Problem { object_id, problem };
    Ok(created(
        format!("/api/survey/problem/{problem_id}"),
        problem.into(),
    ))
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::Client,
        serde::json::{json, serde_json},
    };

    use super::*;
    use crate::error::ErrorBody;

    async fn create(client: &Client, auth: &Header<'static>, name: &str) -> SurveySummary {
        let response = client
            .post("/api/survey")
            .header(auth.clone())
            .header(ContentType::JSON)
            .body(json!({ "name": name }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        response.into_json().await.unwrap()
    }

    #[backend_test]
    async fn create_and_fetch(client: Client, auth: Header<'static>, db: Database) {
        let summary = create(&client, &auth, "Pets").await;
        assert_eq!(summary.id, 1);
        assert_eq!(summary.name, "Pets");
        assert!(!summary.is_deleted);

        let response = client
            .get(uri!("/api/survey", get_survey(summary.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let description: SurveyDescription = response.into_json().await.unwrap();
        assert_eq!(description.name, "Pets");
        assert!(description.problems.is_empty());

        // IDs keep counting.
        assert_eq!(create(&client, &auth, "Food").await.id, 2);
        let stored = Coll::<Survey>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(stored, 2);
    }

    #[backend_test]
    async fn duplicate_names_conflict_only_while_live(client: Client, auth: Header<'static>) {
        let first = create(&client, &auth, "Pets").await;

        let response = client
            .post("/api/survey")
            .header(auth.clone())
            .header(ContentType::JSON)
            .body(json!({ "name": "Pets" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert!(body.error.contains("already exists"));

        let response = client
            .delete(uri!("/api/survey", delete_survey(first.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let second = create(&client, &auth, "Pets").await;
        assert_ne!(first.id, second.id);
    }

    #[backend_test]
    async fn delete_then_recover_restores_everything(client: Client, auth: Header<'static>) {
        let created = create(&client, &auth, "Pets").await;

        let response = client
            .delete(uri!("/api/survey", delete_survey(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        let deleted: SurveySummary = response.into_json().await.unwrap();
        assert!(deleted.is_deleted);

        // Gone from detail queries, and cannot be deleted twice.
        let response = client
            .get(uri!("/api/survey", get_survey(created.id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
        let response = client
            .delete(uri!("/api/survey", delete_survey(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        let response = client
            .post(uri!("/api/survey", recover_survey(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let recovered: SurveySummary = response.into_json().await.unwrap();
        assert!(!recovered.is_deleted);
        assert_eq!(recovered.object_id, created.object_id);
        assert_eq!(recovered.name, created.name);
        assert_eq!(recovered.created_at, created.created_at);

        // Recovering a live survey fails.
        let response = client
            .post(uri!("/api/survey", recover_survey(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn recover_conflicts_with_reused_name(client: Client, auth: Header<'static>) {
        let first = create(&client, &auth, "Pets").await;
        client
            .delete(uri!("/api/survey", delete_survey(first.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        create(&client, &auth, "Pets").await;

        let response = client
            .post(uri!("/api/survey", recover_survey(first.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn listing_filters_by_state(client: Client, auth: Header<'static>) {
        let pets = create(&client, &auth, "Pets").await;
        let food = create(&client, &auth, "Food").await;
        client
            .delete(uri!("/api/survey", delete_survey(pets.id)))
            .header(auth.clone())
            .dispatch()
            .await;

        let response = client.get("/api/survey").dispatch().await;
        let live: Vec<SurveySummary> = response.into_json().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, food.id);

        // Deleted listings are for administrators only.
        let response = client.get("/api/survey?isDeleted").dispatch().await;
        assert_eq!(Status::Forbidden, response.status());

        let response = client
            .get("/api/survey?isDeleted")
            .header(auth.clone())
            .dispatch()
            .await;
        let deleted: Vec<SurveySummary> = response.into_json().await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, pets.id);
    }

    #[backend_test]
    async fn rename_checks_uniqueness(client: Client, auth: Header<'static>) {
        let pets = create(&client, &auth, "Pets").await;
        create(&client, &auth, "Food").await;

        let rename = |name: &'static str| {
            client
                .put(uri!("/api/survey", rename_survey(pets.id)))
                .header(auth.clone())
                .header(ContentType::JSON)
                .body(json!({ "name": name }).to_string())
                .dispatch()
        };
        assert_eq!(Status::Forbidden, rename("Food").await.status());
        // Keeping the current name is fine.
        assert_eq!(Status::Ok, rename("Pets").await.status());

        let renamed: SurveySummary = rename("Animals").await.into_json().await.unwrap();
        assert_eq!(renamed.name, "Animals");
        assert!(renamed.updated_at >= pets.updated_at);
    }

    #[backend_test(user)]
    async fn ordinary_users_cannot_administer(client: Client, auth: Header<'static>) {
        let response = client
            .post("/api/survey")
            .header(auth.clone())
            .header(ContentType::JSON)
            .body(json!({ "name": "Pets" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        let response = client
            .post("/api/survey")
            .header(ContentType::JSON)
            .body(json!({ "name": "Pets" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let body = response.into_string().await.unwrap();
        let body: ErrorBody = serde_json::from_str(&body).unwrap();
        assert!(body.error.starts_with("Unauthorized"));
    }

    #[backend_test]
    async fn problems_are_linked_to_their_survey(client: Client, auth: Header<'static>) {
        let survey = create(&client, &auth, "Pets").await;
        for (number, content) in [(2, "Second?"), (1, "First?")] {
            let response = client
                .post(uri!("/api/survey", create_problem(survey.id)))
                .header(auth.clone())
                .header(ContentType::JSON)
                .body(json!({ "problemId": number, "content": content }).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Created, response.status());
        }

        // Problem numbers are unique within the survey.
        let response = client
            .post(uri!("/api/survey", create_problem(survey.id)))
            .header(auth.clone())
            .header(ContentType::JSON)
            .body(json!({ "problemId": 1, "content": "Again?" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        let description: SurveyDescription = client
            .get(uri!("/api/survey", get_survey(survey.id)))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        let numbers: Vec<u32> = description.problems.iter().map(|p| p.problem_id).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[backend_test]
    async fn problem_count_ignores_deleted_problems(client: Client, auth: Header<'static>) {
        let survey = create(&client, &auth, "Pets").await;
        assert_eq!(survey.problem_count, 0);
        let mut problem_ids = Vec::new();
        for number in [1, 2] {
            let problem: ProblemDescription = client
                .post(uri!("/api/survey", create_problem(survey.id)))
                .header(auth.clone())
                .header(ContentType::JSON)
                .body(json!({ "problemId": number, "content": "Cats or dogs?" }).to_string())
                .dispatch()
                .await
                .into_json()
                .await
                .unwrap();
            problem_ids.push(problem.id);
        }

        let live: Vec<SurveySummary> = client
            .get("/api/survey")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(live[0].problem_count, 2);

        let response = client
            .delete(format!("/api/survey/problem/{}", problem_ids[0]))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let live: Vec<SurveySummary> = client
            .get("/api/survey")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(live[0].problem_count, 1);

        // Renaming reports the same count.
        let renamed: SurveySummary = client
            .put(uri!("/api/survey", rename_survey(survey.id)))
            .header(auth)
            .header(ContentType::JSON)
            .body(json!({ "name": "Animals" }).to_string())
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(renamed.problem_count, 1);
    }
}
