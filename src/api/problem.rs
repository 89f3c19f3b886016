use log::info;
use mongodb::{
    bson::{doc, to_bson, Document},
    options::FindOptions,
};
use rocket::{
    form::Form, fs::NamedFile, futures::TryStreamExt, response::status::Created,
    serde::json::Json, Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        answer::{AnswerDescription, AnswerSubmission},
        catalog::ImageUpload,
        problem::{ChoicePatch, ChoiceSpec, ProblemDescription, ProblemPatch},
    },
    auth::Viewer,
    db::{
        answer::{Answer, AnswerContent, NewAnswer},
        problem::{Choice, Problem, CHOICES},
        survey::Survey,
    },
    lifecycle::{self, return_updated, Lifecycle, Transition},
    mongodb::{inserted_id, numeric_id_filter, Coll},
    upload::{self, CHOICE_DIR},
};

use super::common::{created, set_with_timestamp};

pub fn routes() -> Vec<Route> {
    routes![
        get_problem,
        update_problem,
        delete_problem,
        recover_problem,
        submit_answer,
        list_answers,
        add_choice,
        update_choice,
        delete_choice,
        recover_choice,
        upload_choice_image,
        get_choice_image,
    ]
}

#[get("/<id>")]
async fn get_problem(
    id: u32,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    let problem = Problem::live(&problems, &surveys, id).await?;
    Ok(Json(problem.into()))
}

#[put("/<id>", data = "<patch>", format = "json")]
async fn update_problem(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    patch: Json<ProblemPatch>,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    viewer.require_admin(config)?;
    patch.ensure_not_empty()?;
    let problem = Problem::live(&problems, &surveys, id).await?;

    let mut fields = Document::new();
    if let Some(number) = patch.problem_id {
        if number != problem.problem_id {
            Problem::ensure_number_free(&problems, problem.survey_id, number, Some(problem.object_id))
                .await?;
        }
        fields.insert("problemId", i64::from(number));
    }
    if let Some(content) = &patch.content {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::invalid_input("content must not be empty"));
        }
        fields.insert("content", content);
    }

    let updated = problems
        .find_one_and_update(Problem::filter(id, Lifecycle::Active), set_with_timestamp(fields), return_updated())
        .await?
        .ok_or_else(|| Error::not_found(format!("Problem {id}")))?;
    info!("Updated problem {id}");
    Ok(Json(updated.into()))
}

#[delete("/<id>")]
async fn delete_problem(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    viewer.require_admin(config)?;
    Problem::live(&problems, &surveys, id).await?;
    let problem = lifecycle::apply(
        &problems,
        numeric_id_filter(id),
        Transition::Delete,
        format!("Problem {id}"),
    )
    .await?;
    Ok(Json(problem.into()))
}

#[post("/<id>/recover")]
async fn recover_problem(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    viewer.require_admin(config)?;
    let problem = Problem::find(&problems, id, Lifecycle::Deleted)
        .await?
        .ok_or_else(|| Error::not_found(format!("Deleted Problem {id}")))?;
    // The survey must be live for any of its problems to come back.
    Survey::live(&surveys, problem.survey_id).await?;
    Problem::ensure_number_free(
        &problems,
        problem.survey_id,
        problem.problem_id,
        Some(problem.object_id),
    )
    .await?;

    let problem = lifecycle::apply(
        &problems,
        numeric_id_filter(id),
        Transition::Recover,
        format!("Problem {id}"),
    )
    .await?;
    Ok(Json(problem.into()))
}

#[post("/<id>/answer", data = "<submission>", format = "json")]
async fn submit_answer(
    viewer: Viewer,
    id: u32,
    submission: Json<AnswerSubmission>,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
    new_answers: Coll<NewAnswer>,
) -> Result<Created<Json<AnswerDescription>>> {
    let content = AnswerContent::try_from(submission.into_inner().content)?;
    let problem = Problem::live(&problems, &surveys, id).await?;

    let answer = NewAnswer::new(problem.object_id, content, viewer.user_id());
    let object_id = inserted_id(&new_answers.insert_one(&answer, None).await?)?;
    info!("Recorded an answer to problem {id}");

    let answer = Answer { object_id, answer };
    Ok(created(
        format!("/api/survey/problem/{id}/answer"),
        AnswerDescription::new(answer, id),
    ))
}

#[get("/<id>/answer")]
async fn list_answers(
    id: u32,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
    answers: Coll<Answer>,
) -> Result<Json<Vec<AnswerDescription>>> {
    let problem = Problem::live(&problems, &surveys, id).await?;
    let found: Vec<Answer> = answers
        .find(
            doc! { "problem": *problem.object_id },
            FindOptions::builder().sort(doc! { "_id": 1 }).build(),
        )
        .await?
        .try_collect()
        .await?;
    let descriptions = found
        .into_iter()
        .map(|answer| AnswerDescription::new(answer, id))
        .collect();
    Ok(Json(descriptions))
}

#[post("/<id>/choice", data = "<spec>", format = "json")]
async fn add_choice(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    spec: Json<ChoiceSpec>,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Created<Json<ProblemDescription>>> {
    viewer.require_admin(config)?;
    let content = spec.content.trim();
    if content.is_empty() {
        return Err(Error::invalid_input("content must not be empty"));
    }
    Problem::live(&problems, &surveys, id).await?;

    // Only push if no live choice has the number, so concurrent adds cannot
    // both succeed.
    let mut filter = Problem::filter(id, Lifecycle::Active);
    filter.insert(
        CHOICES,
        doc! { "$not": { "$elemMatch": Choice::selector(spec.choice_num, Lifecycle::Active) } },
    );
    let choice = Choice::new(spec.choice_num, content.to_string());
    let update = doc! {
        "$push": { CHOICES: to_bson(&choice).map_err(|e| Error::Internal(e.to_string()))? },
        "$currentDate": { "updatedAt": true },
    };
    let updated = problems
        .find_one_and_update(filter, update, return_updated())
        .await?
        .ok_or_else(|| conflicting_choice(id, spec.choice_num))?;
    info!("Added choice {} to problem {id}", spec.choice_num);

    Ok(created(
        format!("/api/survey/problem/{id}"),
        updated.into(),
    ))
}

#[put("/<id>/choice/<num>", data = "<patch>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn update_choice(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    num: u32,
    patch: Json<ChoicePatch>,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    viewer.require_admin(config)?;
    patch.ensure_not_empty()?;
    let problem = Problem::live(&problems, &surveys, id).await?;
    if problem.live_choice(num).is_none() {
        return Err(missing_choice(id, num));
    }

    let mut fields = Document::new();
    if let Some(new_num) = patch.choice_num {
        if new_num != num && problem.live_choice(new_num).is_some() {
            return Err(conflicting_choice(id, new_num));
        }
        fields.insert(format!("{CHOICES}.$.choiceNum"), i64::from(new_num));
    }
    if let Some(content) = &patch.content {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::invalid_input("content must not be empty"));
        }
        fields.insert(format!("{CHOICES}.$.content"), content);
    }

    let updated = problems
        .find_one_and_update(
            Problem::choice_filter(id, num, Lifecycle::Active),
            set_with_timestamp(fields),
            return_updated(),
        )
        .await?
        .ok_or_else(|| missing_choice(id, num))?;
    info!("Updated choice {num} of problem {id}");
    Ok(Json(updated.into()))
}

#[delete("/<id>/choice/<num>")]
async fn delete_choice(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    num: u32,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    viewer.require_admin(config)?;
    Problem::live(&problems, &surveys, id).await?;
    let problem = lifecycle::apply_embedded(
        &problems,
        Problem::filter(id, Lifecycle::Active),
        CHOICES,
        doc! { "choiceNum": i64::from(num) },
        Transition::Delete,
        format!("Choice {num} of problem {id}"),
    )
    .await?;
    Ok(Json(problem.into()))
}

#[post("/<id>/choice/<num>/recover")]
async fn recover_choice(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    num: u32,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    viewer.require_admin(config)?;
    let problem = Problem::live(&problems, &surveys, id).await?;
    if problem.live_choice(num).is_some() {
        return Err(conflicting_choice(id, num));
    }
    let problem = lifecycle::apply_embedded(
        &problems,
        Problem::filter(id, Lifecycle::Active),
        CHOICES,
        doc! { "choiceNum": i64::from(num) },
        Transition::Recover,
        format!("Choice {num} of problem {id}"),
    )
    .await?;
    Ok(Json(problem.into()))
}

#[post("/<id>/choice/<num>/image", data = "<upload>")]
#[allow(clippy::too_many_arguments)]
async fn upload_choice_image(
    viewer: Viewer,
    config: &State<Config>,
    id: u32,
    num: u32,
    mut upload: Form<ImageUpload<'_>>,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<Json<ProblemDescription>> {
    viewer.require_admin(config)?;
    let problem = Problem::live(&problems, &surveys, id).await?;
    let previous = problem
        .live_choice(num)
        .ok_or_else(|| missing_choice(id, num))?
        .image
        .clone();

    let file_name = upload::store_image(&mut upload.attachment, config.uploads_dir(), CHOICE_DIR).await?;
    let update = set_with_timestamp(doc! { format!("{CHOICES}.$.image"): file_name.as_str() });
    let updated = problems
        .find_one_and_update(
            Problem::choice_filter(id, num, Lifecycle::Active),
            update,
            return_updated(),
        )
        .await;
    let updated = match updated {
        Ok(Some(problem)) => problem,
        failed => {
            upload::discard(config.uploads_dir(), CHOICE_DIR, &file_name).await;
            return Err(match failed {
                Err(e) => e.into(),
                _ => missing_choice(id, num),
            });
        }
    };
    if let Some(previous) = previous {
        upload::discard(config.uploads_dir(), CHOICE_DIR, &previous).await;
    }
    info!("Stored image for choice {num} of problem {id}");
    Ok(Json(updated.into()))
}

#[get("/<id>/choice/<num>/image")]
async fn get_choice_image(
    config: &State<Config>,
    id: u32,
    num: u32,
    problems: Coll<Problem>,
    surveys: Coll<Survey>,
) -> Result<NamedFile> {
    let problem = Problem::live(&problems, &surveys, id).await?;
    let choice = problem
        .live_choice(num)
        .ok_or_else(|| missing_choice(id, num))?;
    let file_name = choice
        .image
        .as_deref()
        .ok_or_else(|| Error::not_found(format!("Image of choice {num} of problem {id}")))?;
    upload::open(config.uploads_dir(), CHOICE_DIR, file_name).await
}

fn missing_choice(id: u32, num: u32) -> Error {
    Error::not_found(format!("Choice {num} of problem {id}"))
}

fn conflicting_choice(id: u32, num: u32) -> Error {
    Error::conflict(format!("Choice {num} of problem {id}"))
}
