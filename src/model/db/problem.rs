use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Document};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    db::survey::Survey,
    lifecycle::{Lifecycle, IS_DELETED},
    mongodb::{numeric_id_filter, Coll, Id},
};

/// Name of the embedded choice array.
pub const CHOICES: &str = "choices";

/// A choice, embedded in its problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Unique among the problem's choices that are not deleted.
    pub choice_num: u32,
    pub content: String,
    /// File name of the uploaded image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Choice {
    pub fn new(choice_num: u32, content: String) -> Self {
        Self {
            choice_num,
            content,
            image: None,
            is_deleted: false,
        }
    }

    /// A filter fragment selecting the choice with the given number in the given state.
    pub fn selector(choice_num: u32, state: Lifecycle) -> Document {
        state.restrict(doc! { "choiceNum": i64::from(choice_num) })
    }
}

/// Core problem data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemCore {
    /// Auto-increment public identifier.
    pub id: u32,
    /// Caller-supplied number, unique among the survey's problems that are not deleted.
    pub problem_id: u32,
    /// Public ID of the owning survey.
    pub survey_id: u32,
    pub content: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ProblemCore {
    pub fn new(id: u32, problem_id: u32, survey_id: u32, content: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            problem_id,
            survey_id,
            content,
            choices: Vec::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The choices that are not deleted, in order.
    pub fn live_choices(&self) -> impl Iterator<Item = &Choice> {
        self.choices.iter().filter(|choice| !choice.is_deleted)
    }

    /// The first choice with the given number that is not deleted.
    pub fn live_choice(&self, choice_num: u32) -> Option<&Choice> {
        self.live_choices()
            .find(|choice| choice.choice_num == choice_num)
    }
}

/// A problem without an object ID.
pub type NewProblem = ProblemCore;

/// A problem from the database, with its object ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "_id")]
    pub object_id: Id,
    #[serde(flatten)]
    pub problem: ProblemCore,
}

impl Problem {
    /// A filter matching the problem with the given public ID in the given state.
    pub fn filter(id: u32, state: Lifecycle) -> Document {
        state.restrict(numeric_id_filter(id))
    }

    /// A filter matching an active problem that has the given choice in the given state.
    pub fn choice_filter(id: u32, choice_num: u32, state: Lifecycle) -> Document {
        let mut filter = Self::filter(id, Lifecycle::Active);
        filter.insert(
            CHOICES,
            doc! { "$elemMatch": Choice::selector(choice_num, state) },
        );
        filter
    }

    /// Find the problem with the given public ID in the given state.
    pub async fn find(
        problems: &Coll<Problem>,
        id: u32,
        state: Lifecycle,
    ) -> Result<Option<Problem>> {
        Ok(problems.find_one(Self::filter(id, state), None).await?)
    }

    /// Find the problem with the given public ID, failing unless both it and its
    /// survey are active.
    pub async fn live(problems: &Coll<Problem>, surveys: &Coll<Survey>, id: u32) -> Result<Problem> {
        let problem = Self::find(problems, id, Lifecycle::Active)
            .await?
            .ok_or_else(|| Error::not_found(format!("Problem {id}")))?;
        Survey::live(surveys, problem.survey_id).await?;
        Ok(problem)
    }

    /// Fail with a conflict if an active problem of the survey, other than
    /// `except`, uses `problem_id`.
    pub async fn ensure_number_free(
        problems: &Coll<Problem>,
        survey_id: u32,
        problem_id: u32,
        except: Option<Id>,
    ) -> Result<()> {
        let mut filter = doc! {
            "surveyId": i64::from(survey_id),
            "problemId": i64::from(problem_id),
            IS_DELETED: false,
        };
        if let Some(except) = except {
            filter.insert("_id", doc! { "$ne": *except });
        }
        if problems.find_one(filter, None).await?.is_some() {
            return Err(Error::conflict(format!(
                "Problem number {problem_id} in survey {survey_id}"
            )));
        }
        Ok(())
    }
}

impl Deref for Problem {
    type Target = ProblemCore;

    fn deref(&self) -> &Self::Target {
        &self.problem
    }
}

impl DerefMut for Problem {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.problem
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl ProblemCore {
        pub fn example() -> Self {
            let mut problem = Self::new(1, 1, 1, "How did you hear about us?".to_string());
            problem.choices = vec![
                Choice::new(1, "A friend".to_string()),
                Choice::new(2, "Advertising".to_string()),
            ];
            problem
        }
    }
}
