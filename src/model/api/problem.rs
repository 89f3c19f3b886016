use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::problem::{Choice, Problem},
};

/// Body of problem create requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSpec {
    pub problem_id: u32,
    pub content: String,
}

/// Body of problem update requests; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemPatch {
    pub problem_id: Option<u32>,
    pub content: Option<String>,
}

impl ProblemPatch {
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.problem_id.is_none() && self.content.is_none() {
            return Err(Error::invalid_input("nothing to update"));
        }
        Ok(())
    }
}

/// Body of choice create requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceSpec {
    pub choice_num: u32,
    pub content: String,
}

/// Body of choice update requests; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoicePatch {
    pub choice_num: Option<u32>,
    pub content: Option<String>,
}

impl ChoicePatch {
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.choice_num.is_none() && self.content.is_none() {
            return Err(Error::invalid_input("nothing to update"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceDescription {
    pub choice_num: u32,
    pub content: String,
    pub image: Option<String>,
    pub is_deleted: bool,
}

impl From<&Choice> for ChoiceDescription {
    fn from(choice: &Choice) -> Self {
        Self {
            choice_num: choice.choice_num,
            content: choice.content.clone(),
            image: choice.image.clone(),
            is_deleted: choice.is_deleted,
        }
    }
}

/// A problem with its live choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDescription {
    pub object_id: ApiId,
    pub id: u32,
    pub problem_id: u32,
    pub survey_id: u32,
    pub content: String,
    pub choices: Vec<ChoiceDescription>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Problem> for ProblemDescription {
    fn from(problem: Problem) -> Self {
        Self {
            object_id: problem.object_id.into(),
            id: problem.id,
            problem_id: problem.problem_id,
            survey_id: problem.survey_id,
            choices: problem.live_choices().map(ChoiceDescription::from).collect(),
            content: problem.problem.content,
            is_deleted: problem.problem.is_deleted,
            created_at: problem.problem.created_at,
            updated_at: problem.problem.updated_at,
        }
    }
}
