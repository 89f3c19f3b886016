use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{id::ApiId, problem::ProblemDescription},
    db::{problem::Problem, survey::Survey},
};

/// Body of survey create and rename requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveySpec {
    pub name: String,
}

impl SurveySpec {
    /// The trimmed name, rejecting blank names.
    pub fn name(&self) -> Result<&str> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("name must not be empty"));
        }
        Ok(name)
    }
}

/// A survey as listed, without its problems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveySummary {
    pub object_id: ApiId,
    pub id: u32,
    pub name: String,
    /// Number of live problems.
    pub problem_count: u64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveySummary {
    pub fn new(survey: Survey, problem_count: u64) -> Self {
        Self {
            object_id: survey.object_id.into(),
            id: survey.survey.id,
            name: survey.survey.name,
            problem_count,
            is_deleted: survey.survey.is_deleted,
            created_at: survey.survey.created_at,
            updated_at: survey.survey.updated_at,
        }
    }
}

/// A survey with its live problems and their live choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDescription {
    pub object_id: ApiId,
    pub id: u32,
    pub name: String,
    pub problems: Vec<ProblemDescription>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveyDescription {
    /// Describe a survey with the given problems, which must already be
    /// restricted to live ones.
    pub fn new(survey: Survey, problems: Vec<Problem>) -> Self {
        Self {
            object_id: survey.object_id.into(),
            id: survey.survey.id,
            name: survey.survey.name,
            problems: problems.into_iter().map(ProblemDescription::from).collect(),
            is_deleted: survey.survey.is_deleted,
            created_at: survey.survey.created_at,
            updated_at: survey.survey.updated_at,
        }
    }
}
