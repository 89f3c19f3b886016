use chrono::{DateTime, Utc};
use rocket::serde::json::Value;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    db::answer::{Answer, AnswerContent},
};

/// Body of answer submissions. The content is checked by [`AnswerContent::try_from`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDescription {
    pub object_id: ApiId,
    /// Public ID of the answered problem.
    pub problem_id: u32,
    pub content: AnswerContent,
    pub user: Option<ApiId>,
    pub created_at: DateTime<Utc>,
}

impl AnswerDescription {
    pub fn new(answer: Answer, problem_id: u32) -> Self {
        Self {
            object_id: answer.object_id.into(),
            problem_id,
            content: answer.answer.content,
            user: answer.answer.user.map(ApiId::from),
            created_at: answer.answer.created_at,
        }
    }
}
