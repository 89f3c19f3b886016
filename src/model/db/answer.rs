use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rocket::serde::json::Value;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Id;

/// The content of an answer. Only scalars are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerContent {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<Value> for AnswerContent {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Bool(flag) => Ok(Self::Flag(flag)),
            Value::String(text) => Ok(Self::Text(text)),
            Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Ok(Self::Integer(integer))
                } else if let Some(float) = number.as_f64() {
                    Ok(Self::Float(float))
                } else {
                    Err(Error::invalid_input(format!(
                        "answer number {number} is out of range"
                    )))
                }
            }
            Value::Null => Err(Error::invalid_input("answer content must be provided")),
            Value::Array(_) | Value::Object(_) => Err(Error::invalid_input(
                "answer content must be a number, string or boolean",
            )),
        }
    }
}

/// Core answer data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCore {
    /// Object ID of the answered problem.
    pub problem: Id,
    pub content: AnswerContent,
    /// Object ID of the submitting user; absent for anonymous answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Id>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl AnswerCore {
    pub fn new(problem: Id, content: AnswerContent, user: Option<Id>) -> Self {
        Self {
            problem,
            content,
            user,
            created_at: Utc::now(),
        }
    }
}

/// An answer without an object ID.
pub type NewAnswer = AnswerCore;

/// An answer from the database, with its object ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "_id")]
    pub object_id: Id,
    #[serde(flatten)]
    pub answer: AnswerCore,
}

impl Deref for Answer {
    type Target = AnswerCore;

    fn deref(&self) -> &Self::Target {
        &self.answer
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{doc, from_document, to_document};
    use rocket::serde::json::json;

    use super::*;

    #[test]
    fn scalars_are_accepted() {
        assert_eq!(
            AnswerContent::try_from(json!(42)).unwrap(),
            AnswerContent::Integer(42)
        );
        assert_eq!(
            AnswerContent::try_from(json!(2.5)).unwrap(),
            AnswerContent::Float(2.5)
        );
        assert_eq!(
            AnswerContent::try_from(json!("text")).unwrap(),
            AnswerContent::Text("text".to_string())
        );
        assert_eq!(
            AnswerContent::try_from(json!(true)).unwrap(),
            AnswerContent::Flag(true)
        );
    }

    #[test]
    fn structures_are_rejected() {
        for value in [json!({"a": 1}), json!([1, 2]), json!(null)] {
            let err = AnswerContent::try_from(value).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
    }

    #[test]
    fn content_is_stored_as_a_plain_scalar() {
        let answer = AnswerCore::new(Id::new(), AnswerContent::Integer(7), None);
        let document = to_document(&answer).unwrap();
        assert_eq!(document.get_i64("content").unwrap(), 7);
        assert!(!document.contains_key("user"));

        let document = doc! {
            "problem": *answer.problem,
            "content": "free text",
            "createdAt": mongodb::bson::DateTime::now(),
        };
        let answer: AnswerCore = from_document(document).unwrap();
        assert_eq!(answer.content, AnswerContent::Text("free text".to_string()));
    }
}
