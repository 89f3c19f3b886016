use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    lifecycle::Lifecycle,
    mongodb::{numeric_id_filter, Coll, Id},
};

/// Core survey data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyCore {
    /// Auto-increment public identifier.
    pub id: u32,
    /// Unique among surveys that are not deleted.
    pub name: String,
    /// References to the problems created in this survey, in creation order.
    #[serde(default)]
    pub problems: Vec<Id>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl SurveyCore {
    pub fn new(id: u32, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            problems: Vec::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A survey without an object ID.
pub type NewSurvey = SurveyCore;

/// A survey from the database, with its object ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    #[serde(rename = "_id")]
    pub object_id: Id,
    #[serde(flatten)]
    pub survey: SurveyCore,
}

impl Survey {
    /// Find the survey with the given public ID in the given state.
    pub async fn find(surveys: &Coll<Survey>, id: u32, state: Lifecycle) -> Result<Option<Survey>> {
        let filter = state.restrict(numeric_id_filter(id));
        Ok(surveys.find_one(filter, None).await?)
    }

    /// Find the survey with the given public ID, failing unless it is active.
    pub async fn live(surveys: &Coll<Survey>, id: u32) -> Result<Survey> {
        Self::find(surveys, id, Lifecycle::Active)
            .await?
            .ok_or_else(|| Error::not_found(format!("Survey {id}")))
    }

    /// Fail with a conflict if an active survey other than `except` uses `name`.
    pub async fn ensure_name_free(
        surveys: &Coll<Survey>,
        name: &str,
        except: Option<Id>,
    ) -> Result<()> {
        let mut filter = Lifecycle::Active.restrict(doc! { "name": name });
        if let Some(except) = except {
            filter.insert("_id", doc! { "$ne": *except });
        }
        if surveys.find_one(filter, None).await?.is_some() {
            return Err(Error::conflict(format!("Survey named '{name}'")));
        }
        Ok(())
    }
}

impl Deref for Survey {
    type Target = SurveyCore;

    fn deref(&self) -> &Self::Target {
        &self.survey
    }
}

impl DerefMut for Survey {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.survey
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl SurveyCore {
        pub fn example() -> Self {
            Self::new(1, "Customer satisfaction".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{from_document, to_document};

    use super::*;

    #[test]
    fn stored_field_names() {
        let document = to_document(&SurveyCore::example()).unwrap();
        for field in ["id", "name", "problems", "isDeleted", "createdAt", "updatedAt"] {
            assert!(document.contains_key(field), "missing {field}");
        }
        assert!(document.get_datetime("createdAt").is_ok());
    }

    #[test]
    fn flag_defaults_to_active() {
        let document = doc! {
            "_id": *Id::new(),
            "id": 3_i32,
            "name": "legacy",
            "createdAt": mongodb::bson::DateTime::now(),
            "updatedAt": mongodb::bson::DateTime::now(),
        };
        let survey: Survey = from_document(document).unwrap();
        assert_eq!(survey.id, 3);
        assert!(!survey.is_deleted);
        assert!(survey.problems.is_empty());
    }
}
