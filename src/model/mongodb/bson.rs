use std::fmt::{Display, Formatter};
use std::{ops::Deref, str::FromStr};

use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    results::InsertOneResult,
};
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A MongoDB object ID, as stored in `_id` fields and document references.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(ObjectId);

impl Id {
    /// Generate a fresh ID.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// A filter matching the document with this `_id`.
    pub fn as_doc(&self) -> Document {
        doc! { "_id": self.0 }
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Id {
    type Target = ObjectId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl FromStr for Id {
    type Err = mongodb::bson::oid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse::<ObjectId>()?))
    }
}

impl From<ObjectId> for Id {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

impl From<Id> for ObjectId {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl<'a> FromParam<'a> for Id {
    type Error = mongodb::bson::oid::Error;

    fn from_param(param: &'a str) -> std::result::Result<Self, Self::Error> {
        param.parse::<Id>()
    }
}

/// A filter matching the document whose auto-increment `id` field equals the given value.
pub fn numeric_id_filter(id: u32) -> Document {
    doc! { "id": i64::from(id) }
}

/// Extract the ID the database assigned to a freshly inserted document.
pub fn inserted_id(result: &InsertOneResult) -> Result<Id> {
    result
        .inserted_id
        .as_object_id()
        .map(Id::from)
        .ok_or_else(|| Error::Internal("Inserted document has no object ID".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_parses_its_own_display() {
        let id = Id::new();
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(Id::from_param("not-an-object-id").is_err());
    }

    #[test]
    fn numeric_filter_uses_id_field() {
        assert_eq!(numeric_id_filter(7), doc! { "id": 7_i64 });
    }
}
