//! Soft deletion.
//!
//! Nothing is ever physically removed. Every entity carries an `isDeleted`
//! flag and moves between two states, [`Lifecycle::Active`] and
//! [`Lifecycle::Deleted`], via a [`Transition`]. The precondition (the entity
//! is currently in the source state) is part of the update filter, so the
//! check and the flip happen in a single atomic database operation.

use std::fmt::{Display, Formatter};

use chrono::Utc;
use log::info;
use mongodb::{
    bson::{doc, DateTime, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// Name of the soft-delete flag, on top-level documents and embedded elements alike.
pub const IS_DELETED: &str = "isDeleted";

/// Name of the last-modified timestamp on top-level documents.
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Deleted,
}

impl Lifecycle {
    pub fn from_deleted(is_deleted: bool) -> Self {
        if is_deleted {
            Self::Deleted
        } else {
            Self::Active
        }
    }

    pub fn is_deleted(self) -> bool {
        self == Self::Deleted
    }

    /// A filter fragment matching documents in this state.
    pub fn filter(self) -> Document {
        doc! { IS_DELETED: self.is_deleted() }
    }

    /// Restrict an existing filter to documents in this state.
    pub fn restrict(self, mut filter: Document) -> Document {
        filter.insert(IS_DELETED, self.is_deleted());
        filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Delete,
    Recover,
}

impl Transition {
    /// The state an entity must be in for this transition to apply.
    pub fn source(self) -> Lifecycle {
        match self {
            Self::Delete => Lifecycle::Active,
            Self::Recover => Lifecycle::Deleted,
        }
    }

    /// The state an entity is in after this transition.
    pub fn target(self) -> Lifecycle {
        match self {
            Self::Delete => Lifecycle::Deleted,
            Self::Recover => Lifecycle::Active,
        }
    }

    /// Build the filter and update for a top-level document.
    pub fn top_level(self, filter: Document) -> (Document, Document) {
        let filter = self.source().restrict(filter);
        let update = doc! {
            "$set": {
                IS_DELETED: self.target().is_deleted(),
                UPDATED_AT: DateTime::from_chrono(Utc::now()),
            }
        };
        (filter, update)
    }

    /// Build the filter and update for an element of the array `array` embedded in
    /// the documents matched by `parent`. `element` selects the element; only the
    /// first element matching it (and the source state) is changed.
    pub fn embedded(self, parent: Document, array: &str, element: Document) -> (Document, Document) {
        let mut filter = parent;
        filter.insert(array, doc! { "$elemMatch": self.source().restrict(element) });
        let update = doc! {
            "$set": {
                format!("{array}.$.{IS_DELETED}"): self.target().is_deleted(),
                UPDATED_AT: DateTime::from_chrono(Utc::now()),
            }
        };
        (filter, update)
    }

    /// How to describe an entity that this transition cannot apply to.
    fn missing(self, what: impl Display) -> Error {
        match self {
            Self::Delete => Error::not_found(what),
            Self::Recover => Error::not_found(format!("Deleted {what}")),
        }
    }
}

impl Display for Transition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delete => write!(f, "deleted"),
            Self::Recover => write!(f, "recovered"),
        }
    }
}

/// Apply a transition to the top-level document matched by `filter`, returning the
/// document in its new state. Fails with `NotFound` if no document matches in the
/// source state.
pub async fn apply<T>(
    coll: &Coll<T>,
    filter: Document,
    transition: Transition,
    what: impl Display,
) -> Result<T>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let (filter, update) = transition.top_level(filter);
    let updated = coll
        .find_one_and_update(filter, update, return_updated())
        .await?
        .ok_or_else(|| transition.missing(&what))?;
    info!("{what} {transition}");
    Ok(updated)
}

/// Apply a transition to an embedded array element. See [`Transition::embedded`].
pub async fn apply_embedded<T>(
    coll: &Coll<T>,
    parent: Document,
    array: &str,
    element: Document,
    transition: Transition,
    what: impl Display,
) -> Result<T>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let (filter, update) = transition.embedded(parent, array, element);
    let updated = coll
        .find_one_and_update(filter, update, return_updated())
        .await?
        .ok_or_else(|| transition.missing(&what))?;
    info!("{what} {transition}");
    Ok(updated)
}

/// Options for `find_one_and_update` calls that want the document as it is after the update.
pub fn return_updated() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_inverse() {
        for transition in [Transition::Delete, Transition::Recover] {
            assert_ne!(transition.source(), transition.target());
        }
        assert_eq!(Transition::Delete.source(), Transition::Recover.target());
        assert_eq!(Transition::Delete.target(), Transition::Recover.source());
    }

    #[test]
    fn listing_state_from_query() {
        assert_eq!(Lifecycle::from_deleted(false), Lifecycle::Active);
        assert_eq!(Lifecycle::from_deleted(true), Lifecycle::Deleted);
        assert_eq!(Lifecycle::Deleted.filter(), doc! { "isDeleted": true });
    }

    #[test]
    fn top_level_delete_requires_active() {
        let (filter, update) = Transition::Delete.top_level(doc! { "id": 4_i64 });
        assert_eq!(filter, doc! { "id": 4_i64, "isDeleted": false });

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_bool(IS_DELETED).unwrap(), true);
        assert!(set.get_datetime(UPDATED_AT).is_ok());
    }

    #[test]
    fn top_level_recover_requires_deleted() {
        let (filter, update) = Transition::Recover.top_level(doc! { "id": 4_i64 });
        assert_eq!(filter, doc! { "id": 4_i64, "isDeleted": true });
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_bool(IS_DELETED).unwrap(), false);
    }

    #[test]
    fn embedded_uses_elem_match_and_positional_operator() {
        let parent = Lifecycle::Active.restrict(doc! { "id": 2_i64 });
        let (filter, update) =
            Transition::Recover.embedded(parent, "choices", doc! { "choiceNum": 3_i64 });

        assert_eq!(
            filter,
            doc! {
                "id": 2_i64,
                "isDeleted": false,
                "choices": { "$elemMatch": { "choiceNum": 3_i64, "isDeleted": true } },
            }
        );
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_bool("choices.$.isDeleted").unwrap(), false);
    }

    #[test]
    fn recover_failure_names_the_deleted_entity() {
        let err = Transition::Recover.missing("survey 9");
        assert_eq!(err.to_string(), "Deleted survey 9 not found");
        let err = Transition::Delete.missing("Survey 9");
        assert_eq!(err.to_string(), "Survey 9 not found");
    }
}
