use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::{
    db::{
        answer::{Answer, NewAnswer},
        catalog::{CatalogEntry, CatalogKind, Item, NewCatalogEntry, Product, Sample},
        problem::{NewProblem, Problem},
        survey::{NewSurvey, Survey},
        user::{NewUser, User},
    },
    lifecycle::IS_DELETED,
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Survey collections
const SURVEYS: &str = "surveys";
impl MongoCollection for Survey {
    const NAME: &'static str = SURVEYS;
}
impl MongoCollection for NewSurvey {
    const NAME: &'static str = SURVEYS;
}

// Problem collections
const PROBLEMS: &str = "problems";
impl MongoCollection for Problem {
    const NAME: &'static str = PROBLEMS;
}
impl MongoCollection for NewProblem {
    const NAME: &'static str = PROBLEMS;
}

// Answer collections
const ANSWERS: &str = "answers";
impl MongoCollection for Answer {
    const NAME: &'static str = ANSWERS;
}
impl MongoCollection for NewAnswer {
    const NAME: &'static str = ANSWERS;
}

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

// Catalog collections, one per kind
impl<K: CatalogKind> MongoCollection for CatalogEntry<K> {
    const NAME: &'static str = K::COLLECTION;
}
impl<K: CatalogKind> MongoCollection for NewCatalogEntry<K> {
    const NAME: &'static str = K::COLLECTION;
}

// Counter collection
const COUNTERS: &str = "counters";
impl MongoCollection for Counter {
    const NAME: &'static str = COUNTERS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// Natural keys are only unique among documents that are not soft-deleted,
/// so those indexes are partial.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();
    let unique_while_live = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! { IS_DELETED: false })
        .build();
    let numeric_id = IndexModel::builder()
        .keys(doc! {"id": 1})
        .options(unique.clone())
        .build();

    // Survey collection.
    let surveys = Coll::<Survey>::from_db(db);
    surveys.create_index(numeric_id.clone(), None).await?;
    let name_index = IndexModel::builder()
        .keys(doc! {"name": 1})
        .options(unique_while_live.clone())
        .build();
    surveys.create_index(name_index, None).await?;

    // Problem collection.
    let problems = Coll::<Problem>::from_db(db);
    problems.create_index(numeric_id.clone(), None).await?;
    let number_index = IndexModel::builder()
        .keys(doc! {"surveyId": 1, "problemId": 1})
        .options(unique_while_live.clone())
        .build();
    problems.create_index(number_index, None).await?;

    // Answer collection.
    let answer_index = IndexModel::builder().keys(doc! {"problem": 1}).build();
    Coll::<Answer>::from_db(db)
        .create_index(answer_index, None)
        .await?;

    // User collection.
    let email_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique)
        .build();
    Coll::<User>::from_db(db)
        .create_index(email_index, None)
        .await?;

    // Catalog collections.
    ensure_catalog_indexes::<Product>(db, &numeric_id, &unique_while_live).await?;
    ensure_catalog_indexes::<Item>(db, &numeric_id, &unique_while_live).await?;
    ensure_catalog_indexes::<Sample>(db, &numeric_id, &unique_while_live).await?;

    Ok(())
}

async fn ensure_catalog_indexes<K: CatalogKind>(
    db: &Database,
    numeric_id: &IndexModel,
    unique_while_live: &IndexOptions,
) -> Result<(), DbError> {
    let entries = Coll::<CatalogEntry<K>>::from_db(db);
    entries.create_index(numeric_id.clone(), None).await?;
    let name_index = IndexModel::builder()
        .keys(doc! {"name": 1})
        .options(unique_while_live.clone())
        .build();
    entries.create_index(name_index, None).await?;
    Ok(())
}
