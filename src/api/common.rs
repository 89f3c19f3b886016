use chrono::Utc;
use mongodb::{
    bson::{doc, DateTime, Document},
    options::FindOptions,
};
use rocket::{futures::TryStreamExt, response::status::Created, serde::json::Json};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::model::{lifecycle::UPDATED_AT, mongodb::Coll};

/// Find every document matching `filter`, in order of public ID.
pub async fn list_by_id<T>(coll: &Coll<T>, filter: Document) -> Result<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = FindOptions::builder().sort(doc! { "id": 1 }).build();
    let found = coll.find(filter, options).await?.try_collect().await?;
    Ok(found)
}

/// A `$set` document for the given fields that also bumps the modification time.
pub fn set_with_timestamp(mut fields: Document) -> Document {
    fields.insert(UPDATED_AT, DateTime::from_chrono(Utc::now()));
    doc! { "$set": fields }
}

/// A `201 Created` response pointing at `location`.
pub fn created<T>(location: String, body: T) -> Created<Json<T>> {
    Created::new(location).body(Json(body))
}
