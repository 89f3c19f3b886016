use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

use super::errors::is_duplicate_key;

/// A counter object used to implement auto-increment fields. There is one
/// counter per collection, keyed by the collection name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Atomically retrieve the next value of the named counter, creating it
    /// if needed. The first value handed out is 1.
    pub async fn next(counters: &Coll<Counter>, name: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let filter = doc! { "_id": name };
        let result = counters
            .find_one_and_update(filter.clone(), update.clone(), options.clone())
            .await;
        let counter = match result {
            // A concurrent first call created the counter; it exists now.
            Err(e) if is_duplicate_key(&e) => {
                counters
                    .find_one_and_update(filter, update, options)
                    .await?
            }
            result => result?,
        }
        .ok_or_else(|| Error::Internal(format!("Failed to find counter {name}")))?;
        Ok(counter.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[backend_test]
    async fn counter_starts_at_one_and_increments(counters: Coll<Counter>) {
        assert_eq!(Counter::next(&counters, "things").await.unwrap(), 1);
        assert_eq!(Counter::next(&counters, "things").await.unwrap(), 2);

        // Counters are independent.
        assert_eq!(Counter::next(&counters, "others").await.unwrap(), 1);

        let counter = counters
            .find_one(doc! { "_id": "things" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.next, 2);
    }

    #[backend_test]
    async fn concurrent_first_calls_both_succeed(counters: Coll<Counter>) {
        let (first, second) = rocket::tokio::join!(
            Counter::next(&counters, "racing"),
            Counter::next(&counters, "racing"),
        );
        let mut values = vec![first.unwrap(), second.unwrap()];
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
    }
}
