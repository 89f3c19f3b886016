mod bson;
mod collection;
mod counter;
mod errors;

pub use bson::{inserted_id, numeric_id_filter, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::Counter;
pub use errors::is_duplicate_key;
