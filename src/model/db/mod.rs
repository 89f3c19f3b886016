//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//! - Field names are camelCase, matching the JSON API.

pub mod answer;
pub mod catalog;
pub mod problem;
pub mod survey;
pub mod user;
