//! Request and response bodies of the HTTP API.

pub mod answer;
pub mod catalog;
pub mod id;
pub mod problem;
pub mod query;
pub mod survey;
pub mod user;
