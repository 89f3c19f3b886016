pub mod api;
pub mod auth;
pub mod db;
pub mod lifecycle;
pub mod mongodb;
pub mod upload;
