//! Application services: query translation, handlers and the response envelope.

pub mod envelope;
pub mod error;
pub mod handlers;
pub mod pagination;
pub mod query;
pub mod repos;
pub mod request;
pub mod resources;
