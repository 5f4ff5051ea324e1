//! Cached, read-only JSON API over Helldivers 2 war data.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
