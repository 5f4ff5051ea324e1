//! Domain layer: war records and their stored-field encodings.

pub mod decode;
pub mod entities;
pub mod error;
