//! Core models and helpers for processing digital archives.
//!
//! Contains the file models, their identification with siegfried and
//! custom signatures, the reference-file action models, the event model and
//! the search query language. Database access lives in `acacore-db`.

pub mod error;
pub mod event;
pub mod files;
pub mod query;
pub mod reference_files;
pub mod siegfried;
pub mod utils;
pub mod version;
