//! Row types for the log, metadata and statistics views.
//!
//! File rows are decoded straight into the `acacore-core` file models, see
//! [`crate::repositories::FileRecord`].

pub mod log;
pub mod metadata;
pub mod stats;
