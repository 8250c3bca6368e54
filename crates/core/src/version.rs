//! Library version.
//!
//! Kept in sync with `[workspace.package] version` in the root manifest by
//! `cargo xtask version-check`. The same value is the latest files database
//! version and is stamped into every event created with `with_params`.

pub const VERSION: &str = "5.3.0";
