//! The `acacore` command-line tool: files database management and file
//! identification on top of `acacore-core` and `acacore-db`.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod program;
