use std::path::PathBuf;

use acacore_core::siegfried::Siegfried;
use acacore_reference_files::{ReferenceFiles, DEFAULT_BASE_URL};

use crate::cli::GlobalArgs;

/// Files identified per siegfried call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Command-line tool configuration loaded from environment variables.
///
/// Values given on the command line take precedence, see
/// [`CliConfig::with_overrides`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Siegfried binary (default: `sf`).
    pub siegfried_binary: PathBuf,
    /// Siegfried signature file (default: `default.sig`).
    pub siegfried_signature: String,
    /// Siegfried home folder, if not the default.
    pub siegfried_home: Option<PathBuf>,
    /// Base URL of the reference files.
    pub reference_url: String,
    /// Folder for the `acacore.log` file. No log file is written when unset.
    pub log_dir: Option<PathBuf>,
    pub batch_size: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            siegfried_binary: PathBuf::from("sf"),
            siegfried_signature: "default.sig".to_string(),
            siegfried_home: None,
            reference_url: DEFAULT_BASE_URL.to_string(),
            log_dir: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default             |
    /// |-------------------------|---------------------|
    /// | `SIEGFRIED_BINARY`      | `sf`                |
    /// | `SIEGFRIED_SIGNATURE`   | `default.sig`       |
    /// | `SIEGFRIED_HOME`        | --                  |
    /// | `ACACORE_REFERENCE_URL` | GitHub release URL  |
    /// | `ACACORE_LOG_DIR`       | --                  |
    /// | `ACACORE_BATCH_SIZE`    | `100`               |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let batch_size = match var("ACACORE_BATCH_SIZE").map(|v| v.parse::<usize>()) {
            Some(Ok(size)) if size > 0 => size,
            Some(_) => {
                tracing::warn!("ACACORE_BATCH_SIZE must be a positive integer, using {DEFAULT_BATCH_SIZE}");
                DEFAULT_BATCH_SIZE
            }
            None => DEFAULT_BATCH_SIZE,
        };

        Self {
            siegfried_binary: var("SIEGFRIED_BINARY").map_or(defaults.siegfried_binary, PathBuf::from),
            siegfried_signature: var("SIEGFRIED_SIGNATURE").unwrap_or(defaults.siegfried_signature),
            siegfried_home: var("SIEGFRIED_HOME").map(PathBuf::from),
            reference_url: var("ACACORE_REFERENCE_URL").unwrap_or(defaults.reference_url),
            log_dir: var("ACACORE_LOG_DIR").map(PathBuf::from),
            batch_size,
        }
    }

    /// Replace values with those given on the command line.
    pub fn with_overrides(mut self, args: &GlobalArgs) -> Self {
        if let Some(binary) = &args.siegfried_binary {
            self.siegfried_binary = binary.clone();
        }
        if let Some(signature) = &args.siegfried_signature {
            self.siegfried_signature = signature.clone();
        }
        if let Some(home) = &args.siegfried_home {
            self.siegfried_home = Some(home.clone());
        }
        if let Some(url) = &args.reference_url {
            self.reference_url = url.clone();
        }
        if let Some(dir) = &args.log_dir {
            self.log_dir = Some(dir.clone());
        }
        if let Some(size) = args.batch_size {
            self.batch_size = size;
        }
        self
    }

    pub fn siegfried(&self) -> Siegfried {
        Siegfried::new(
            self.siegfried_binary.clone(),
            self.siegfried_signature.clone(),
            self.siegfried_home.clone(),
        )
    }

    pub fn reference_files(&self) -> ReferenceFiles {
        ReferenceFiles::new(self.reference_url.clone())
    }
}
