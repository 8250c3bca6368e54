//! HTTP client for the archive's reference files.
//!
//! Downloads the action definitions (`fileformats.yml`,
//! `master_fileformats.yml`) and the custom signatures
//! (`custom_signatures.json`) from the reference-files release, parses and
//! validates them with `acacore-core`, and caches the results per client.

use std::sync::Arc;

use acacore_core::error::CoreError;
use acacore_core::reference_files::{
    parse_actions, parse_custom_signatures, parse_master_actions, Actions, CustomSignature, MasterActions,
};
use tokio::sync::Mutex;

/// Release download URL of the reference files.
pub const DEFAULT_BASE_URL: &str = "https://github.com/aarhusstadsarkiv/reference-files/releases/latest/download/";
pub const ACTIONS_FILE: &str = "fileformats.yml";
pub const MASTER_ACTIONS_FILE: &str = "master_fileformats.yml";
pub const CUSTOM_SIGNATURES_FILE: &str = "custom_signatures.json";

/// Errors from fetching reference files.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceFilesError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a status other than 200.
    #[error("HTTP error {status} fetching {url}")]
    Http { status: u16, url: String },

    /// The downloaded file is not valid.
    #[error("Invalid reference file {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: CoreError,
    },
}

/// File names under the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNames {
    pub actions: String,
    pub master_actions: String,
    pub custom_signatures: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            actions: ACTIONS_FILE.to_string(),
            master_actions: MASTER_ACTIONS_FILE.to_string(),
            custom_signatures: CUSTOM_SIGNATURES_FILE.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Cache {
    actions: Option<Arc<Actions>>,
    master_actions: Option<Arc<MasterActions>>,
    custom_signatures: Option<Arc<Vec<CustomSignature>>>,
}

/// Client for one reference-files location.
#[derive(Debug)]
pub struct ReferenceFiles {
    client: reqwest::Client,
    base_url: String,
    files: FileNames,
    cache: Mutex<Cache>,
}

impl Default for ReferenceFiles {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ReferenceFiles {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            files: FileNames::default(),
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn with_file_names(mut self, files: FileNames) -> Self {
        self.files = files;
        self
    }

    /// Full URL of a file: the base URL and the file name joined by a single `/`.
    pub fn url(&self, file: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), file.trim_start_matches('/'))
    }

    /// Actions for original files, keyed by PUID or identifier.
    ///
    /// With `use_cache` set, a previous download is reused. Without it the
    /// file is downloaded again and the cache refreshed.
    pub async fn get_actions(&self, use_cache: bool) -> Result<Arc<Actions>, ReferenceFilesError> {
        let mut cache = self.cache.lock().await;
        if let (true, Some(actions)) = (use_cache, &cache.actions) {
            return Ok(Arc::clone(actions));
        }

        let url = self.url(&self.files.actions);
        let body = self.fetch(&url).await?;
        let actions = Arc::new(parse_actions(&body).map_err(|source| ReferenceFilesError::Parse { url, source })?);
        cache.actions = Some(Arc::clone(&actions));
        Ok(actions)
    }

    /// Conversion actions for master files, keyed by PUID.
    pub async fn get_master_actions(&self, use_cache: bool) -> Result<Arc<MasterActions>, ReferenceFilesError> {
        let mut cache = self.cache.lock().await;
        if let (true, Some(actions)) = (use_cache, &cache.master_actions) {
            return Ok(Arc::clone(actions));
        }

        let url = self.url(&self.files.master_actions);
        let body = self.fetch(&url).await?;
        let actions =
            Arc::new(parse_master_actions(&body).map_err(|source| ReferenceFilesError::Parse { url, source })?);
        cache.master_actions = Some(Arc::clone(&actions));
        Ok(actions)
    }

    pub async fn get_custom_signatures(
        &self,
        use_cache: bool,
    ) -> Result<Arc<Vec<CustomSignature>>, ReferenceFilesError> {
        let mut cache = self.cache.lock().await;
        if let (true, Some(signatures)) = (use_cache, &cache.custom_signatures) {
            return Ok(Arc::clone(signatures));
        }

        let url = self.url(&self.files.custom_signatures);
        let body = self.fetch(&url).await?;
        let signatures =
            Arc::new(parse_custom_signatures(&body).map_err(|source| ReferenceFilesError::Parse { url, source })?);
        cache.custom_signatures = Some(Arc::clone(&signatures));
        Ok(signatures)
    }

    // ---- private helpers ----

    async fn fetch(&self, url: &str) -> Result<String, ReferenceFilesError> {
        tracing::debug!(url, "Downloading reference file");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ReferenceFilesError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_with_single_slash() {
        let client = ReferenceFiles::new("http://example.test/download/");
        assert_eq!(client.url("/fileformats.yml"), "http://example.test/download/fileformats.yml");
        let client = ReferenceFiles::new("http://example.test/download");
        assert_eq!(client.url(ACTIONS_FILE), "http://example.test/download/fileformats.yml");
    }

    #[test]
    fn default_points_at_release() {
        let client = ReferenceFiles::default();
        assert_eq!(
            client.url(CUSTOM_SIGNATURES_FILE),
            "https://github.com/aarhusstadsarkiv/reference-files/releases/latest/download/custom_signatures.json"
        );
    }
}
