//! Wrapper around the `sf` (siegfried) file-format identification binary.
//!
//! `sf` is called with `-json -multi 1024` and its output is parsed into the
//! structures below. Match strings that siegfried reports as `;`-separated
//! lists (basis, warnings) are split on deserialization.
//!
//! See <https://github.com/richardlehane/siegfried>.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Deserializer};

/// Error type for siegfried operations.
#[derive(Debug, thiserror::Error)]
pub enum SiegfriedError {
    #[error("siegfried binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("siegfried execution failed (exit code {exit_code:?}): {message}")]
    ExecutionFailed { exit_code: Option<i32>, message: String },

    #[error("failed to parse siegfried output: {0}")]
    ParseError(String),

    #[error("unknown signature provider: {0}")]
    UnknownProvider(String),
}

impl From<SiegfriedError> for crate::error::CoreError {
    fn from(err: SiegfriedError) -> Self {
        crate::error::CoreError::Identification(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Signature providers
// ---------------------------------------------------------------------------

/// Signature sets that `sf -update` can fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureProvider {
    Pronom,
    Loc,
    Tika,
    Freedesktop,
    PronomTikaLoc,
    Deluxe,
    Archivematica,
}

impl SignatureProvider {
    pub const ALL: [SignatureProvider; 7] = [
        Self::Pronom,
        Self::Loc,
        Self::Tika,
        Self::Freedesktop,
        Self::PronomTikaLoc,
        Self::Deluxe,
        Self::Archivematica,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pronom => "pronom",
            Self::Loc => "loc",
            Self::Tika => "tika",
            Self::Freedesktop => "freedesktop",
            Self::PronomTikaLoc => "pronom-tika-loc",
            Self::Deluxe => "deluxe",
            Self::Archivematica => "archivematica",
        }
    }

    /// File name of the signature file for this provider.
    pub fn signature_file(self) -> String {
        format!("{}.sig", self.as_str())
    }
}

impl fmt::Display for SignatureProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureProvider {
    type Err = SiegfriedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| SiegfriedError::UnknownProvider(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// sf JSON output structures
// ---------------------------------------------------------------------------

/// Top-level `sf -json` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiegfriedResult {
    pub siegfried: String,
    pub scandate: DateTime<FixedOffset>,
    pub signature: String,
    pub created: DateTime<FixedOffset>,
    pub identifiers: Vec<SiegfriedIdentifier>,
    pub files: Vec<SiegfriedFile>,
}

/// A signature set loaded by siegfried.
#[derive(Debug, Clone, Deserialize)]
pub struct SiegfriedIdentifier {
    pub name: String,
    pub details: String,
}

/// Identification result for one file.
#[derive(Debug, Clone, Deserialize)]
pub struct SiegfriedFile {
    pub filename: String,
    pub filesize: u64,
    pub modified: DateTime<FixedOffset>,
    #[serde(default)]
    pub errors: String,
    #[serde(default)]
    pub matches: Vec<SiegfriedMatch>,
}

/// One candidate format for a file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SiegfriedMatch {
    pub ns: String,
    /// PUID of the match; `None` when siegfried reports `UNKNOWN`.
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    pub format: String,
    #[serde(default)]
    pub version: Option<String>,
    pub mime: String,
    /// Lower-cased format classes, e.g. `["image (raster)"]`.
    #[serde(rename = "class", default, deserialize_with = "deserialize_class")]
    pub match_class: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_list")]
    pub basis: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_list")]
    pub warning: Vec<String>,
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let id = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let id = id.trim();
    if id.is_empty() || id.eq_ignore_ascii_case("unknown") {
        Ok(None)
    } else {
        Ok(Some(id.to_string()))
    }
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    Ok(split_list(&value, ';'))
}

fn deserialize_class<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    Ok(split_list(&value.to_lowercase(), ','))
}

static BYTE_MATCH_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"byte match at (\d+), *(\d+)").expect("valid regex"));
static BYTE_MATCH_MULTI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"byte match at \[((?:\[\d+ \d+\] *)+)\]").expect("valid regex"));
static BYTE_MATCH_PAIR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+) (\d+)\]").expect("valid regex"));

impl SiegfriedMatch {
    /// Total length of the byte sequences that matched, if the basis
    /// contains a byte match.
    ///
    /// Handles both `byte match at 0, 4` and `byte match at [[0 4] [30 2]]`.
    pub fn byte_match(&self) -> Option<u64> {
        let mut total: Option<u64> = None;

        for basis in &self.basis {
            if let Some(caps) = BYTE_MATCH_MULTI.captures(basis) {
                let sum: u64 = BYTE_MATCH_PAIR
                    .captures_iter(&caps[1])
                    .filter_map(|pair| pair[2].parse::<u64>().ok())
                    .sum();
                total = Some(total.unwrap_or(0) + sum);
            } else if let Some(caps) = BYTE_MATCH_SINGLE.captures(basis) {
                let length = caps[2].parse::<u64>().unwrap_or(0);
                total = Some(total.unwrap_or(0) + length);
            }
        }

        total
    }

    /// The extension that matched, if any (`"extension match pdf"` → `"pdf"`).
    pub fn extension_match(&self) -> Option<&str> {
        self.basis_value("extension match ")
    }

    /// The file name that matched, if any.
    pub fn filename_match(&self) -> Option<&str> {
        self.basis_value("filename match ")
    }

    pub fn extension_mismatch(&self) -> bool {
        self.has_warning("extension mismatch")
    }

    pub fn filename_mismatch(&self) -> bool {
        self.has_warning("filename mismatch")
    }

    fn basis_value(&self, prefix: &str) -> Option<&str> {
        self.basis.iter().find_map(|b| b.strip_prefix(prefix)).map(str::trim)
    }

    fn has_warning(&self, warning: &str) -> bool {
        self.warning.iter().any(|w| w.eq_ignore_ascii_case(warning))
    }

    fn rank(&self) -> (u64, bool, bool, bool, bool) {
        (
            self.byte_match().unwrap_or(0),
            self.extension_match().is_some(),
            !self.extension_mismatch(),
            self.filename_match().is_some(),
            !self.filename_mismatch(),
        )
    }
}

impl SiegfriedFile {
    /// The strongest match that has a PUID.
    ///
    /// Matches are ranked by byte-match length, then extension match, then
    /// absence of an extension mismatch, then file name match, then absence
    /// of a file name mismatch. Ties keep siegfried's order.
    pub fn best_match(&self) -> Option<&SiegfriedMatch> {
        self.matches
            .iter()
            .filter(|m| m.id.is_some())
            .rev()
            .max_by_key(|m| m.rank())
    }
}

// ---------------------------------------------------------------------------
// Binary wrapper
// ---------------------------------------------------------------------------

/// Handle for calling the siegfried binary.
#[derive(Debug, Clone)]
pub struct Siegfried {
    /// Path to `sf`, or its name if it is on `PATH`.
    pub binary: PathBuf,
    /// Signature file passed with `-sig`.
    pub signature: String,
    /// Siegfried home folder passed with `-home`, if set.
    pub home: Option<PathBuf>,
}

impl Default for Siegfried {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("sf"),
            signature: "default.sig".to_string(),
            home: None,
        }
    }
}

impl Siegfried {
    pub fn new(binary: impl Into<PathBuf>, signature: impl Into<String>, home: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            signature: signature.into(),
            home,
        }
    }

    /// Run the binary with the given arguments and return its stdout.
    ///
    /// A non-zero exit status is reported with stderr, falling back to
    /// stdout and then to the exit code.
    pub async fn run<I, S>(&self, args: I) -> Result<String, SiegfriedError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = tokio::process::Command::new(&self.binary);
        if let Some(home) = &self.home {
            command.arg("-home").arg(home);
        }

        let output = command.args(args).output().await.map_err(SiegfriedError::NotFound)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let message = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                format!(
                    "Unknown siegfried error code {}",
                    output.status.code().map_or_else(|| "none".to_string(), |c| c.to_string())
                )
            };
            return Err(SiegfriedError::ExecutionFailed {
                exit_code: output.status.code(),
                message,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Fetch or update the signature file of a provider.
    ///
    /// With `set_signature`, later identifications use the new file.
    pub async fn update(&mut self, provider: SignatureProvider, set_signature: bool) -> Result<(), SiegfriedError> {
        let signature_file = provider.signature_file();
        self.run(["-sig", signature_file.as_str(), "-update", provider.as_str()])
            .await?;

        tracing::info!(provider = %provider, "Updated siegfried signature");

        if set_signature {
            self.signature = signature_file;
        }
        Ok(())
    }

    /// Identify a single file.
    pub async fn identify(&self, path: &Path) -> Result<SiegfriedResult, SiegfriedError> {
        let stdout = self.run(self.identify_args([path])).await?;
        parse_result(&stdout)
    }

    /// Identify many files with one call, pairing each input path with its result.
    pub async fn identify_many(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, SiegfriedFile)>, SiegfriedError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let stdout = self.run(self.identify_args(paths.iter().map(PathBuf::as_path))).await?;
        let result = parse_result(&stdout)?;

        if result.files.len() != paths.len() {
            return Err(SiegfriedError::ParseError(format!(
                "expected {} results, got {}",
                paths.len(),
                result.files.len()
            )));
        }

        Ok(paths.iter().cloned().zip(result.files).collect())
    }

    fn identify_args<'a>(&'a self, paths: impl IntoIterator<Item = &'a Path>) -> Vec<&'a OsStr> {
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-sig"),
            OsStr::new(self.signature.as_str()),
            OsStr::new("-json"),
            OsStr::new("-multi"),
            OsStr::new("1024"),
        ];
        args.extend(paths.into_iter().map(Path::as_os_str));
        args
    }
}

/// Parse `sf -json` output.
pub fn parse_result(stdout: &str) -> Result<SiegfriedResult, SiegfriedError> {
    serde_json::from_str::<SiegfriedResult>(stdout).map_err(|e| SiegfriedError::ParseError(format!("{e}: {stdout}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SAMPLE: &str = r#"{
        "siegfried": "1.11.0",
        "scandate": "2024-03-01T10:15:00+01:00",
        "signature": "default.sig",
        "created": "2023-12-17T15:54:41+11:00",
        "identifiers": [{"name": "pronom", "details": "DROID_SignatureFile_V116.xml"}],
        "files": [{
            "filename": "docs/report.pdf",
            "filesize": 1024,
            "modified": "2024-02-01T08:00:00+01:00",
            "errors": "",
            "matches": [
                {"ns": "pronom", "id": "UNKNOWN", "format": "", "version": "", "mime": "", "class": "",
                 "basis": "", "warning": "no match"},
                {"ns": "pronom", "id": "fmt/18", "format": "Acrobat PDF 1.4", "version": "1.4",
                 "mime": "application/pdf", "class": "Page Description",
                 "basis": "extension match pdf; byte match at [[0 8] [1000 5]]", "warning": ""},
                {"ns": "pronom", "id": "fmt/19", "format": "Acrobat PDF 1.5", "version": "1.5",
                 "mime": "application/pdf", "class": "Page Description, Text (Structured)",
                 "basis": "byte match at 0, 8", "warning": "extension mismatch"}
            ]
        }]
    }"#;

    fn sample_file() -> SiegfriedFile {
        parse_result(SAMPLE).unwrap().files.remove(0)
    }

    #[test]
    fn unknown_id_becomes_none() {
        let file = sample_file();
        assert_eq!(file.matches[0].id, None);
        assert_eq!(file.matches[1].id.as_deref(), Some("fmt/18"));
    }

    #[test]
    fn lists_are_split_and_classes_lowercased() {
        let file = sample_file();
        assert_eq!(file.matches[1].basis, vec!["extension match pdf", "byte match at [[0 8] [1000 5]]"]);
        assert!(file.matches[1].warning.is_empty());
        assert_eq!(file.matches[2].match_class, vec!["page description", "text (structured)"]);
    }

    #[test]
    fn byte_match_sums_all_lengths() {
        let file = sample_file();
        assert_eq!(file.matches[1].byte_match(), Some(13));
        assert_eq!(file.matches[2].byte_match(), Some(8));
        assert_eq!(file.matches[0].byte_match(), None);
    }

    #[test]
    fn extension_match_and_mismatch() {
        let file = sample_file();
        assert_eq!(file.matches[1].extension_match(), Some("pdf"));
        assert!(file.matches[2].extension_mismatch());
        assert!(!file.matches[1].extension_mismatch());
    }

    #[test]
    fn best_match_prefers_longest_byte_match() {
        let file = sample_file();
        assert_eq!(file.best_match().and_then(|m| m.id.as_deref()), Some("fmt/18"));
    }

    #[test]
    fn best_match_keeps_first_on_tie() {
        let mut file = sample_file();
        file.matches[2].basis = file.matches[1].basis.clone();
        file.matches[2].warning.clear();
        assert_eq!(file.best_match().and_then(|m| m.id.as_deref()), Some("fmt/18"));
    }

    #[test]
    fn best_match_ignores_unknown() {
        let mut file = sample_file();
        file.matches.truncate(1);
        assert!(file.best_match().is_none());
    }

    #[test]
    fn unknown_top_level_fields_are_rejected() {
        let json = SAMPLE.replacen("\"siegfried\"", "\"extra\": 1, \"siegfried\"", 1);
        assert_matches!(parse_result(&json), Err(SiegfriedError::ParseError(_)));
    }

    #[test]
    fn provider_round_trips_through_str() {
        assert_eq!("Pronom-Tika-Loc".parse::<SignatureProvider>().unwrap(), SignatureProvider::PronomTikaLoc);
        assert_eq!(SignatureProvider::Loc.signature_file(), "loc.sig");
        assert_matches!("droid".parse::<SignatureProvider>(), Err(SiegfriedError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let sf = Siegfried::new("/nonexistent/sf", "default.sig", None);
        let result = sf.identify(Path::new("whatever")).await;
        assert_matches!(result, Err(SiegfriedError::NotFound(_)));
    }

    #[tokio::test]
    async fn identify_many_with_no_paths_does_not_run() {
        let sf = Siegfried::new("/nonexistent/sf", "default.sig", None);
        assert!(sf.identify_many(&[]).await.unwrap().is_empty());
    }
}
