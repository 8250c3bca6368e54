//! File-name helpers that split suffixes the same way the archive tooling
//! has always done: a leading dot does not start a suffix and every dot
//! after the first character does.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static VALID_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.[a-zA-Z0-9]+$").expect("valid regex"));

/// Check whether a suffix (including its dot) is made of ASCII letters and digits.
pub fn is_valid_suffix(suffix: &str) -> bool {
    VALID_SUFFIX.is_match(suffix)
}

/// Final component of a path as a string (empty if there is none).
pub fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// The last suffix of a file name, including the dot (`"a.tar.gz"` → `".gz"`).
pub fn path_suffix(name: &str) -> &str {
    if name.ends_with('.') {
        return "";
    }
    match name.rfind('.') {
        Some(i) if i > 0 => &name[i..],
        _ => "",
    }
}

/// All suffixes of a file name (`"a.tar.gz"` → `[".tar", ".gz"]`).
pub fn path_suffixes(name: &str) -> Vec<&str> {
    if name.ends_with('.') {
        return Vec::new();
    }
    let trimmed = name.trim_start_matches('.');
    let offset = name.len() - trimmed.len();
    match trimmed.find('.') {
        Some(first) => {
            let rest = &name[offset + first..];
            let mut suffixes = Vec::new();
            let mut start = 0;
            for (i, _) in rest.match_indices('.').skip(1) {
                suffixes.push(&rest[start..i]);
                start = i;
            }
            suffixes.push(&rest[start..]);
            suffixes
        }
        None => Vec::new(),
    }
}

/// The trailing run of valid suffixes joined together.
///
/// Scanning stops at the first invalid suffix from the right, so
/// `"report.final version.pdf"` yields `".pdf"`.
pub fn valid_suffixes(name: &str) -> String {
    let suffixes = path_suffixes(name);
    let start = suffixes
        .iter()
        .rposition(|s| !is_valid_suffix(s))
        .map_or(0, |i| i + 1);
    suffixes[start..].concat()
}
