use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static VERSION_CONST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*pub const VERSION: &str = "([^"]*)";"#).expect("valid regex")
});

/// `version` of `[workspace.package]` in a manifest.
pub fn manifest_version(manifest: &str) -> Result<String> {
    let value: toml::Value = manifest.parse().context("Invalid manifest")?;
    value
        .get("workspace")
        .and_then(|w| w.get("package"))
        .and_then(|p| p.get("version"))
        .and_then(toml::Value::as_str)
        .map(str::to_string)
        .context("No [workspace.package] version in manifest")
}

/// String literal of `pub const VERSION` in a source file.
pub fn source_version(source: &str) -> Result<String> {
    VERSION_CONST
        .captures(source)
        .map(|c| c[1].to_string())
        .context("No `pub const VERSION: &str` in source")
}

pub fn check(manifest: &str, source: &str) -> Result<String> {
    let manifest_version = manifest_version(manifest)?;
    let source_version = source_version(source)?;
    if manifest_version != source_version {
        anyhow::bail!("Version mismatch: manifest has {manifest_version}, source has {source_version}");
    }
    Ok(manifest_version)
}

pub fn run(manifest: &Path, source: &Path) -> Result<()> {
    let manifest_text =
        std::fs::read_to_string(manifest).with_context(|| format!("Cannot read {}", manifest.display()))?;
    let source_text = std::fs::read_to_string(source).with_context(|| format!("Cannot read {}", source.display()))?;

    let version = check(&manifest_text, &source_text)
        .with_context(|| format!("{} and {}", manifest.display(), source.display()))?;
    println!("Version {version} is consistent");
    Ok(())
}
