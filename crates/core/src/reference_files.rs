//! Models for the archive's reference files.
//!
//! `fileformats.yml` maps identifiers (PUIDs and `!`-prefixed pseudo
//! identifiers) to [`Action`]s, `master_fileformats.yml` maps them to
//! [`MasterConvertAction`]s, and `custom_signatures.json` holds the
//! [`CustomSignature`]s used when siegfried cannot identify a file.
//!
//! Optional fields are omitted when serializing so stored action data stays
//! as small as the YAML it came from.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;

/// Identifier of the action applied to every file after its own action.
pub const GLOBAL_ACTION_KEY: &str = "*";

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Convert,
    Extract,
    Manual,
    Rename,
    Ignore,
    Reidentify,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Extract => "extract",
            Self::Manual => "manual",
            Self::Rename => "rename",
            Self::Ignore => "ignore",
            Self::Reidentify => "reidentify",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "convert" => Some(Self::Convert),
            "extract" => Some(Self::Extract),
            "manual" => Some(Self::Manual),
            "rename" => Some(Self::Rename),
            "ignore" => Some(Self::Ignore),
            "reidentify" => Some(Self::Reidentify),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Templates for ignored files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateType {
    Text,
    Empty,
    PasswordProtected,
    Corrupted,
    Duplicate,
    NotPreservable,
    NotConvertable,
    ExtractedArchive,
    TemporaryFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureOperator {
    And,
    Or,
}

/// What to do with the original action when re-identification fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFail {
    /// Keep the action.
    Action,
    /// Clear the action type.
    #[default]
    Null,
}

impl OnFail {
    fn is_default(&self) -> bool {
        *self == Self::Null
    }
}

/// Follow-up action after a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnSuccess {
    Convert,
    Manual,
    Ignore,
}

// ---------------------------------------------------------------------------
// Custom signatures
// ---------------------------------------------------------------------------

/// A locally maintained signature matched against the hex-encoded start
/// and/or end of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_custom_signature"))]
pub struct CustomSignature {
    pub puid: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<SignatureOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

fn non_empty(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn validate_custom_signature(sig: &CustomSignature) -> Result<(), ValidationError> {
    let has_bof = non_empty(sig.bof.as_ref());
    let has_eof = non_empty(sig.eof.as_ref());
    if !has_bof && !has_eof {
        return Err(validation_error("missing_pattern", "One of bof or eof must be set."));
    }
    if has_bof && has_eof && sig.operator.is_none() {
        return Err(validation_error(
            "missing_operator",
            "Operator must be set if both bof and eof are set.",
        ));
    }
    Ok(())
}

/// A [`CustomSignature`] with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledSignature {
    pub signature: CustomSignature,
    bof: Option<Regex>,
    eof: Option<Regex>,
}

fn compile_pattern(puid: &str, pattern: Option<&String>) -> Result<Option<Regex>, CoreError> {
    match pattern.filter(|p| !p.is_empty()) {
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| CoreError::Validation(format!("invalid pattern for {puid}: {e}"))),
        None => Ok(None),
    }
}

impl CompiledSignature {
    pub fn new(signature: CustomSignature) -> Result<Self, CoreError> {
        signature.validate()?;
        let bof = compile_pattern(&signature.puid, signature.bof.as_ref())?;
        let eof = compile_pattern(&signature.puid, signature.eof.as_ref())?;
        Ok(Self { signature, bof, eof })
    }

    /// Length of the matched hex text, or 0 when the signature does not match.
    ///
    /// With both patterns, `AND` requires both to match and returns the sum,
    /// `OR` returns the sum if both match or the length of the one that does.
    pub fn match_length(&self, bof: &str, eof: &str) -> usize {
        if bof.is_empty() && eof.is_empty() {
            return 0;
        }

        let span = |re: &Regex, haystack: &str| re.find(haystack).map(|m| m.end() - m.start());

        match (&self.bof, &self.eof) {
            (Some(bof_re), Some(eof_re)) => {
                let bof_match = span(bof_re, bof);
                if self.signature.operator == Some(SignatureOperator::And) && bof_match.is_none() {
                    return 0;
                }
                let eof_match = span(eof_re, eof);
                match (bof_match, eof_match) {
                    (Some(b), Some(e)) => b + e,
                    (Some(b), None) if self.signature.operator == Some(SignatureOperator::Or) => b,
                    (None, Some(e)) if self.signature.operator == Some(SignatureOperator::Or) => e,
                    _ => 0,
                }
            }
            (Some(bof_re), None) => span(bof_re, bof).unwrap_or(0),
            (None, Some(eof_re)) => span(eof_re, eof).unwrap_or(0),
            (None, None) => 0,
        }
    }
}

/// A compiled set of custom signatures.
#[derive(Debug, Clone, Default)]
pub struct CustomSignatures {
    signatures: Vec<CompiledSignature>,
}

impl CustomSignatures {
    pub fn new(signatures: Vec<CustomSignature>) -> Result<Self, CoreError> {
        let signatures = signatures
            .into_iter()
            .map(CompiledSignature::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { signatures })
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// The signature with the longest match; the first one wins ties.
    pub fn best_match(&self, bof: &str, eof: &str) -> Option<&CustomSignature> {
        let mut best: Option<&CustomSignature> = None;
        let mut best_length = 0;
        for compiled in &self.signatures {
            let length = compiled.match_length(bof, eof);
            if length > best_length {
                best = Some(&compiled.signature);
                best_length = length;
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Action data
// ---------------------------------------------------------------------------

/// Minimum thresholds under which a file is ignored as not preservable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct IgnoreIfAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub image_pixels_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub image_width_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub image_height_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub size: Option<u64>,
}

impl IgnoreIfAction {
    pub fn has_image_rules(&self) -> bool {
        self.image_pixels_min.is_some() || self.image_width_min.is_some() || self.image_height_min.is_some()
    }
}

/// Identify the file again with custom signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReIdentifyAction {
    pub reason: String,
    /// Number of bytes searched at each end of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "OnFail::is_default")]
    pub on_fail: OnFail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_convert_action"))]
pub struct ConvertAction {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

fn validate_convert_action(action: &ConvertAction) -> Result<(), ValidationError> {
    if action.tool != "copy" && !non_empty(action.output.as_ref()) {
        return Err(validation_error("missing_output", "Missing output."));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ExtractAction {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<OnSuccess>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ManualAction {
    pub reason: String,
    pub process: String,
}

/// Change the extension of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RenameAction {
    pub extension: String,
    /// Only rename when siegfried reported an extension mismatch.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub on_extension_mismatch: bool,
}

/// Ignore the file. Text templates must carry a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_ignore_action"))]
pub struct IgnoreAction {
    pub template: TemplateType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_trimmed"
    )]
    pub reason: Option<String>,
}

impl IgnoreAction {
    pub fn new(template: TemplateType, reason: Option<String>) -> Self {
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        Self { template, reason }
    }
}

fn deserialize_trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

fn validate_ignore_action(action: &IgnoreAction) -> Result<(), ValidationError> {
    if action.template == TemplateType::Text && action.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
        return Err(validation_error(
            "missing_reason",
            "Reason cannot be empty when template is set to text.",
        ));
    }
    Ok(())
}

/// The per-type data of an action, stored alongside original files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ActionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub reidentify: Option<ReIdentifyAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub convert: Option<ConvertAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub extract: Option<ExtractAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub manual: Option<ManualAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub ignore: Option<IgnoreAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub rename: Option<RenameAction>,
}

impl ActionData {
    /// Whether the data for the given action type is present.
    pub fn has(&self, action: ActionType) -> bool {
        match action {
            ActionType::Convert => self.convert.is_some(),
            ActionType::Extract => self.extract.is_some(),
            ActionType::Manual => self.manual.is_some(),
            ActionType::Rename => self.rename.is_some(),
            ActionType::Ignore => self.ignore.is_some(),
            ActionType::Reidentify => self.reidentify.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An entry of `fileformats.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_action"))]
pub struct Action {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Suffix (lower-cased) to PUID overrides.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_alternatives"
    )]
    pub alternatives: BTreeMap<String, String>,
    #[serde(default)]
    pub action: Option<ActionType>,
    #[serde(default, alias = "ignore-warnings", skip_serializing_if = "Vec::is_empty")]
    pub ignore_warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub ignore_if: Option<IgnoreIfAction>,
    #[serde(flatten)]
    #[validate(nested)]
    pub data: ActionData,
}

fn deserialize_alternatives<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error> {
    let value = Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(value.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect())
}

fn validate_action(action: &Action) -> Result<(), ValidationError> {
    match action.action {
        Some(kind) if !action.data.has(kind) => {
            let mut err = validation_error(
                "missing_action_data",
                "If action is set, the action field must be set as well.",
            );
            err.add_param(Cow::Borrowed("action"), &kind.as_str());
            Err(err)
        }
        _ => Ok(()),
    }
}

impl Action {
    /// An action that only asks for manual processing.
    pub fn manual(name: impl Into<String>, reason: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            alternatives: BTreeMap::new(),
            action: Some(ActionType::Manual),
            ignore_warnings: Vec::new(),
            ignore_if: None,
            data: ActionData {
                manual: Some(ManualAction {
                    reason: reason.into(),
                    process: process.into(),
                }),
                ..ActionData::default()
            },
        }
    }

    /// Only the per-type data of the action.
    pub fn action_data(&self) -> ActionData {
        self.data.clone()
    }
}

/// An entry of `master_fileformats.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MasterConvertAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[validate(nested)]
    pub access: ConvertAction,
    #[validate(nested)]
    pub statutory: ConvertAction,
}

/// Actions keyed by identifier.
pub type Actions = BTreeMap<String, Action>;
/// Master conversion actions keyed by identifier.
pub type MasterActions = BTreeMap<String, MasterConvertAction>;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn validate_entries<'a, T: Validate + 'a>(entries: impl IntoIterator<Item = (&'a String, &'a T)>) -> Result<(), CoreError> {
    for (key, entry) in entries {
        entry
            .validate()
            .map_err(|e| CoreError::Validation(format!("{key}: {e}")))?;
    }
    Ok(())
}

/// Parse and validate the contents of `fileformats.yml`.
pub fn parse_actions(yaml: &str) -> Result<Actions, CoreError> {
    let actions: Actions = serde_yaml::from_str(yaml).map_err(|e| CoreError::Validation(e.to_string()))?;
    validate_entries(&actions)?;
    Ok(actions)
}

/// Parse and validate the contents of `master_fileformats.yml`.
pub fn parse_master_actions(yaml: &str) -> Result<MasterActions, CoreError> {
    let actions: MasterActions = serde_yaml::from_str(yaml).map_err(|e| CoreError::Validation(e.to_string()))?;
    validate_entries(&actions)?;
    Ok(actions)
}

/// Parse and validate the contents of `custom_signatures.json`.
pub fn parse_custom_signatures(json: &str) -> Result<Vec<CustomSignature>, CoreError> {
    let signatures: Vec<CustomSignature> =
        serde_json::from_str(json).map_err(|e| CoreError::Validation(e.to_string()))?;
    for signature in &signatures {
        signature
            .validate()
            .map_err(|e| CoreError::Validation(format!("{}: {e}", signature.puid)))?;
    }
    Ok(signatures)
}
