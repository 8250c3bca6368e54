//! File models for the four roles a file can have in an archive.
//!
//! * [`OriginalFile`]: a file as it was received.
//! * [`MasterFile`]: a preservation master converted from an original.
//! * [`AccessFile`]: an access copy converted from a master.
//! * [`StatutoryFile`]: a statutory copy converted from a master.

mod base;
mod converted;
mod original;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use base::{BaseFile, EXTENSION_MISMATCH};
pub use converted::{
    AccessFile, ConvertTarget, ConvertedFile, MasterFile, StatutoryFile, PROCESSED_ACCESS, PROCESSED_STATUTORY,
};
pub use original::{ignore_if, OriginalFile};

use crate::error::CoreError;
use crate::reference_files::CustomSignatures;
use crate::siegfried::SiegfriedFile;

/// The role of a file, as recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Original,
    Master,
    Access,
    Statutory,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Master => "master",
            Self::Access => "access",
            Self::Statutory => "statutory",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(Self::Original),
            "master" => Ok(Self::Master),
            "access" => Ok(Self::Access),
            "statutory" => Ok(Self::Statutory),
            other => Err(CoreError::Validation(format!("unknown file type {other:?}"))),
        }
    }
}

/// Access to the shared [`BaseFile`] part of every file model.
pub trait ArchiveFile {
    const FILE_TYPE: FileType;

    fn base(&self) -> &BaseFile;
    fn base_mut(&mut self) -> &mut BaseFile;
}

/// Sources used to identify a file. Any of them may be missing.
#[derive(Debug)]
pub struct IdentifyContext<'a, A> {
    pub siegfried: Option<&'a SiegfriedFile>,
    pub custom_signatures: Option<&'a CustomSignatures>,
    pub actions: Option<&'a BTreeMap<String, A>>,
}

impl<A> Clone for IdentifyContext<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for IdentifyContext<'_, A> {}

impl<A> Default for IdentifyContext<'_, A> {
    fn default() -> Self {
        Self {
            siegfried: None,
            custom_signatures: None,
            actions: None,
        }
    }
}

impl<'a, A> IdentifyContext<'a, A> {
    pub fn new(
        siegfried: Option<&'a SiegfriedFile>,
        custom_signatures: Option<&'a CustomSignatures>,
        actions: Option<&'a BTreeMap<String, A>>,
    ) -> Self {
        Self {
            siegfried,
            custom_signatures,
            actions,
        }
    }
}

/// The identifiers a file can be looked up by, in priority order.
///
/// `!empty` (zero-size files), `!name=NAME`, `!iname=name`, the PUID,
/// `!ext=.ALL.SUFFIXES`, `!CLASS` for each siegfried class, `!binary`.
pub fn identifiers(file: &BaseFile, file_classes: &[String]) -> Vec<String> {
    let name = file.name();
    let mut identifiers = Vec::with_capacity(6 + file_classes.len());

    if file.size == 0 {
        identifiers.push("!empty".to_string());
    }
    identifiers.push(format!("!name={name}"));
    identifiers.push(format!("!iname={}", name.to_lowercase()));
    if let Some(puid) = &file.puid {
        identifiers.push(puid.clone());
    }
    if !file.suffix().is_empty() {
        identifiers.push(format!("!ext={}", file.all_suffixes()));
    }
    identifiers.extend(file_classes.iter().map(|c| format!("!{c}")));
    if file.is_binary {
        identifiers.push("!binary".to_string());
    }

    identifiers
}

/// The first entry of `actions` matching one of the file's identifiers.
pub fn get_identifier<'a, A>(
    file: &BaseFile,
    file_classes: &[String],
    actions: &'a BTreeMap<String, A>,
) -> Option<&'a A> {
    identifiers(file, file_classes)
        .iter()
        .find_map(|id| actions.get(id))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::*;

    fn base(name: &str, size: u64, is_binary: bool, puid: Option<&str>) -> BaseFile {
        BaseFile {
            uuid: Uuid::new_v4(),
            checksum: String::new(),
            encoding: None,
            relative_path: PathBuf::from("folder").join(name),
            is_binary,
            size,
            puid: puid.map(str::to_string),
            signature: None,
            warning: None,
            root: None,
        }
    }

    #[test]
    fn identifier_order() {
        let file = base("Photo.TAR.gz", 0, true, Some("fmt/1"));
        let ids = identifiers(&file, &["image (raster)".to_string()]);
        assert_eq!(
            ids,
            vec![
                "!empty",
                "!name=Photo.TAR.gz",
                "!iname=photo.tar.gz",
                "fmt/1",
                "!ext=.TAR.gz",
                "!image (raster)",
                "!binary",
            ]
        );
    }

    #[test]
    fn no_extension_identifier_without_suffix() {
        let file = base("README", 10, false, None);
        assert_eq!(identifiers(&file, &[]), vec!["!name=README", "!iname=readme"]);
    }

    #[test]
    fn get_identifier_returns_first_hit() {
        let file = base("a.txt", 5, false, Some("x-fmt/111"));
        let mut actions = BTreeMap::new();
        actions.insert("x-fmt/111".to_string(), "by puid");
        actions.insert("!ext=.txt".to_string(), "by ext");
        actions.insert("!iname=a.txt".to_string(), "by name");
        assert_eq!(get_identifier(&file, &[], &actions), Some(&"by name"));

        actions.remove("!iname=a.txt");
        assert_eq!(get_identifier(&file, &[], &actions), Some(&"by puid"));
    }

    #[test]
    fn file_type_parses() {
        assert_eq!("statutory".parse::<FileType>().unwrap(), FileType::Statutory);
        assert!("other".parse::<FileType>().is_err());
        assert_eq!(FileType::Access.to_string(), "access");
    }
}
