use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use super::{get_identifier, ArchiveFile, BaseFile, FileType, IdentifyContext};
use crate::error::CoreError;
use crate::reference_files::{ConvertAction, CustomSignatures, MasterActions, MasterConvertAction};
use crate::siegfried::SiegfriedFile;
use crate::utils::EncodingMode;

/// Output of a conversion, linked to the file it was converted from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedFile {
    #[serde(flatten)]
    pub base: BaseFile,
    pub original_uuid: Option<Uuid>,
}

/// An access copy, converted from a master file.
pub type AccessFile = ConvertedFile;

impl ArchiveFile for ConvertedFile {
    const FILE_TYPE: FileType = FileType::Access;

    fn base(&self) -> &BaseFile {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFile {
        &mut self.base
    }
}

impl ConvertedFile {
    pub fn from_file(
        path: &Path,
        root: &Path,
        original_uuid: Option<Uuid>,
        siegfried: Option<&SiegfriedFile>,
        custom_signatures: Option<&CustomSignatures>,
        uuid: Option<Uuid>,
        encoding: &EncodingMode,
    ) -> Result<Self, CoreError> {
        let base = BaseFile::from_file(path, root, siegfried, custom_signatures, uuid, encoding)?;
        Ok(Self { base, original_uuid })
    }
}

// ---------------------------------------------------------------------------
// Master files
// ---------------------------------------------------------------------------

/// Bit set in [`MasterFile::processed`] once the access copy exists.
pub const PROCESSED_ACCESS: u8 = 0b01;
/// Bit set in [`MasterFile::processed`] once the statutory copy exists.
pub const PROCESSED_STATUTORY: u8 = 0b10;

/// Which conversion of a master file an action lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertTarget {
    Access,
    Statutory,
    All,
}

impl ConvertTarget {
    fn access(self) -> bool {
        matches!(self, Self::Access | Self::All)
    }

    fn statutory(self) -> bool {
        matches!(self, Self::Statutory | Self::All)
    }
}

/// A preservation master converted from an original file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterFile {
    #[serde(flatten)]
    pub base: BaseFile,
    pub original_uuid: Option<Uuid>,
    pub convert_access: Option<ConvertAction>,
    pub convert_statutory: Option<ConvertAction>,
    /// Bit flags: [`PROCESSED_ACCESS`], [`PROCESSED_STATUTORY`].
    pub processed: u8,
}

impl ArchiveFile for MasterFile {
    const FILE_TYPE: FileType = FileType::Master;

    fn base(&self) -> &BaseFile {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFile {
        &mut self.base
    }
}

impl MasterFile {
    pub fn new(base: BaseFile, original_uuid: Option<Uuid>, processed: u8) -> Result<Self, CoreError> {
        validate_processed(processed)?;
        Ok(Self {
            base,
            original_uuid,
            convert_access: None,
            convert_statutory: None,
            processed,
        })
    }

    pub fn from_file(
        path: &Path,
        root: &Path,
        original_uuid: Option<Uuid>,
        ctx: IdentifyContext<'_, MasterConvertAction>,
        uuid: Option<Uuid>,
        processed: u8,
        encoding: &EncodingMode,
    ) -> Result<Self, CoreError> {
        let base = BaseFile::from_file(path, root, None, None, uuid, encoding)?;
        let mut file = Self::new(base, original_uuid, processed)?;
        file.identify(ctx)?;
        Ok(file)
    }

    /// Identify the file and set both conversion actions.
    ///
    /// Custom signatures are only used when siegfried is not given or has no
    /// match.
    pub fn identify(&mut self, ctx: IdentifyContext<'_, MasterConvertAction>) -> Result<(), CoreError> {
        if ctx.siegfried.is_none() && ctx.custom_signatures.is_none() {
            return Ok(());
        }

        let mut file_classes: Vec<String> = Vec::new();
        let siegfried_match = ctx.siegfried.and_then(|sf| self.base.identify(sf, true));

        if let Some(m) = siegfried_match {
            file_classes = m.match_class.clone();
        } else if let Some(signatures) = ctx.custom_signatures {
            self.base.identify_custom(signatures, None, true)?;
        }

        if let Some(actions) = ctx.actions {
            self.get_action(ConvertTarget::All, actions, &file_classes, true);
        }

        Ok(())
    }

    /// Find the conversion action for the file and, with `set_match`, store
    /// the access and/or statutory part of it (clearing them when nothing
    /// matches).
    pub fn get_action<'a>(
        &mut self,
        target: ConvertTarget,
        actions: &'a MasterActions,
        file_classes: &[String],
        set_match: bool,
    ) -> Option<&'a MasterConvertAction> {
        let action = get_identifier(&self.base, file_classes, actions);

        if set_match {
            if target.access() {
                self.convert_access = action.map(|a| a.access.clone());
            }
            if target.statutory() {
                self.convert_statutory = action.map(|a| a.statutory.clone());
            }
        }

        action
    }

    pub fn set_processed(&mut self, flag: u8) {
        self.processed |= flag & (PROCESSED_ACCESS | PROCESSED_STATUTORY);
    }

    pub fn is_processed(&self, flag: u8) -> bool {
        self.processed & flag == flag
    }
}

fn validate_processed(processed: u8) -> Result<(), CoreError> {
    if processed > (PROCESSED_ACCESS | PROCESSED_STATUTORY) {
        return Err(CoreError::Validation(format!("processed must be between 0 and 3, got {processed}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Statutory files
// ---------------------------------------------------------------------------

/// A statutory copy, numbered into document collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatutoryFile {
    #[serde(flatten)]
    pub base: BaseFile,
    pub original_uuid: Option<Uuid>,
    pub doc_collection: Option<u32>,
    pub doc_id: Option<u32>,
}

impl ArchiveFile for StatutoryFile {
    const FILE_TYPE: FileType = FileType::Statutory;

    fn base(&self) -> &BaseFile {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFile {
        &mut self.base
    }
}

impl StatutoryFile {
    pub fn new(
        base: BaseFile,
        original_uuid: Option<Uuid>,
        doc_collection: Option<u32>,
        doc_id: Option<u32>,
    ) -> Result<Self, CoreError> {
        let file = Self {
            base,
            original_uuid,
            doc_collection,
            doc_id,
        };
        file.validate()?;
        Ok(file)
    }

    pub fn from_file(
        path: &Path,
        root: &Path,
        original_uuid: Option<Uuid>,
        siegfried: Option<&SiegfriedFile>,
        custom_signatures: Option<&CustomSignatures>,
        uuid: Option<Uuid>,
        doc: Option<(u32, u32)>,
        encoding: &EncodingMode,
    ) -> Result<Self, CoreError> {
        let base = BaseFile::from_file(path, root, siegfried, custom_signatures, uuid, encoding)?;
        let (doc_collection, doc_id) = doc.unzip();
        Self::new(base, original_uuid, doc_collection, doc_id)
    }

    /// Both document fields are set or neither is, and both are at least 1.
    pub fn validate(&self) -> Result<(), CoreError> {
        match (self.doc_collection, self.doc_id) {
            (None, None) => Ok(()),
            (Some(collection), Some(id)) if collection >= 1 && id >= 1 => Ok(()),
            (Some(_), Some(_)) => Err(CoreError::Validation(
                "doc_collection and doc_id must be at least 1".to_string(),
            )),
            (None, Some(_)) => Err(CoreError::Validation(
                "doc_collection must be specified when doc_id is specified".to_string(),
            )),
            (Some(_), None) => Err(CoreError::Validation(
                "doc_id must be specified when doc_collection is specified".to_string(),
            )),
        }
    }

    /// Set the document ID and the collection it falls in, with
    /// `docs_in_collection` documents per collection.
    pub fn set_doc_id(&mut self, doc_id: u32, docs_in_collection: u32) -> Result<(), CoreError> {
        if doc_id < 1 || docs_in_collection < 1 {
            return Err(CoreError::Validation(
                "doc_id and docs_in_collection must be at least 1".to_string(),
            ));
        }
        self.doc_collection = Some(doc_id.div_ceil(docs_in_collection));
        self.doc_id = Some(doc_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use assert_matches::assert_matches;

    use super::*;
    use crate::reference_files::parse_master_actions;
    use crate::siegfried::parse_result;

    fn base() -> BaseFile {
        BaseFile {
            uuid: Uuid::new_v4(),
            checksum: String::new(),
            encoding: None,
            relative_path: PathBuf::from("master/file.pdf"),
            is_binary: true,
            size: 100,
            puid: Some("fmt/95".to_string()),
            signature: None,
            warning: None,
            root: None,
        }
    }

    #[test]
    fn processed_is_limited_to_two_bits() {
        assert!(MasterFile::new(base(), None, 3).is_ok());
        assert_matches!(MasterFile::new(base(), None, 4), Err(CoreError::Validation(_)));
    }

    #[test]
    fn processed_flags_accumulate() {
        let mut file = MasterFile::new(base(), None, 0).unwrap();
        file.set_processed(PROCESSED_STATUTORY);
        assert!(file.is_processed(PROCESSED_STATUTORY));
        assert!(!file.is_processed(PROCESSED_ACCESS));
        file.set_processed(PROCESSED_ACCESS);
        assert_eq!(file.processed, 3);
    }

    #[test]
    fn master_actions_are_set_per_target() {
        let actions = parse_master_actions(
            "fmt/95:\n  access:\n    tool: copy\n  statutory:\n    tool: tiff\n    output: tif\n",
        )
        .unwrap();
        let mut file = MasterFile::new(base(), None, 0).unwrap();

        file.get_action(ConvertTarget::Access, &actions, &[], true);
        assert_eq!(file.convert_access.as_ref().map(|a| a.tool.as_str()), Some("copy"));
        assert!(file.convert_statutory.is_none());

        file.get_action(ConvertTarget::All, &actions, &[], true);
        assert_eq!(file.convert_statutory.as_ref().map(|a| a.tool.as_str()), Some("tiff"));

        file.base.puid = Some("fmt/1".to_string());
        file.get_action(ConvertTarget::Statutory, &actions, &[], true);
        assert!(file.convert_statutory.is_none());
        assert!(file.convert_access.is_some());
    }

    #[test]
    fn master_identify_uses_siegfried_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bin");
        fs::write(&path, b"\x00\x01binary").unwrap();
        let sf = parse_result(
            r#"{"siegfried":"1.11.0","scandate":"2024-01-01T00:00:00Z","signature":"default.sig",
            "created":"2024-01-01T00:00:00Z","identifiers":[],"files":[{"filename":"x","filesize":1,
            "modified":"2024-01-01T00:00:00Z","errors":"","matches":[{"ns":"pronom","id":"fmt/353",
            "format":"TIFF","version":"","mime":"image/tiff","class":"Image (Raster)","basis":"",
            "warning":""}]}]}"#,
        )
        .unwrap()
        .files
        .remove(0);
        let actions = parse_master_actions(
            "\"!image (raster)\":\n  access:\n    tool: image\n    output: jpg\n  statutory:\n    tool: copy\n",
        )
        .unwrap();

        let ctx = IdentifyContext::new(Some(&sf), None, Some(&actions));
        let file = MasterFile::from_file(&path, dir.path(), None, ctx, None, 0, &EncodingMode::Skip).unwrap();
        assert_eq!(file.base.puid.as_deref(), Some("fmt/353"));
        assert_eq!(file.convert_access.as_ref().and_then(|a| a.output.as_deref()), Some("jpg"));
        assert_eq!(file.convert_statutory.as_ref().map(|a| a.tool.as_str()), Some("copy"));
    }

    #[test]
    fn statutory_doc_fields_go_together() {
        assert!(StatutoryFile::new(base(), None, None, None).is_ok());
        assert!(StatutoryFile::new(base(), None, Some(1), Some(1)).is_ok());
        assert_matches!(StatutoryFile::new(base(), None, None, Some(1)), Err(CoreError::Validation(_)));
        assert_matches!(StatutoryFile::new(base(), None, Some(1), None), Err(CoreError::Validation(_)));
        assert_matches!(StatutoryFile::new(base(), None, Some(0), Some(1)), Err(CoreError::Validation(_)));
    }

    #[test]
    fn set_doc_id_computes_collection() {
        let mut file = StatutoryFile::new(base(), None, None, None).unwrap();
        file.set_doc_id(1, 10000).unwrap();
        assert_eq!((file.doc_collection, file.doc_id), (Some(1), Some(1)));
        file.set_doc_id(10000, 10000).unwrap();
        assert_eq!(file.doc_collection, Some(1));
        file.set_doc_id(10001, 10000).unwrap();
        assert_eq!(file.doc_collection, Some(2));
        assert!(file.set_doc_id(0, 10).is_err());
    }

    #[test]
    fn converted_file_keeps_original_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.txt");
        fs::write(&path, b"copy").unwrap();
        let original = Uuid::new_v4();
        let file = ConvertedFile::from_file(&path, dir.path(), Some(original), None, None, None, &EncodingMode::Skip)
            .unwrap();
        assert_eq!(file.original_uuid, Some(original));
        assert_eq!(<ConvertedFile as ArchiveFile>::FILE_TYPE, FileType::Access);
    }
}
