//! Fields and identification shared by every file role.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::error::CoreError;
use crate::reference_files::{CustomSignature, CustomSignatures};
use crate::siegfried::{SiegfriedFile, SiegfriedMatch};
use crate::utils::{self, path, EncodingMode, FileEncoding, DEFAULT_CHUNK_SIZE};

/// Warning set when a custom signature names a different extension.
pub const EXTENSION_MISMATCH: &str = "extension mismatch";

/// A file inside an archive folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseFile {
    pub uuid: Uuid,
    /// SHA-256 hex digest.
    pub checksum: String,
    pub encoding: Option<FileEncoding>,
    /// Path relative to the archive root, the primary key of every files table.
    pub relative_path: PathBuf,
    pub is_binary: bool,
    pub size: u64,
    pub puid: Option<String>,
    pub signature: Option<String>,
    pub warning: Option<Vec<String>>,
    /// Archive root. Never stored.
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl BaseFile {
    /// Read a file from disk and identify it.
    ///
    /// The siegfried result is applied first; custom signatures are only
    /// tried when it produced no PUID.
    pub fn from_file(
        path: &Path,
        root: &Path,
        siegfried: Option<&SiegfriedFile>,
        custom_signatures: Option<&CustomSignatures>,
        uuid: Option<Uuid>,
        encoding: &EncodingMode,
    ) -> Result<Self, CoreError> {
        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| {
                CoreError::FileCollection(format!("{} is not inside {}", path.display(), root.display()))
            })?
            .to_path_buf();

        let is_binary = utils::is_binary(path, DEFAULT_CHUNK_SIZE)?;
        let size = fs::metadata(path)?.len();

        let (checksum, encoding) = match encoding {
            EncodingMode::Auto => utils::file_checksum_with_encoding(path, !is_binary)?,
            EncodingMode::Detect => utils::file_checksum_with_encoding(path, true)?,
            EncodingMode::Skip => utils::file_checksum_with_encoding(path, false)?,
            EncodingMode::Fixed(name) => (utils::file_checksum(path)?, Some(FileEncoding::fixed(name.clone()))),
        };

        let mut file = Self {
            uuid: uuid.unwrap_or_else(Uuid::new_v4),
            checksum,
            encoding,
            relative_path,
            is_binary,
            size,
            puid: None,
            signature: None,
            warning: None,
            root: Some(root.to_path_buf()),
        };

        if let Some(sf) = siegfried {
            file.identify(sf, true);
        }

        if let Some(signatures) = custom_signatures {
            if file.puid.is_none() {
                file.identify_custom(signatures, None, true)?;
            }
        }

        Ok(file)
    }

    /// Pick the best siegfried match and, with `set_match`, copy its PUID,
    /// format name and warnings. Without a match the three fields are cleared.
    pub fn identify<'a>(&mut self, sf: &'a SiegfriedFile, set_match: bool) -> Option<&'a SiegfriedMatch> {
        let best = sf.best_match();

        if set_match {
            match best {
                Some(m) => {
                    self.puid = m.id.clone();
                    self.signature = Some(m.format.clone());
                    self.warning = (!m.warning.is_empty()).then(|| m.warning.clone());
                }
                None => {
                    self.puid = None;
                    self.signature = None;
                    self.warning = None;
                }
            }
        }

        best
    }

    /// Match the file's first and last `chunk_size` bytes (1024 by default)
    /// against custom signatures.
    pub fn identify_custom(
        &mut self,
        signatures: &CustomSignatures,
        chunk_size: Option<usize>,
        set_match: bool,
    ) -> Result<Option<CustomSignature>, CoreError> {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let path = self.absolute_path(None);
        let bof = hex(&utils::get_bof(&path, chunk_size)?);
        let eof = hex(&utils::get_eof(&path, chunk_size)?);

        let matched = signatures.best_match(&bof, &eof).cloned();

        if let (true, Some(sig)) = (set_match, &matched) {
            self.puid = Some(sig.puid.clone());
            self.signature = Some(sig.signature.clone());
            self.warning = match &sig.extension {
                Some(ext) if self.suffix() != *ext => Some(vec![EXTENSION_MISMATCH.to_string()]),
                _ => None,
            };
        }

        Ok(matched)
    }

    /// Join `root` (or the stored root) with the relative path. Without any
    /// root the relative path is resolved against the working directory.
    pub fn absolute_path(&self, root: Option<&Path>) -> PathBuf {
        match root.or(self.root.as_deref()) {
            Some(root) => root.join(&self.relative_path),
            None => std::path::absolute(&self.relative_path).unwrap_or_else(|_| self.relative_path.clone()),
        }
    }

    pub fn refresh_checksum(&mut self) -> Result<&str, CoreError> {
        self.checksum = utils::file_checksum(&self.absolute_path(None))?;
        Ok(&self.checksum)
    }

    pub fn refresh_encoding(&mut self) -> Result<Option<&FileEncoding>, CoreError> {
        self.encoding = utils::file_encoding(&self.absolute_path(None))?;
        Ok(self.encoding.as_ref())
    }

    pub fn refresh_size(&mut self) -> Result<u64, CoreError> {
        self.size = fs::metadata(self.absolute_path(None))?.len();
        Ok(self.size)
    }

    // ---- name helpers ----

    pub fn name(&self) -> String {
        path::file_name(&self.relative_path)
    }

    pub fn set_name(&mut self, name: &str) {
        self.relative_path.set_file_name(name);
    }

    /// The name without its trailing valid suffixes.
    pub fn stem(&self) -> String {
        let name = self.name();
        let suffixes = self.suffixes();
        name.strip_suffix(suffixes.as_str()).unwrap_or(&name).to_string()
    }

    pub fn set_stem(&mut self, stem: &str) {
        let name = format!("{stem}{}", self.suffixes());
        self.set_name(&name);
    }

    /// The last suffix, including the dot.
    pub fn suffix(&self) -> String {
        path::path_suffix(&self.name()).to_string()
    }

    pub fn set_suffix(&mut self, suffix: &str) {
        let name = self.name();
        let current = path::path_suffix(&name);
        let base = &name[..name.len() - current.len()];
        let new_name = format!("{base}{suffix}");
        self.set_name(&new_name);
    }

    /// The trailing run of valid suffixes (`"a.tar.gz"` → `".tar.gz"`).
    pub fn suffixes(&self) -> String {
        path::valid_suffixes(&self.name())
    }

    pub fn set_suffixes(&mut self, suffixes: &str) {
        let new_name = format!("{}{suffixes}", self.stem());
        self.set_name(&new_name);
    }

    /// Every suffix of the name joined together, valid or not.
    pub fn all_suffixes(&self) -> String {
        path::path_suffixes(&self.name()).concat()
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
