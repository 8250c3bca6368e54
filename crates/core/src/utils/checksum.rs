//! Streaming SHA-256 checksums with optional character-encoding detection.
//!
//! The checksum and the encoding guess are computed in the same pass over
//! the file so large text files are only read once.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Read size used for hashing and encoding detection (1 MiB).
pub const CHUNK_SIZE: usize = 1 << 20;

/// Confidence reported for encodings read from a byte-order mark or set manually.
const CONFIDENCE_CERTAIN: f64 = 1.0;
/// Confidence reported for UTF-8 content without a byte-order mark.
const CONFIDENCE_UTF8: f64 = 0.99;
/// Confidence reported for legacy single- and multi-byte encodings.
const CONFIDENCE_GUESS: f64 = 0.5;

/// Character-encoding guess for a text file.
///
/// The shape matches the JSON objects stored in the `encoding` column of the
/// files database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEncoding {
    pub encoding: String,
    pub confidence: f64,
    #[serde(default)]
    pub language: String,
}

impl FileEncoding {
    /// An encoding set by hand rather than detected.
    pub fn fixed(name: impl Into<String>) -> Self {
        Self {
            encoding: name.into(),
            confidence: CONFIDENCE_CERTAIN,
            language: String::new(),
        }
    }
}

/// How the encoding of a file should be determined when it is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EncodingMode {
    /// Detect the encoding only for files that are not binary.
    #[default]
    Auto,
    /// Always detect the encoding.
    Detect,
    /// Never detect the encoding.
    Skip,
    /// Use the given encoding name without reading the file.
    Fixed(String),
}

/// Compute the SHA-256 hex digest of a file, reading it in 1 MiB chunks.
pub fn file_checksum(path: &Path) -> std::io::Result<String> {
    file_checksum_with_encoding(path, false).map(|(checksum, _)| checksum)
}

/// Compute the SHA-256 hex digest of a file and, if `detect` is set, guess
/// its character encoding in the same pass.
///
/// Empty files never get an encoding.
pub fn file_checksum_with_encoding(path: &Path, detect: bool) -> std::io::Result<(String, Option<FileEncoding>)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut detector = detect.then(EncodingSniffer::new);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        if let Some(detector) = detector.as_mut() {
            detector.feed(&buffer[..read]);
        }
    }

    let checksum = format!("{:x}", hasher.finalize());
    Ok((checksum, detector.and_then(EncodingSniffer::finish)))
}

/// Guess the encoding of a file.
pub fn file_encoding(path: &Path) -> std::io::Result<Option<FileEncoding>> {
    file_checksum_with_encoding(path, true).map(|(_, encoding)| encoding)
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

struct EncodingSniffer {
    detector: EncodingDetector,
    head: Vec<u8>,
    non_ascii: bool,
    empty: bool,
}

impl EncodingSniffer {
    fn new() -> Self {
        Self {
            detector: EncodingDetector::new(),
            head: Vec::with_capacity(3),
            non_ascii: false,
            empty: true,
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.empty = false;
        if self.head.len() < 3 {
            let take = (3 - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
        }
        self.non_ascii |= self.detector.feed(chunk, false);
    }

    fn finish(mut self) -> Option<FileEncoding> {
        if self.empty {
            return None;
        }

        if let Some((encoding, _)) = Encoding::for_bom(&self.head) {
            let name = if encoding == encoding_rs::UTF_8 {
                "UTF-8-SIG"
            } else {
                "UTF-16"
            };
            return Some(FileEncoding::fixed(name));
        }

        self.detector.feed(&[], true);

        if !self.non_ascii {
            return Some(FileEncoding {
                encoding: "ascii".to_string(),
                confidence: CONFIDENCE_CERTAIN,
                language: String::new(),
            });
        }

        let encoding = self.detector.guess(None, true);
        let confidence = if encoding == encoding_rs::UTF_8 {
            CONFIDENCE_UTF8
        } else {
            CONFIDENCE_GUESS
        };

        Some(FileEncoding {
            encoding: encoding.name().to_lowercase(),
            confidence,
            language: String::new(),
        })
    }
}
