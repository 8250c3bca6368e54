//! File utilities shared by the file models and the database upgrades.

pub mod checksum;
pub mod io;
pub mod path;
pub mod size;

pub use checksum::{file_checksum, file_checksum_with_encoding, file_encoding, EncodingMode, FileEncoding};
pub use io::{find_files, get_bof, get_eof, image_size, is_binary, rm_tree, DEFAULT_CHUNK_SIZE};
pub use path::{is_valid_suffix, path_suffix, path_suffixes, valid_suffixes};
pub use size::size_fmt;
