//! The `Block` type shared by every component: a chunk of file content
//! identified by its offset within the source file and its content hash.

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

/// Length in bytes of a BLAKE2b-256 digest.
pub const HASH_SIZE: usize = 32;

/// Whether a block was newly inserted by this session, already present,
/// or simply unknown (the usual state while reading a manifest back, before
/// content has been fetched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Novelty {
    New,
    Existing,
    Unknown,
}

/// A single chunk of a file's content.
///
/// `content` is only populated transiently, while it is in flight between
/// pipeline stages; once a block has been written to (or read from) the
/// Block Store it is cleared to avoid holding two copies in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub offset: u64,
    pub size: u64,
    pub hash: String,
    pub is_new: Novelty,
    pub content: Option<Vec<u8>>,
}

impl Block {
    pub fn new(offset: u64, size: u64, hash: String, is_new: Novelty) -> Self {
        Self {
            offset,
            size,
            hash,
            is_new,
            content: None,
        }
    }

    /// `BLAKE2b-256(content)`, rendered as lowercase hex.
    pub fn hash_content(content: &[u8]) -> String {
        let mut hasher = Blake2bVar::new(HASH_SIZE).expect("32 is a valid BLAKE2b output size");
        hasher.update(content);
        let mut out = [0u8; HASH_SIZE];
        hasher
            .finalize_variable(&mut out)
            .expect("output buffer is exactly HASH_SIZE");
        hex::encode(out)
    }

    /// Build a `Block` directly from content, computing its hash and size.
    pub fn from_content(offset: u64, content: Vec<u8>, is_new: Novelty) -> Self {
        let hash = Self::hash_content(&content);
        let size = content.len() as u64;
        Self {
            offset,
            size,
            hash,
            is_new,
            content: Some(content),
        }
    }
}
