//! Error taxonomy for EmoKV.
//!
//! - `OpenError`       — store cannot be constructed (fatal).
//! - `AllocationError` — backing file cannot grow; surfaced from `put`.
//! - `CorruptionError` — detected while decoding; routed through the error handler on `get`.
//! - `EmoKvError`      — umbrella type returned by the public API.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmoKvError>;

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("bad magic in {path}")]
    BadMagic { path: PathBuf },

    #[error("unsupported format version {found} in {path} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("corrupt header in {path}: {reason}")]
    CorruptHeader { path: PathBuf, reason: String },

    #[error("store is locked by another instance: {path}")]
    Locked { path: PathBuf },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index and value files disagree: {0}")]
    Inconsistent(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("out of space: cannot grow {path} to {requested} bytes ({reason})")]
    OutOfSpace {
        path: PathBuf,
        requested: u64,
        reason: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("truncated record: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("record length mismatch: header says {expected} bytes, index says {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("record flags {record:#04x} disagree with index flags {slot:#04x}")]
    FlagsMismatch { slot: u8, record: u8 },

    #[error("range {offset}+{len} is outside the mapped region ({mapped} bytes)")]
    OutOfBounds { offset: u64, len: u64, mapped: u64 },

    #[error("invalid slot state byte {0}")]
    InvalidSlotState(u8),

    #[error("decompression failed: {0}")]
    Decompress(String),
}

#[derive(Error, Debug)]
pub enum EmoKvError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Corruption(#[from] CorruptionError),

    #[error("store is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("value of key {key:?} is not valid UTF-8")]
    NotUtf8 { key: String },
}

impl EmoKvError {
    /// Corruption errors are contained per key via the error handler.
    #[inline]
    pub fn is_corruption(&self) -> bool {
        matches!(self, EmoKvError::Corruption(_))
    }

    #[inline]
    pub fn is_out_of_space(&self) -> bool {
        matches!(self, EmoKvError::Allocation(AllocationError::OutOfSpace { .. }))
    }

    pub fn as_corruption(&self) -> Option<&CorruptionError> {
        match self {
            EmoKvError::Corruption(c) => Some(c),
            _ => None,
        }
    }
}
