//! Centralized configuration and builder for EmoKV.
//!
//! - EmoKvOptions::from_env() reads EMOKV_* overrides on top of defaults.
//! - EmoKvBuilder (EmoKv::builder()) collects overrides and opens a store.
//!
//! Defaults:
//! - index_initial_space = 64 KiB, value_initial_space = 256 KiB
//! - crc_enabled = true, compression_enabled = false (codec = zstd level 3)
//! - max_load_factor = 0.7
//! - sync_on_write = false (msync only on flush/close)

use log::warn;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::codec::{Codec, ZstdCodec};
use crate::error::{EmoKvError, OpenError, Result};

/// Error handler contract: `(key, error) -> continue`.
/// Called synchronously on the calling thread; `true` turns the failure into a soft miss.
pub type ErrorHandler = Arc<dyn Fn(&str, &EmoKvError) -> bool + Send + Sync>;

/// Permissive handler: log and treat the key as absent.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|key: &str, err: &EmoKvError| {
        warn!("emokv: key {:?} treated as missing: {}", key, err);
        true
    })
}

/// Strict handler: every routed error propagates to the caller.
pub fn strict_error_handler() -> ErrorHandler {
    Arc::new(|_key: &str, _err: &EmoKvError| false)
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

#[derive(Clone)]
pub struct EmoKvOptions {
    /// Initial index file size in bytes (header + slot array + key heap).
    /// Env: EMOKV_INDEX_INITIAL_SPACE (default 65536)
    pub index_initial_space: u64,

    /// Initial value file size in bytes.
    /// Env: EMOKV_VALUE_INITIAL_SPACE (default 262144)
    pub value_initial_space: u64,

    /// Write CRC32 into new records and verify it on read.
    /// Env: EMOKV_CRC (default true)
    pub crc_enabled: bool,

    /// Compress new values with `codec` (kept only when smaller).
    /// Env: EMOKV_COMPRESSION (default false)
    pub compression_enabled: bool,

    pub codec: Arc<dyn Codec>,

    pub error_handler: ErrorHandler,

    /// Env: EMOKV_MAX_LOAD_FACTOR (default 0.7, valid 0.1..=0.95)
    pub max_load_factor: f64,

    /// msync both maps after every put/delete.
    /// Env: EMOKV_SYNC_ON_WRITE (default false)
    pub sync_on_write: bool,

    /// Upper bound for each backing file; growth past it is OutOfSpace.
    /// Env: EMOKV_MAX_FILE_SIZE (default None)
    pub max_file_size: Option<u64>,
}

impl Default for EmoKvOptions {
    fn default() -> Self {
        Self {
            index_initial_space: 64 * 1024,
            value_initial_space: 256 * 1024,
            crc_enabled: true,
            compression_enabled: false,
            codec: Arc::new(ZstdCodec::default()),
            error_handler: default_error_handler(),
            max_load_factor: 0.7,
            sync_on_write: false,
            max_file_size: None,
        }
    }
}

impl EmoKvOptions {
    pub fn from_env() -> Self {
        let mut opts = Self::default();

        if let Ok(v) = std::env::var("EMOKV_INDEX_INITIAL_SPACE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                opts.index_initial_space = n;
            }
        }
        if let Ok(v) = std::env::var("EMOKV_VALUE_INITIAL_SPACE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                opts.value_initial_space = n;
            }
        }
        if let Ok(v) = std::env::var("EMOKV_CRC") {
            opts.crc_enabled = env_flag(&v);
        }
        if let Ok(v) = std::env::var("EMOKV_COMPRESSION") {
            opts.compression_enabled = env_flag(&v);
        }
        if let Ok(v) = std::env::var("EMOKV_MAX_LOAD_FACTOR") {
            if let Ok(f) = v.trim().parse::<f64>() {
                opts.max_load_factor = f;
            }
        }
        if let Ok(v) = std::env::var("EMOKV_SYNC_ON_WRITE") {
            opts.sync_on_write = env_flag(&v);
        }
        if let Ok(v) = std::env::var("EMOKV_MAX_FILE_SIZE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                opts.max_file_size = Some(n);
            }
        }

        opts
    }

    pub fn with_index_initial_space(mut self, bytes: u64) -> Self {
        self.index_initial_space = bytes;
        self
    }

    pub fn with_value_initial_space(mut self, bytes: u64) -> Self {
        self.value_initial_space = bytes;
        self
    }

    pub fn with_crc(mut self, on: bool) -> Self {
        self.crc_enabled = on;
        self
    }

    pub fn with_compression(mut self, on: bool) -> Self {
        self.compression_enabled = on;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &EmoKvError) -> bool + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn with_max_load_factor(mut self, f: f64) -> Self {
        self.max_load_factor = f;
        self
    }

    pub fn with_sync_on_write(mut self, on: bool) -> Self {
        self.sync_on_write = on;
        self
    }

    pub fn with_max_file_size(mut self, limit: Option<u64>) -> Self {
        self.max_file_size = limit;
        self
    }

    /// Reject values the store cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.1..=0.95).contains(&self.max_load_factor) {
            return Err(OpenError::InvalidOptions(format!(
                "max_load_factor {} outside 0.1..=0.95",
                self.max_load_factor
            ))
            .into());
        }
        let id = self.codec.id();
        if id == 0 || id > 15 {
            return Err(OpenError::InvalidOptions(format!(
                "codec {} has id {} (must be 1..=15)",
                self.codec.name(),
                id
            ))
            .into());
        }
        if let Some(max) = self.max_file_size {
            let need = self.index_initial_space.max(self.value_initial_space);
            if max < need {
                return Err(OpenError::InvalidOptions(format!(
                    "max_file_size {} is below initial space {}",
                    max, need
                ))
                .into());
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EmoKvOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmoKvOptions")
            .field("index_initial_space", &self.index_initial_space)
            .field("value_initial_space", &self.value_initial_space)
            .field("crc_enabled", &self.crc_enabled)
            .field("compression_enabled", &self.compression_enabled)
            .field("codec", &self.codec)
            .field("max_load_factor", &self.max_load_factor)
            .field("sync_on_write", &self.sync_on_write)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for EmoKvOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EmoKvOptions {{ \
             index_initial_space: {}, \
             value_initial_space: {}, \
             crc: {}, \
             compression: {} ({}), \
             max_load_factor: {}, \
             sync_on_write: {}, \
             max_file_size: {} \
             }}",
            self.index_initial_space,
            self.value_initial_space,
            self.crc_enabled,
            self.compression_enabled,
            self.codec.name(),
            self.max_load_factor,
            self.sync_on_write,
            self.max_file_size
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unlimited".to_string()),
        )
    }
}

/// Builder that produces EmoKvOptions or opens a store directly.
#[derive(Clone, Debug)]
pub struct EmoKvBuilder {
    opts: EmoKvOptions,
}

impl Default for EmoKvBuilder {
    fn default() -> Self {
        Self {
            opts: EmoKvOptions::from_env(),
        }
    }
}

impl EmoKvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            opts: EmoKvOptions::default(),
        }
    }

    pub fn index_initial_space(mut self, bytes: u64) -> Self {
        self.opts.index_initial_space = bytes;
        self
    }

    pub fn value_initial_space(mut self, bytes: u64) -> Self {
        self.opts.value_initial_space = bytes;
        self
    }

    pub fn crc(mut self, on: bool) -> Self {
        self.opts.crc_enabled = on;
        self
    }

    pub fn compression(mut self, on: bool) -> Self {
        self.opts.compression_enabled = on;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.opts.codec = codec;
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &EmoKvError) -> bool + Send + Sync + 'static,
    {
        self.opts.error_handler = Arc::new(handler);
        self
    }

    pub fn max_load_factor(mut self, f: f64) -> Self {
        self.opts.max_load_factor = f;
        self
    }

    pub fn sync_on_write(mut self, on: bool) -> Self {
        self.opts.sync_on_write = on;
        self
    }

    pub fn max_file_size(mut self, limit: Option<u64>) -> Self {
        self.opts.max_file_size = limit;
        self
    }

    pub fn build(self) -> EmoKvOptions {
        self.opts
    }

    pub fn open(self, dir: &Path, name: &str) -> Result<crate::store::EmoKv> {
        crate::store::EmoKv::open(dir, name, self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::GzipCodec;

    #[test]
    fn defaults() {
        let o = EmoKvOptions::default();
        assert_eq!(o.index_initial_space, 64 * 1024);
        assert_eq!(o.value_initial_space, 256 * 1024);
        assert!(o.crc_enabled);
        assert!(!o.compression_enabled);
        assert_eq!(o.codec.name(), "zstd");
        assert!((o.max_load_factor - 0.7).abs() < f64::EPSILON);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let o = EmoKvBuilder::from_default()
            .index_initial_space(128 * 1024)
            .crc(false)
            .compression(true)
            .codec(Arc::new(GzipCodec::default()))
            .max_file_size(Some(1 << 20))
            .build();
        assert_eq!(o.index_initial_space, 128 * 1024);
        assert!(!o.crc_enabled);
        assert!(o.compression_enabled);
        assert_eq!(o.codec.name(), "gzip");
        assert_eq!(o.max_file_size, Some(1 << 20));
        let shown = o.to_string();
        assert!(shown.contains("gzip"));
        assert!(shown.contains("1048576"));
    }

    #[test]
    fn validate_rejects_bad_load_factor_and_tiny_limit() {
        let bad = EmoKvOptions::default().with_max_load_factor(0.99);
        assert!(matches!(
            bad.validate(),
            Err(EmoKvError::Open(OpenError::InvalidOptions(_)))
        ));
        let tiny = EmoKvOptions::default().with_max_file_size(Some(4096));
        assert!(tiny.validate().is_err());
    }

    #[test]
    fn handlers() {
        let err = EmoKvError::Closed;
        assert!((default_error_handler())("k", &err));
        assert!(!(strict_error_handler())("k", &err));
        let o = EmoKvOptions::default().with_error_handler(|key, _| key == "soft");
        assert!((o.error_handler)("soft", &err));
        assert!(!(o.error_handler)("hard", &err));
    }
}
