//! Pluggable value compression.
//!
//! A `Codec` is injected at open time (see `EmoKvOptions::codec`). Its `id()` is
//! written into every compressed record's flags byte, so records compressed by
//! a built-in codec stay readable after the store is reopened with another one.
//!
//! Built-in ids: 1 = zstd, 2 = gzip. Custom codecs use 3..=15.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

pub const CODEC_ID_ZSTD: u8 = 1;
pub const CODEC_ID_GZIP: u8 = 2;

pub trait Codec: Send + Sync {
    /// Codec id stored in record flags (1..=15).
    fn id(&self) -> u8;

    fn name(&self) -> &'static str;

    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>>;

    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>>;
}

impl fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(id={})", self.name(), self.id())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> u8 {
        CODEC_ID_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        zstd::bulk::compress(input, self.level)
    }

    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut dec = zstd::stream::read::Decoder::new(input)?;
        let mut out = Vec::new();
        dec.read_to_end(&mut out)?;
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Codec for GzipCodec {
    fn id(&self) -> u8 {
        CODEC_ID_GZIP
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::new(self.level));
        enc.write_all(input)?;
        enc.finish()
    }

    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut dec = GzDecoder::new(input);
        let mut out = Vec::new();
        dec.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Built-in codec by id (used when a record's codec differs from the configured one).
pub fn builtin_codec(id: u8) -> Option<Arc<dyn Codec>> {
    match id {
        CODEC_ID_ZSTD => Some(Arc::new(ZstdCodec::default())),
        CODEC_ID_GZIP => Some(Arc::new(GzipCodec::default())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"emokv emokv emokv emokv emokv emokv emokv emokv emokv emokv".repeat(8)
    }

    #[test]
    fn zstd_shrinks_repetitive_input() {
        let c = ZstdCodec::default();
        let input = sample();
        let packed = c.compress(&input).expect("compress");
        assert!(packed.len() < input.len());
        assert_eq!(c.decompress(&packed).expect("decompress"), input);
    }

    #[test]
    fn gzip_shrinks_repetitive_input() {
        let c = GzipCodec::default();
        let input = sample();
        let packed = c.compress(&input).expect("compress");
        assert!(packed.len() < input.len());
        assert_eq!(c.decompress(&packed).expect("decompress"), input);
    }

    #[test]
    fn garbage_fails_to_decompress() {
        assert!(ZstdCodec::default().decompress(b"definitely not zstd").is_err());
        assert!(GzipCodec::default().decompress(b"definitely not gzip").is_err());
    }

    #[test]
    fn builtin_lookup() {
        assert_eq!(builtin_codec(CODEC_ID_ZSTD).map(|c| c.name()), Some("zstd"));
        assert_eq!(builtin_codec(CODEC_ID_GZIP).map(|c| c.name()), Some("gzip"));
        assert!(builtin_codec(9).is_none());
    }
}
