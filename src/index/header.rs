//! Заголовок индексного файла.
//!
//! [magic8="EMOKVIDX"][ver u32][flags u32][hash_kind u32][reserved u32]
//! [capacity u64][live u64][tombstones u64][key_heap_end u64][reserved u32][crc32 u32]

use byteorder::{ByteOrder, LittleEndian};
use std::path::Path;

use crate::codec::{header_crc_check, seal_header};
use crate::consts::{
    IDX_OFF_CAPACITY, IDX_OFF_FLAGS, IDX_OFF_HASH_KIND, IDX_OFF_KEY_HEAP_END, IDX_OFF_LIVE,
    IDX_OFF_TOMBSTONES, IDX_OFF_VERSION, INDEX_HDR_SIZE, INDEX_MAGIC, INDEX_VERSION,
};
use crate::error::OpenError;
use crate::hash::HashKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    pub flags: u32,
    pub hash_kind: HashKind,
    pub capacity: u64,
    pub live: u64,
    pub tombstones: u64,
    /// High-water mark of the key heap, relative to the heap base.
    pub key_heap_end: u64,
}

impl IndexHeader {
    pub fn new(capacity: u64, flags: u32, hash_kind: HashKind) -> Self {
        Self {
            version: INDEX_VERSION,
            flags,
            hash_kind,
            capacity,
            live: 0,
            tombstones: 0,
            key_heap_end: 0,
        }
    }
}

pub fn index_header_read(buf: &[u8], path: &Path) -> Result<IndexHeader, OpenError> {
    if buf.len() < INDEX_HDR_SIZE {
        return Err(OpenError::CorruptHeader {
            path: path.to_path_buf(),
            reason: format!("index file shorter than header ({} B)", buf.len()),
        });
    }
    let hdr = &buf[..INDEX_HDR_SIZE];
    if &hdr[..8] != INDEX_MAGIC {
        return Err(OpenError::BadMagic {
            path: path.to_path_buf(),
        });
    }
    let version = LittleEndian::read_u32(&hdr[IDX_OFF_VERSION..IDX_OFF_VERSION + 4]);
    if version != INDEX_VERSION {
        return Err(OpenError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: version,
            expected: INDEX_VERSION,
        });
    }
    if let Err((stored, computed)) = header_crc_check(hdr) {
        return Err(OpenError::CorruptHeader {
            path: path.to_path_buf(),
            reason: format!("header crc stored={:#010x} computed={:#010x}", stored, computed),
        });
    }
    let hk = LittleEndian::read_u32(&hdr[IDX_OFF_HASH_KIND..IDX_OFF_HASH_KIND + 4]);
    let hash_kind = HashKind::from_u32(hk).ok_or_else(|| OpenError::CorruptHeader {
        path: path.to_path_buf(),
        reason: format!("unknown hash kind {}", hk),
    })?;
    let capacity = LittleEndian::read_u64(&hdr[IDX_OFF_CAPACITY..IDX_OFF_CAPACITY + 8]);
    if capacity == 0 {
        return Err(OpenError::CorruptHeader {
            path: path.to_path_buf(),
            reason: "zero capacity".to_string(),
        });
    }
    Ok(IndexHeader {
        version,
        flags: LittleEndian::read_u32(&hdr[IDX_OFF_FLAGS..IDX_OFF_FLAGS + 4]),
        hash_kind,
        capacity,
        live: LittleEndian::read_u64(&hdr[IDX_OFF_LIVE..IDX_OFF_LIVE + 8]),
        tombstones: LittleEndian::read_u64(&hdr[IDX_OFF_TOMBSTONES..IDX_OFF_TOMBSTONES + 8]),
        key_heap_end: LittleEndian::read_u64(&hdr[IDX_OFF_KEY_HEAP_END..IDX_OFF_KEY_HEAP_END + 8]),
    })
}

pub fn index_header_write(buf: &mut [u8], h: &IndexHeader) {
    let hdr = &mut buf[..INDEX_HDR_SIZE];
    hdr.fill(0);
    hdr[..8].copy_from_slice(INDEX_MAGIC);
    LittleEndian::write_u32(&mut hdr[IDX_OFF_VERSION..IDX_OFF_VERSION + 4], h.version);
    LittleEndian::write_u32(&mut hdr[IDX_OFF_FLAGS..IDX_OFF_FLAGS + 4], h.flags);
    LittleEndian::write_u32(&mut hdr[IDX_OFF_HASH_KIND..IDX_OFF_HASH_KIND + 4], h.hash_kind.to_u32());
    LittleEndian::write_u64(&mut hdr[IDX_OFF_CAPACITY..IDX_OFF_CAPACITY + 8], h.capacity);
    LittleEndian::write_u64(&mut hdr[IDX_OFF_LIVE..IDX_OFF_LIVE + 8], h.live);
    LittleEndian::write_u64(&mut hdr[IDX_OFF_TOMBSTONES..IDX_OFF_TOMBSTONES + 8], h.tombstones);
    LittleEndian::write_u64(&mut hdr[IDX_OFF_KEY_HEAP_END..IDX_OFF_KEY_HEAP_END + 8], h.key_heap_end);
    seal_header(hdr);
}
