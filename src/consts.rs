//! Общие константы форматов (index file, value file, records).

// -------- Files --------
pub const INDEX_FILE_EXT: &str = "emoidx";
pub const VALUE_FILE_EXT: &str = "emoval";
pub const LOCK_FILE_EXT: &str = "lock";
pub const TMP_SUFFIX: &str = "tmp";

// -------- Index file --------
pub const INDEX_MAGIC: &[u8; 8] = b"EMOKVIDX";
pub const INDEX_VERSION: u32 = 1;
// [magic8][ver u32][flags u32][hash_kind u32][reserved u32][capacity u64][live u64]
// [tombstones u64][key_heap_end u64][reserved u32][crc32 u32]
pub const INDEX_HDR_SIZE: usize = 64;

pub const IDX_OFF_VERSION: usize = 8;
pub const IDX_OFF_FLAGS: usize = 12;
pub const IDX_OFF_HASH_KIND: usize = 16;
pub const IDX_OFF_CAPACITY: usize = 24;
pub const IDX_OFF_LIVE: usize = 32;
pub const IDX_OFF_TOMBSTONES: usize = 40;
pub const IDX_OFF_KEY_HEAP_END: usize = 48;

// Slot: [hash u64][state u8][flags u8][reserved u16][key_len u32][key_off u64]
//       [value_off u64][value_len u32][value_cap u32]
pub const SLOT_SIZE: usize = 40;

pub const MIN_CAPACITY: u64 = 16;

// -------- Value file --------
pub const VALUE_MAGIC: &[u8; 8] = b"EMOKVVAL";
pub const VALUE_VERSION: u32 = 1;
// [magic8][ver u32][flags u32][data_end u64][live_records u64][reserved 28][crc32 u32]
pub const VALUE_HDR_SIZE: usize = 64;

pub const VAL_OFF_VERSION: usize = 8;
pub const VAL_OFF_FLAGS: usize = 12;
pub const VAL_OFF_DATA_END: usize = 16;
pub const VAL_OFF_LIVE: usize = 24;

/// Both headers keep CRC32 of bytes [0..60) in the last 4 bytes.
pub const HDR_CRC_OFF: usize = 60;

// -------- Header flags --------
pub const HDR_FLAG_CRC: u32 = 0x1;
pub const HDR_FLAG_COMPRESSION: u32 = 0x2;
pub const HDR_FLAG_DIRTY: u32 = 0x4;

// -------- Value record --------
// [payload_len u32][flags u8][crc32 u32 if REC_FLAG_CRC][payload]
pub const REC_BASE_HDR: usize = 5;
pub const REC_CRC_LEN: usize = 4;
pub const REC_FLAG_CRC: u8 = 0x1;
pub const REC_FLAG_COMPRESSED: u8 = 0x2;
pub const REC_CODEC_SHIFT: u8 = 4;

// -------- Allocation --------
pub const ALLOC_ALIGN: u64 = 8;
pub const FILE_GROW_ALIGN: u64 = 4096;
