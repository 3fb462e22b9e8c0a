//! codec — чистые (stateless) преобразования структур <-> байты.
//!
//! - record.rs   — Value Record: [payload_len u32][flags u8][crc32 u32?][payload]
//! - entry.rs    — Index Entry (слот фиксированной ширины, SLOT_SIZE байт)
//! - compress.rs — подключаемые компрессоры (trait Codec, zstd/gzip)

pub mod compress;
pub mod entry;
pub mod record;

pub use compress::{builtin_codec, Codec, GzipCodec, ZstdCodec, CODEC_ID_GZIP, CODEC_ID_ZSTD};
pub use entry::{decode_index_entry, encode_index_entry, IndexEntry, SlotState};
pub use record::{
    decode_indexed_record, decode_value_record, encode_value_record, encoded_record_len,
    RecordFlags, ValueRecord,
};

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::HDR_CRC_OFF;

/// Записать CRC32 заголовка (байты [0..60)) в последние 4 байта.
pub fn seal_header(hdr: &mut [u8]) {
    let crc = crc32fast::hash(&hdr[..HDR_CRC_OFF]);
    LittleEndian::write_u32(&mut hdr[HDR_CRC_OFF..HDR_CRC_OFF + 4], crc);
}

/// Проверить CRC32 заголовка. Возвращает (stored, computed) при несовпадении.
pub fn header_crc_check(hdr: &[u8]) -> Result<(), (u32, u32)> {
    let stored = LittleEndian::read_u32(&hdr[HDR_CRC_OFF..HDR_CRC_OFF + 4]);
    let computed = crc32fast::hash(&hdr[..HDR_CRC_OFF]);
    if stored == computed {
        Ok(())
    } else {
        Err((stored, computed))
    }
}
