//! Value Record codec.
//!
//! Layout (LE):
//!   [payload_len u32][flags u8][crc32 u32 — только если flags & REC_FLAG_CRC][payload]
//!
//! flags:
//! - bit0 — CRC32 (crc32fast) над payload присутствует;
//! - bit1 — payload сжат;
//! - bits 4..7 — id кодека (см. compress.rs).
//!
//! Длина в индексе (value_len) — полная длина закодированной записи.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{REC_BASE_HDR, REC_CODEC_SHIFT, REC_CRC_LEN, REC_FLAG_COMPRESSED, REC_FLAG_CRC};
use crate::error::CorruptionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags {
    pub crc: bool,
    /// Some(codec id) when payload is compressed.
    pub codec: Option<u8>,
}

impl RecordFlags {
    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.crc {
            b |= REC_FLAG_CRC;
        }
        if let Some(id) = self.codec {
            b |= REC_FLAG_COMPRESSED;
            b |= (id & 0x0F) << REC_CODEC_SHIFT;
        }
        b
    }

    pub fn from_byte(b: u8) -> Self {
        let codec = if b & REC_FLAG_COMPRESSED != 0 {
            Some(b >> REC_CODEC_SHIFT)
        } else {
            None
        };
        Self {
            crc: b & REC_FLAG_CRC != 0,
            codec,
        }
    }

    #[inline]
    fn header_len(self) -> usize {
        if self.crc {
            REC_BASE_HDR + REC_CRC_LEN
        } else {
            REC_BASE_HDR
        }
    }
}

/// Decoded view into an encoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRecord<'a> {
    pub flags: RecordFlags,
    pub payload: &'a [u8],
}

#[inline]
pub fn encoded_record_len(payload_len: usize, crc: bool) -> usize {
    RecordFlags { crc, codec: None }.header_len() + payload_len
}

pub fn encode_value_record(payload: &[u8], flags: RecordFlags) -> Vec<u8> {
    let hdr = flags.header_len();
    let mut out = vec![0u8; hdr + payload.len()];
    LittleEndian::write_u32(&mut out[0..4], payload.len() as u32);
    out[4] = flags.to_byte();
    if flags.crc {
        LittleEndian::write_u32(&mut out[5..9], crc32fast::hash(payload));
    }
    out[hdr..].copy_from_slice(payload);
    out
}

/// Decode a record. With `verify_crc == false` a stored CRC is skipped, not checked.
pub fn decode_value_record(bytes: &[u8], verify_crc: bool) -> Result<ValueRecord<'_>, CorruptionError> {
    if bytes.len() < REC_BASE_HDR {
        return Err(CorruptionError::Truncated {
            need: REC_BASE_HDR,
            have: bytes.len(),
        });
    }
    let payload_len = LittleEndian::read_u32(&bytes[0..4]) as usize;
    let flags = RecordFlags::from_byte(bytes[4]);
    let hdr = flags.header_len();
    let need = hdr.saturating_add(payload_len);
    if bytes.len() < need {
        return Err(CorruptionError::Truncated {
            need,
            have: bytes.len(),
        });
    }
    // value_len в индексе — ровно длина записи, хвост не допускается
    if bytes.len() != need {
        return Err(CorruptionError::LengthMismatch {
            expected: need,
            actual: bytes.len(),
        });
    }
    let payload = &bytes[hdr..need];
    if flags.crc && verify_crc {
        let stored = LittleEndian::read_u32(&bytes[5..9]);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(CorruptionError::ChecksumMismatch { stored, computed });
        }
    }
    Ok(ValueRecord { flags, payload })
}

/// Decode a record addressed by an index slot; the slot's copy of the flags byte must match.
pub fn decode_indexed_record(
    bytes: &[u8],
    slot_flags: u8,
    verify_crc: bool,
) -> Result<ValueRecord<'_>, CorruptionError> {
    let rec = decode_value_record(bytes, verify_crc)?;
    let record = bytes[4];
    if record != slot_flags {
        return Err(CorruptionError::FlagsMismatch {
            slot: slot_flags,
            record,
        });
    }
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_with_crc() {
        let flags = RecordFlags { crc: true, codec: None };
        let rec = encode_value_record(b"test", flags);
        assert_eq!(rec.len(), encoded_record_len(4, true));
        let got = decode_value_record(&rec, true).expect("decode");
        assert_eq!(got.payload, b"test");
        assert_eq!(got.flags, flags);
    }

    #[test]
    fn empty_payload_without_crc() {
        let rec = encode_value_record(&[], RecordFlags::default());
        assert_eq!(rec.len(), REC_BASE_HDR);
        let got = decode_value_record(&rec, true).expect("decode");
        assert!(got.payload.is_empty());
    }

    #[test]
    fn flipped_bit_is_checksum_mismatch() {
        let mut rec = encode_value_record(b"payload bytes", RecordFlags { crc: true, codec: None });
        let last = rec.len() - 1;
        rec[last] ^= 0x10;
        match decode_value_record(&rec, true) {
            Err(CorruptionError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
        // без проверки CRC запись читается как есть
        assert!(decode_value_record(&rec, false).is_ok());
    }

    #[test]
    fn short_buffer_is_truncated() {
        let rec = encode_value_record(b"abcdef", RecordFlags { crc: true, codec: None });
        match decode_value_record(&rec[..rec.len() - 2], true) {
            Err(CorruptionError::Truncated { need, have }) => {
                assert_eq!(need, rec.len());
                assert_eq!(have, rec.len() - 2);
            }
            other => panic!("expected truncated, got {:?}", other),
        }
        assert!(matches!(
            decode_value_record(&rec[..3], true),
            Err(CorruptionError::Truncated { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_length_mismatch() {
        let mut rec = encode_value_record(b"abc", RecordFlags { crc: false, codec: None });
        rec.push(0);
        match decode_value_record(&rec, true) {
            Err(CorruptionError::LengthMismatch { expected, actual }) => {
                assert_eq!(expected, rec.len() - 1);
                assert_eq!(actual, rec.len());
            }
            other => panic!("expected length mismatch, got {:?}", other),
        }

        // payload_len уменьшен на месте: запись короче, чем записано в индексе
        let mut rec = encode_value_record(b"hello world", RecordFlags { crc: false, codec: None });
        LittleEndian::write_u32(&mut rec[0..4], 3);
        assert!(matches!(
            decode_value_record(&rec, false),
            Err(CorruptionError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn indexed_record_checks_slot_flags() {
        let flags = RecordFlags { crc: false, codec: None };
        let mut rec = encode_value_record(b"plain", flags);
        assert!(decode_indexed_record(&rec, flags.to_byte(), true).is_ok());

        rec[4] = REC_FLAG_COMPRESSED;
        match decode_indexed_record(&rec, flags.to_byte(), true) {
            Err(CorruptionError::FlagsMismatch { slot, record }) => {
                assert_eq!(slot, 0);
                assert_eq!(record, REC_FLAG_COMPRESSED);
            }
            other => panic!("expected flags mismatch, got {:?}", other),
        }
    }

    #[test]
    fn codec_id_survives_flags_byte() {
        let f = RecordFlags { crc: false, codec: Some(2) };
        assert_eq!(RecordFlags::from_byte(f.to_byte()), f);
        let f = RecordFlags { crc: true, codec: Some(15) };
        assert_eq!(RecordFlags::from_byte(f.to_byte()), f);
    }
}
