//! Index Entry — слот фиксированной ширины (SLOT_SIZE = 40 байт).
//!
//! [hash u64][state u8][flags u8][reserved u16][key_len u32][key_off u64]
//! [value_off u64][value_len u32][value_cap u32]
//!
//! key_off — смещение относительно начала key heap (heap идёт сразу за массивом слотов).
//! value_len — полная длина закодированной Value Record; value_cap — выделенная ёмкость слота.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::SLOT_SIZE;
use crate::error::CorruptionError;
use crate::hash::stored_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty = 0,
    Occupied = 1,
    Tombstone = 2,
}

impl SlotState {
    pub fn from_u8(b: u8) -> Result<Self, CorruptionError> {
        match b {
            0 => Ok(SlotState::Empty),
            1 => Ok(SlotState::Occupied),
            2 => Ok(SlotState::Tombstone),
            other => Err(CorruptionError::InvalidSlotState(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: u64,
    pub state: SlotState,
    /// Record flags byte mirrored from the value record (compression/codec bits).
    pub flags: u8,
    pub key_len: u32,
    pub key_off: u64,
    pub value_off: u64,
    pub value_len: u32,
    pub value_cap: u32,
}

impl IndexEntry {
    pub const EMPTY: IndexEntry = IndexEntry {
        hash: 0,
        state: SlotState::Empty,
        flags: 0,
        key_len: 0,
        key_off: 0,
        value_off: 0,
        value_len: 0,
        value_cap: 0,
    };

    pub const TOMBSTONE: IndexEntry = IndexEntry {
        state: SlotState::Tombstone,
        ..IndexEntry::EMPTY
    };

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.state == SlotState::Occupied
    }
}

pub fn encode_index_entry(e: &IndexEntry, out: &mut [u8]) -> Result<(), CorruptionError> {
    if out.len() < SLOT_SIZE {
        return Err(CorruptionError::Truncated {
            need: SLOT_SIZE,
            have: out.len(),
        });
    }
    let hash = match e.state {
        SlotState::Occupied => stored_hash(e.hash),
        _ => 0,
    };
    LittleEndian::write_u64(&mut out[0..8], hash);
    out[8] = e.state as u8;
    out[9] = e.flags;
    LittleEndian::write_u16(&mut out[10..12], 0);
    LittleEndian::write_u32(&mut out[12..16], e.key_len);
    LittleEndian::write_u64(&mut out[16..24], e.key_off);
    LittleEndian::write_u64(&mut out[24..32], e.value_off);
    LittleEndian::write_u32(&mut out[32..36], e.value_len);
    LittleEndian::write_u32(&mut out[36..40], e.value_cap);
    Ok(())
}

pub fn decode_index_entry(buf: &[u8]) -> Result<IndexEntry, CorruptionError> {
    if buf.len() < SLOT_SIZE {
        return Err(CorruptionError::Truncated {
            need: SLOT_SIZE,
            have: buf.len(),
        });
    }
    let state = SlotState::from_u8(buf[8])?;
    Ok(IndexEntry {
        hash: LittleEndian::read_u64(&buf[0..8]),
        state,
        flags: buf[9],
        key_len: LittleEndian::read_u32(&buf[12..16]),
        key_off: LittleEndian::read_u64(&buf[16..24]),
        value_off: LittleEndian::read_u64(&buf[24..32]),
        value_len: LittleEndian::read_u32(&buf[32..36]),
        value_cap: LittleEndian::read_u32(&buf[36..40]),
    })
}
