//! index — Mapped Index Table (open addressing, linear probing) поверх mmap.
//!
//! - header.rs — заголовок индексного файла (64 B, CRC32)
//! - table.rs  — таблица слотов + key heap, lookup/insert/remove/rehash

pub mod header;
pub mod table;

pub use header::{index_header_read, index_header_write, IndexHeader};
pub use table::{capacity_for_space, tmp_path_for, IndexTable, SlotRef, ValueLoc};
