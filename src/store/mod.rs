//! store — публичный фасад EmoKv.
//!
//! Разделение по подмодулям:
//! - core.rs  — структура EmoKv, StoreInner, stats(), Drop
//! - open.rs  — открытие/создание файлов, lock, dirty-флаг, flush/close
//! - kv.rs    — put/get/get_string/delete/contains_key/len
//! - check.rs — полная проверка учёта пространства и всех записей (CheckReport)

pub mod check;
pub mod core;
pub mod kv;
pub mod open;

pub use self::check::CheckReport;
pub use self::core::{EmoKv, StoreStats};
