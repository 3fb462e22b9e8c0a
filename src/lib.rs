//! EmoKV — встраиваемое key-value хранилище поверх двух memory-mapped файлов.
//!
//! - индекс: open-addressing хэш-таблица (linear probing, tombstone'ы), рост через rehash;
//! - значения: регион Value Record'ов с переиспользованием свободного места;
//! - опционально CRC32 и сжатие (zstd/gzip или свой Codec);
//! - повреждённая запись изолируется через error handler и не ломает остальные ключи.
//!
//! ```no_run
//! use emokv::{EmoKv, EmoKvOptions};
//! # fn main() -> emokv::Result<()> {
//! let kv = EmoKv::open(std::path::Path::new("/tmp/emo"), "prefs", EmoKvOptions::default())?;
//! kv.put("hehe", "xixi")?;
//! assert_eq!(kv.get_string("hehe")?.as_deref(), Some("xixi"));
//! kv.close()?;
//! # Ok(())
//! # }
//! ```

// Базовые модули
pub mod config;
pub mod consts;
pub mod error;
pub mod hash;
pub mod lock;
pub mod metrics;

// Форматы и регионы
pub mod codec;  // src/codec/{mod,record,entry,compress}.rs
pub mod free;   // src/free/mod.rs
pub mod index;  // src/index/{mod,header,table}.rs
pub mod region;
pub mod value;  // src/value/mod.rs

// Публичный фасад
pub mod store;  // src/store/{mod,core,open,kv,check}.rs

// Удобные реэкспорты
pub use codec::{Codec, GzipCodec, ZstdCodec, CODEC_ID_GZIP, CODEC_ID_ZSTD};
pub use config::{default_error_handler, strict_error_handler, EmoKvBuilder, EmoKvOptions, ErrorHandler};
pub use error::{AllocationError, CorruptionError, EmoKvError, OpenError, Result};
pub use store::{CheckReport, EmoKv, StoreStats};
