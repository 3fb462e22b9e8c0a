use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use emokv::{EmoKv, EmoKvError, EmoKvOptions, OpenError};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("emokv-{}-{}-{}", prefix, pid, t))
}

fn create_store(root: &Path, name: &str) -> Result<()> {
    let kv = EmoKv::open(root, name, EmoKvOptions::default())?;
    kv.put("k", "v")?;
    kv.close()?;
    Ok(())
}

fn patch(file: &Path, at: usize, data: &[u8]) -> Result<()> {
    let mut bytes = fs::read(file)?;
    bytes[at..at + data.len()].copy_from_slice(data);
    fs::write(file, &bytes)?;
    Ok(())
}

fn open_err(root: &Path, name: &str) -> OpenError {
    match EmoKv::open(root, name, EmoKvOptions::default()) {
        Err(EmoKvError::Open(e)) => e,
        Err(e) => panic!("expected OpenError, got {}", e),
        Ok(_) => panic!("open must fail"),
    }
}

#[test]
fn bad_magic_is_rejected() -> Result<()> {
    let root = unique_root("open-magic");
    create_store(&root, "idx")?;
    patch(&root.join("idx.emoidx"), 0, b"NOTEMOKV")?;
    assert!(matches!(open_err(&root, "idx"), OpenError::BadMagic { .. }));

    create_store(&root, "val")?;
    patch(&root.join("val.emoval"), 0, b"NOTEMOKV")?;
    assert!(matches!(open_err(&root, "val"), OpenError::BadMagic { .. }));

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn version_mismatch_is_rejected() -> Result<()> {
    let root = unique_root("open-version");
    create_store(&root, "v")?;
    patch(&root.join("v.emoidx"), 8, &99u32.to_le_bytes())?;
    match open_err(&root, "v") {
        OpenError::UnsupportedVersion { found, expected, .. } => {
            assert_eq!((found, expected), (99, 1));
        }
        other => panic!("expected UnsupportedVersion, got {}", other),
    }
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn damaged_header_is_rejected() -> Result<()> {
    let root = unique_root("open-header");
    create_store(&root, "h")?;
    // capacity внутри заголовка; CRC заголовка больше не сходится
    patch(&root.join("h.emoidx"), 24, &[0xFF])?;
    assert!(matches!(open_err(&root, "h"), OpenError::CorruptHeader { .. }));
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn half_present_store_is_inconsistent() -> Result<()> {
    let root = unique_root("open-half");
    create_store(&root, "half")?;
    fs::remove_file(root.join("half.emoval"))?;
    assert!(matches!(open_err(&root, "half"), OpenError::Inconsistent(_)));
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn invalid_options_and_names() -> Result<()> {
    let root = unique_root("open-opts");
    let bad = EmoKvOptions::default().with_max_load_factor(1.5);
    assert!(matches!(
        EmoKv::open(&root, "o", bad),
        Err(EmoKvError::Open(OpenError::InvalidOptions(_)))
    ));
    for name in ["", "a/b", ".."] {
        assert!(
            matches!(
                EmoKv::open(&root, name, EmoKvOptions::default()),
                Err(EmoKvError::Open(OpenError::InvalidOptions(_)))
            ),
            "name {:?} must be rejected",
            name
        );
    }
    let _ = fs::remove_dir_all(&root);
    Ok(())
}
