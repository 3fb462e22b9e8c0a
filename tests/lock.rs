use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use emokv::{EmoKv, EmoKvError, EmoKvOptions, OpenError};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("emokv-{}-{}-{}", prefix, pid, t))
}

#[test]
fn second_open_of_same_store_is_refused() -> Result<()> {
    let root = unique_root("lock");
    let first = EmoKv::open(&root, "l", EmoKvOptions::default())?;
    first.put("k", "v")?;

    match EmoKv::open(&root, "l", EmoKvOptions::default()) {
        Err(EmoKvError::Open(OpenError::Locked { path })) => {
            assert!(path.ends_with("l.lock"));
        }
        other => panic!("expected Locked, got {:?}", other.map(|_| ())),
    }

    // другое имя в том же каталоге — отдельное хранилище
    let other = EmoKv::open(&root, "other", EmoKvOptions::default())?;
    assert!(other.get("k")?.is_none());
    other.close()?;

    // close снимает lock, даже пока объект жив
    first.close()?;
    let second = EmoKv::open(&root, "l", EmoKvOptions::default())?;
    assert_eq!(second.get_string("k")?.as_deref(), Some("v"));
    second.close()?;

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
