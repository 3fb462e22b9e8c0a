use anyhow::Result;

use emokv::{EmoKvBuilder, EmoKvOptions};

// единственный тест в бинарнике: меняет окружение процесса
#[test]
fn env_overrides_defaults() -> Result<()> {
    std::env::set_var("EMOKV_INDEX_INITIAL_SPACE", "131072");
    std::env::set_var("EMOKV_CRC", "off");
    std::env::set_var("EMOKV_COMPRESSION", "yes");
    std::env::set_var("EMOKV_MAX_LOAD_FACTOR", "0.5");
    std::env::set_var("EMOKV_SYNC_ON_WRITE", "1");
    std::env::set_var("EMOKV_MAX_FILE_SIZE", "not-a-number");

    let o = EmoKvOptions::from_env();
    assert_eq!(o.index_initial_space, 131072);
    assert_eq!(o.value_initial_space, 256 * 1024);
    assert!(!o.crc_enabled);
    assert!(o.compression_enabled);
    assert!((o.max_load_factor - 0.5).abs() < f64::EPSILON);
    assert!(o.sync_on_write);
    assert_eq!(o.max_file_size, None, "unparsable value keeps the default");
    o.validate()?;

    // new() стартует от env, from_default() — нет
    assert!(EmoKvBuilder::new().build().compression_enabled);
    assert!(!EmoKvBuilder::from_default().build().compression_enabled);
    Ok(())
}
