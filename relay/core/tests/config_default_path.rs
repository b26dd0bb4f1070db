//! Loading from the default configuration location
//!
//! Kept in its own test binary: it points `XDG_CONFIG_HOME` at a temporary
//! directory for the whole process.

#![cfg(target_os = "linux")]

use std::fs;

use pretty_assertions::assert_eq;
use relay_core::config::{
    default_config_path, load_config_from_path, resolve_config_path, ConfigSource,
};

#[test]
fn test_default_config_file_is_read_without_explicit_path() {
    let home = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", home.path());

    let path = default_config_path().unwrap();
    assert_eq!(path, home.path().join("relay").join("relay.toml"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "[relay]\nhistory_limit = 7\n").unwrap();

    let config = load_config_from_path(resolve_config_path(None)).unwrap();

    assert_eq!(config.relay.history_limit, 7);
    assert_eq!(config.source(), ConfigSource::File);
    assert_eq!(config.config_file_path, Some(path));
}
