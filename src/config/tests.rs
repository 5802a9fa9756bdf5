use std::env;
use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::Settings;
use super::{Overflow, load_config};
use crate::broker::dispatch::DispatchMode;
use crate::subscriber::InboxPolicy;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.dispatch, DispatchMode::Spawned);
    assert_eq!(settings.broker.max_in_flight, 1024);
    assert_eq!(settings.inbox.overflow, Overflow::Block);
    assert_eq!(settings.inbox.capacity, 64);
    assert_eq!(settings.inbox.send_timeout_ms, 1000);
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn test_inbox_settings_map_to_policies() {
    let mut inbox = Settings::default().inbox;
    assert_eq!(
        inbox.policy(),
        InboxPolicy::Block {
            capacity: 64,
            timeout: Duration::from_millis(1000)
        }
    );

    inbox.overflow = Overflow::Drop;
    inbox.capacity = 8;
    assert_eq!(inbox.policy(), InboxPolicy::DropNewest { capacity: 8 });

    inbox.overflow = Overflow::Unbounded;
    assert_eq!(inbox.policy(), InboxPolicy::Unbounded);
}

#[test]
#[serial]
fn load_config_without_sources_uses_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = load_config().expect("load_config failed");
    assert_eq!(cfg, Settings::default());

    env::set_current_dir(orig).expect("restore cwd");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // load_config reads config/default.toml relative to the working directory
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [broker]
        dispatch = "inline"

        [inbox]
        overflow = "drop"
        capacity = 16
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config().expect("load_config failed");
    assert_eq!(cfg.broker.dispatch, DispatchMode::Inline);
    assert_eq!(cfg.broker.max_in_flight, 1024);
    assert_eq!(cfg.inbox.overflow, Overflow::Drop);
    assert_eq!(cfg.inbox.capacity, 16);
    assert_eq!(cfg.inbox.send_timeout_ms, 1000);

    env::set_current_dir(orig).expect("restore cwd");
}

#[test]
#[serial]
fn load_config_from_environment() {
    temp_env::with_vars(
        [
            ("POPBUS_BROKER__MAX_IN_FLIGHT", Some("8")),
            ("POPBUS_INBOX__OVERFLOW", Some("unbounded")),
            ("POPBUS_LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.max_in_flight, 8);
            assert_eq!(cfg.inbox.overflow, Overflow::Unbounded);
            assert_eq!(cfg.logging.level, "debug");
            assert_eq!(cfg.broker.dispatch, DispatchMode::Spawned);
        },
    );
}
