use std::fs;

use nudge::config::{Config, NotifySink, CONFIG_FILE};
use nudge::error::Error;

#[test]
fn load_from_dir_defaults_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = Config::load_from_dir(dir.path());

    assert_eq!(cfg.model.api_key_env, "NUDGE_API_KEY");
    assert_eq!(cfg.model.timeout_secs, 60);
    assert_eq!(cfg.schedule.max_horizon_days, 366);
    assert_eq!(cfg.presenter.banner_secs, 5);
    assert_eq!(cfg.presenter.title_flash_cycles, 6);
    assert_eq!(cfg.presenter.title_flash_interval_ms, 1000);
    assert_eq!(cfg.notify.sink, NotifySink::Terminal);
    assert!(cfg.daemon.socket.is_none());
}

#[test]
fn partial_file_overrides_only_named_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let content = r#"
[model]
model = "accounts/fireworks/models/llama-v3p1-8b-instruct"
timeout_secs = 15

[presenter]
banner_secs = 8

[notify]
sink = "jsonl"
path = "/tmp/nudge-notifications.jsonl"
"#;
    fs::write(dir.path().join(CONFIG_FILE), content.trim()).expect("write config");

    let cfg = Config::load_from_dir(dir.path());
    assert_eq!(cfg.model.model, "accounts/fireworks/models/llama-v3p1-8b-instruct");
    assert_eq!(cfg.model.timeout_secs, 15);
    assert_eq!(cfg.model.max_tokens, 1000);
    assert_eq!(cfg.presenter.banner_secs, 8);
    assert_eq!(cfg.presenter.title_flash_cycles, 6);
    assert_eq!(cfg.notify.sink, NotifySink::Jsonl);
    assert_eq!(
        cfg.notify.path.as_deref(),
        Some("/tmp/nudge-notifications.jsonl")
    );
}

#[test]
fn load_from_dir_defaults_on_invalid_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(CONFIG_FILE), "[schedule]\nmax_horizon_days = 0").expect("write");

    let cfg = Config::load_from_dir(dir.path());
    assert_eq!(cfg.schedule.max_horizon_days, 366);
}

#[test]
fn explicit_invalid_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[model]\napi_url = \"ftp://example.com\"").expect("write");

    let err = Config::resolve(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn written_config_loads_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE);

    let mut cfg = Config::default();
    cfg.schedule.max_horizon_days = 30;
    cfg.presenter.speaker = String::new();
    fs::write(&path, toml::to_string_pretty(&cfg).expect("serialize")).expect("write");

    let loaded = Config::load(&path).expect("load");
    assert_eq!(loaded.schedule.max_horizon_days, 30);
    assert!(loaded.presenter.speaker.is_empty());
}
