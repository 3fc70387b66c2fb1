use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use lectern_config::{CacheTargetKind, ConfigError, LecternConfig};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn minimal_environment_uses_defaults() -> anyhow::Result<()> {
    let config = LecternConfig::from_lookup(lookup(&[
        ("LECTERN_LIBRARY_ROOT", "/srv/books"),
        ("LECTERN_TEMP_DIR", "/var/tmp/lectern"),
    ]))?;

    assert_eq!(config.state_dir, PathBuf::from("/srv/books/.lectern"));
    assert_eq!(
        config.handoff_path(),
        PathBuf::from("/srv/books/.lectern/restart-handoff.json")
    );
    assert_eq!(config.fetch.retries, 1);
    assert_eq!(config.swap.retries, 3);
    assert_eq!(config.swap.backoff, Duration::from_millis(100));
    assert!(config.fetch.url_template.is_none());
    assert!(config.restart.self_exec);
    assert!(!config.restart.supervised);
    assert!(config.cache_targets.is_empty());
    Ok(())
}

#[test]
fn missing_library_root_is_reported() {
    let err = LecternConfig::from_lookup(lookup(&[])).err();
    assert_eq!(
        err,
        Some(ConfigError::Missing {
            field: "LECTERN_LIBRARY_ROOT"
        })
    );
}

#[test]
fn temp_dir_inside_library_is_rejected() {
    let err = LecternConfig::from_lookup(lookup(&[
        ("LECTERN_LIBRARY_ROOT", "/srv/books"),
        ("LECTERN_TEMP_DIR", "/srv/books/../books/tmp"),
    ]))
    .err();
    assert!(matches!(
        err,
        Some(ConfigError::InvalidField {
            field: "LECTERN_TEMP_DIR",
            reason: "inside_library_root",
            ..
        })
    ));
}

#[test]
fn full_environment_is_parsed() -> anyhow::Result<()> {
    let config = LecternConfig::from_lookup(lookup(&[
        ("LECTERN_LIBRARY_ROOT", "/srv/books"),
        ("LECTERN_STATE_DIR", "/var/lib/lectern"),
        ("LECTERN_TEMP_DIR", "/var/tmp/lectern"),
        ("LECTERN_FETCH_URL", "https://opds.example/api/v1/download/{identity}"),
        ("LECTERN_FETCH_USER", "reader"),
        ("LECTERN_FETCH_PASS", "secret"),
        ("LECTERN_FETCH_TIMEOUT_SECS", "5"),
        ("LECTERN_FETCH_RETRIES", "2"),
        ("LECTERN_SWAP_RETRIES", "4"),
        ("LECTERN_SWAP_BACKOFF_MS", "0"),
        (
            "LECTERN_CACHE_TARGETS",
            "covers=dir:/var/cache/covers,metadata=index:/var/cache/meta.json",
        ),
        ("LECTERN_RESTART_COMMAND", "systemctl --user restart lectern"),
        ("LECTERN_SUPERVISED", "yes"),
        ("LECTERN_SELF_EXEC", "off"),
        ("LECTERN_LOG_FORMAT", "json"),
    ]))?;

    assert_eq!(
        config.fetch.url_template.as_deref(),
        Some("https://opds.example/api/v1/download/{identity}")
    );
    assert_eq!(config.fetch.username.as_deref(), Some("reader"));
    assert_eq!(config.fetch.timeout, Duration::from_secs(5));
    assert_eq!(config.fetch.retries, 2);
    assert_eq!(config.swap.retries, 4);
    assert_eq!(config.swap.backoff, Duration::ZERO);
    assert_eq!(config.cache_targets.len(), 2);
    assert_eq!(config.cache_targets[1].kind, CacheTargetKind::Index);
    assert_eq!(
        config.restart.command.as_deref(),
        Some(
            &[
                "systemctl".to_string(),
                "--user".to_string(),
                "restart".to_string(),
                "lectern".to_string()
            ][..]
        )
    );
    assert!(config.restart.supervised);
    assert!(!config.restart.self_exec);
    assert_eq!(config.logging.format.as_deref(), Some("json"));
    assert_eq!(
        config.registry_path(),
        PathBuf::from("/var/lib/lectern/placeholders.json")
    );
    Ok(())
}

#[test]
fn serialised_config_omits_password() -> anyhow::Result<()> {
    let mut config = LecternConfig::for_library("/srv/books", "/var/tmp/lectern");
    config.fetch.password = Some("secret".into());
    let rendered = serde_json::to_string(&config)?;
    assert!(!rendered.contains("secret"));
    Ok(())
}
