use super::*;

use crate::cache::CacheConfig;

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(
        settings.database.max_connections.get(),
        DEFAULT_DB_MAX_CONNECTIONS
    );
    assert_eq!(settings.database.tables.prefix(), DEFAULT_TABLE_PREFIX);
    assert!(settings.cache.enable_fast_tier);
    assert!(settings.cache.enable_durable_tier);
    assert_eq!(settings.cache.fast_tier_capacity.get(), 1024);
    assert_eq!(settings.cache.fast_tier_ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.durable_tier_ttl, Duration::from_secs(86_400));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://from-file".to_string());
    raw.logging.level = Some("info".to_string());

    raw.apply_logging_overrides(&LoggingOverride {
        log_level: Some("debug".to_string()),
        log_json: Some(true),
    });
    raw.apply_database_override(&DatabaseOverride {
        database_url: Some("postgres://from-cli".to_string()),
        table_prefix: Some("site2_".to_string()),
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(
        settings.database.url.as_deref(),
        Some("postgres://from-cli")
    );
    assert_eq!(settings.database.tables.settings, "site2_settings");
}

#[test]
fn blank_database_url_is_treated_as_unset() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn invalid_table_prefix_is_rejected() {
    let mut raw = RawSettings::default();
    raw.database.table_prefix = Some("Bad-Prefix".to_string());

    let err = Settings::from_raw(raw).expect_err("prefix should be rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "database.table_prefix",
            ..
        }
    ));
}

#[test]
fn zero_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.database.max_connections = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.cache.fast_tier_capacity = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.cache.durable_tier_ttl_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn oversized_ttls_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.durable_tier_ttl_seconds = Some(u64::MAX);
    let err = Settings::from_raw(raw).expect_err("ttl should be capped");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.durable_tier_ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.fast_tier_ttl_seconds = Some(MAX_TTL_SECS + 1);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.cache.durable_tier_ttl_seconds = Some(MAX_TTL_SECS);
    let settings = Settings::from_raw(raw).expect("cap itself is accepted");
    assert_eq!(
        settings.cache.durable_tier_ttl,
        Duration::from_secs(MAX_TTL_SECS)
    );
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    let err = Settings::from_raw(raw).expect_err("level should be rejected");
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn cache_settings_convert_to_cache_config() {
    let mut raw = RawSettings::default();
    raw.cache.enable_durable_tier = Some(false);
    raw.cache.fast_tier_capacity = Some(16);
    raw.cache.fast_tier_ttl_seconds = Some(30);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let config = CacheConfig::from(&settings.cache);
    assert!(config.enable_fast_tier);
    assert!(!config.enable_durable_tier);
    assert_eq!(config.fast_tier_capacity, 16);
    assert_eq!(config.fast_tier_ttl_seconds, 30);
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from([
        "vellum",
        "migrate",
        "--database-url",
        "postgres://example",
        "--force",
    ]);

    match &args.command {
        Command::Migrate(migrate) => {
            assert!(migrate.force);
            assert_eq!(
                migrate.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert_eq!(
        args.command.database().database_url.as_deref(),
        Some("postgres://example")
    );
}

#[test]
fn parse_settings_set_arguments() {
    let args = CliArgs::parse_from(["vellum", "settings", "set", "site.title", "\"Hello\""]);

    match args.command {
        Command::Settings(SettingsArgs {
            command: SettingsCommand::Set { key, value },
            ..
        }) => {
            assert_eq!(key, "site.title");
            assert_eq!(value, "\"Hello\"");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_import_with_replace() {
    let args = CliArgs::parse_from(["vellum", "import", "settings.json", "--replace"]);

    match args.command {
        Command::Import(import) => {
            assert!(import.replace);
            assert_eq!(import.file, std::path::PathBuf::from("settings.json"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_cache_invalidate() {
    let args = CliArgs::parse_from(["vellum", "cache", "invalidate", "42", "--log-level", "warn"]);

    assert_eq!(args.logging.log_level.as_deref(), Some("warn"));
    match args.command {
        Command::Cache(CacheArgs {
            command: CacheCommand::Invalidate { entity_id },
            ..
        }) => assert_eq!(entity_id, 42),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn uninstall_defaults_to_unconfirmed() {
    let args = CliArgs::parse_from(["vellum", "uninstall"]);
    match args.command {
        Command::Uninstall(uninstall) => assert!(!uninstall.confirm),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn command_is_required() {
    assert!(CliArgs::try_parse_from(["vellum"]).is_err());
}
