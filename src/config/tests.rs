use std::io::Write;

use super::*;

#[test]
fn defaults_apply_when_nothing_is_configured() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.prefix, "cumulus");
    assert_eq!(settings.cache.io_timeout, Duration::from_millis(2_000));
    assert_eq!(settings.cache.fan_out_timeout, Duration::from_millis(5_000));
    assert_eq!(settings.cache.read_concurrency.get(), 16);
    assert_eq!(settings.scheduler.sync_cadence, Duration::from_secs(60));
    assert_eq!(settings.scheduler.default_poll_interval, Duration::from_secs(30));
    assert!(settings.accounts.is_empty());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.prefix = Some("file".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        cache_prefix: Some("cli".to_string()),
        log_level: Some("debug".to_string()),
        cache_io_timeout_ms: Some(250),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.prefix, "cli");
    assert_eq!(settings.cache.io_timeout, Duration::from_millis(250));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn prefix_with_separator_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.prefix = Some("a:b".to_string());

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { key: "cache.prefix", .. }));
}

#[test]
fn zero_durations_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.io_timeout_ms = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid { key: "cache.io_timeout_ms", .. }
    ));

    let mut raw = RawSettings::default();
    raw.scheduler.sync_cadence_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid { key: "scheduler.sync_cadence_seconds", .. }
    ));

    let mut raw = RawSettings::default();
    raw.cache.read_concurrency = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid { key: "cache.read_concurrency", .. }
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid { key: "logging.level", .. }
    ));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::try_parse_from(["cumulus"]).expect("parse");
    assert!(args.command.is_none());
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::try_parse_from([
        "cumulus",
        "serve",
        "--log-json",
        "true",
        "--sync-cadence-seconds",
        "15",
        "--default-poll-interval-seconds",
        "5",
    ])
    .expect("parse");

    let Some(Command::Serve(serve)) = args.command else {
        panic!("expected serve command");
    };
    assert_eq!(serve.overrides.log_json, Some(true));
    assert_eq!(serve.overrides.sync_cadence_seconds, Some(15));
    assert_eq!(serve.overrides.default_poll_interval_seconds, Some(5));
}

#[test]
fn parse_check_arguments() {
    let args = CliArgs::try_parse_from(["cumulus", "--config-file", "x.toml", "check", "--json"])
        .expect("parse");
    assert_eq!(
        args.config_file.as_deref(),
        Some(std::path::Path::new("x.toml"))
    );
    assert!(matches!(args.command, Some(Command::Check(CheckArgs { json: true }))));
}

#[test]
fn loads_accounts_from_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        r#"
[cache]
prefix = "inventory"

[[accounts]]
name = "prod"
provider = "static"
regions = ["us-east-1"]
poll_interval_seconds = 20

[accounts.properties]
types = ["servers"]

[[accounts]]
name = "test"
provider = "static"
provider_version = "v2"
"#
    )
    .expect("write config");

    let cli = CliArgs {
        config_file: Some(file.path().to_path_buf()),
        command: Some(Command::Check(CheckArgs::default())),
    };
    let settings = load(&cli).expect("load");

    assert_eq!(settings.cache.prefix, "inventory");
    assert_eq!(settings.accounts.len(), 2);
    let prod = &settings.accounts[0];
    assert_eq!(prod.name, "prod");
    assert_eq!(prod.provider_version, "v1");
    assert_eq!(prod.poll_interval_seconds, Some(20));
    assert_eq!(prod.properties["types"], serde_json::json!(["servers"]));
    assert_eq!(settings.accounts[1].provider_version, "v2");
}

#[test]
fn missing_explicit_config_file_fails() {
    let cli = CliArgs {
        config_file: Some("/nonexistent/cumulus.toml".into()),
        command: None,
    };
    assert!(matches!(load(&cli), Err(LoadError::Build(_))));
}
