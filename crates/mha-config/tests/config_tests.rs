// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for loading, merging and validating adapter configuration.

use mha_config::{
    AdapterConfig, AdapterSettings, ConfigError, DEFAULT_MAX_BODY_BYTES, LogFormat,
    apply_env_overrides_from, load_settings, merge_settings, parse_toml,
};
use std::io::Write;
use std::time::Duration;

fn with_command(cmd: &str) -> AdapterSettings {
    AdapterSettings {
        stdio: Some(cmd.into()),
        ..AdapterSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Defaults and validation
// ---------------------------------------------------------------------------

#[test]
fn minimal_settings_use_defaults() {
    let cfg = AdapterConfig::from_settings(with_command("cat")).unwrap();
    assert_eq!(cfg.command, "cat");
    assert!(cfg.args.is_empty());
    assert_eq!(cfg.host, "0.0.0.0");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.timeouts.read, Duration::from_secs(30));
    assert_eq!(cfg.timeouts.write, Duration::from_secs(30));
    assert_eq!(cfg.timeouts.process, Duration::from_secs(30));
    assert_eq!(cfg.timeouts.shutdown_grace, Duration::from_secs(5));
    assert_eq!(cfg.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    assert!(!cfg.passthrough.enabled);
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.logging.format, LogFormat::Text);
    assert_eq!(cfg, AdapterConfig::new("cat"));
}

#[test]
fn command_is_split_into_program_and_args() {
    let cfg = AdapterConfig::from_settings(with_command("npx -y 'server github'")).unwrap();
    assert_eq!(cfg.command, "npx");
    assert_eq!(cfg.args, ["-y", "server github"]);
}

#[test]
fn missing_command_is_rejected() {
    let err = AdapterConfig::from_settings(AdapterSettings::default()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingCommand));
    let err = AdapterConfig::from_settings(with_command("   ")).unwrap_err();
    assert!(matches!(err, ConfigError::MissingCommand));
}

#[test]
fn unclosed_quote_in_command_is_rejected() {
    let err = AdapterConfig::from_settings(with_command("node 'x")).unwrap_err();
    assert!(matches!(err, ConfigError::UnclosedQuote { .. }));
}

#[test]
fn zero_timeouts_are_rejected() {
    for (field, settings) in [
        (
            "read_timeout_secs",
            AdapterSettings {
                read_timeout_secs: Some(0),
                ..with_command("cat")
            },
        ),
        (
            "write_timeout_secs",
            AdapterSettings {
                write_timeout_secs: Some(0),
                ..with_command("cat")
            },
        ),
        (
            "process_timeout_secs",
            AdapterSettings {
                process_timeout_secs: Some(0),
                ..with_command("cat")
            },
        ),
        (
            "shutdown_grace_secs",
            AdapterSettings {
                shutdown_grace_secs: Some(0),
                ..with_command("cat")
            },
        ),
    ] {
        match AdapterConfig::from_settings(settings) {
            Err(ConfigError::Zero { field: f }) => assert_eq!(f, field),
            other => panic!("expected Zero for {field}, got {other:?}"),
        }
    }
}

#[test]
fn zero_body_limit_is_rejected() {
    let settings = AdapterSettings {
        max_body_bytes: Some(0),
        ..with_command("cat")
    };
    assert!(matches!(
        AdapterConfig::from_settings(settings),
        Err(ConfigError::Zero {
            field: "max_body_bytes"
        })
    ));
}

#[test]
fn unknown_log_level_is_rejected() {
    let settings = AdapterSettings {
        log_level: Some("loud".into()),
        ..with_command("cat")
    };
    assert!(matches!(
        AdapterConfig::from_settings(settings),
        Err(ConfigError::InvalidValue {
            field: "log_level",
            ..
        })
    ));
}

#[test]
fn log_level_is_case_insensitive() {
    let settings = AdapterSettings {
        log_level: Some("DEBUG".into()),
        ..with_command("cat")
    };
    assert_eq!(
        AdapterConfig::from_settings(settings).unwrap().logging.level,
        "debug"
    );
}

#[test]
fn malformed_mappings_fail_validation() {
    let settings = AdapterSettings {
        header_arg: vec!["X-Team-Id".into()],
        ..with_command("cat")
    };
    assert!(matches!(
        AdapterConfig::from_settings(settings),
        Err(ConfigError::InvalidEntry { .. })
    ));
}

#[test]
fn request_envelope_sums_budgets() {
    let settings = AdapterSettings {
        read_timeout_secs: Some(1),
        process_timeout_secs: Some(2),
        write_timeout_secs: Some(3),
        ..with_command("cat")
    };
    let cfg = AdapterConfig::from_settings(settings).unwrap();
    assert_eq!(cfg.timeouts.request_envelope(), Duration::from_secs(6));
}

#[test]
fn listen_addr_brackets_ipv6() {
    let mut cfg = AdapterConfig::new("cat");
    cfg.host = "127.0.0.1".into();
    cfg.port = 9000;
    assert_eq!(cfg.listen_addr(), "127.0.0.1:9000");
    cfg.host = "::1".into();
    assert_eq!(cfg.listen_addr(), "[::1]:9000");
}

#[test]
fn log_format_parses_from_str() {
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("Text".parse::<LogFormat>().unwrap(), LogFormat::Text);
    assert!("xml".parse::<LogFormat>().is_err());
}

// ---------------------------------------------------------------------------
// TOML files
// ---------------------------------------------------------------------------

const SAMPLE: &str = r#"
stdio = "npx -y @modelcontextprotocol/server-github"
env = ["GITHUB_HOST=github.com"]
header_env = ["X-GitHub-Token=GITHUB_TOKEN"]
header_arg = ["X-Team-Id=team-id"]
host = "127.0.0.1"
port = 9000
log_format = "json"
process_timeout_secs = 60
passthrough_headers = true
arg_templates = ["--team={{.TEAM_ID}}"]
"#;

#[test]
fn toml_round_trip_into_config() {
    let settings = parse_toml(SAMPLE).unwrap();
    let cfg = AdapterConfig::from_settings(settings).unwrap();
    assert_eq!(cfg.command, "npx");
    assert_eq!(cfg.default_env["GITHUB_HOST"], "github.com");
    assert_eq!(cfg.header_env.len(), 1);
    assert_eq!(cfg.header_args.len(), 1);
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.logging.format, LogFormat::Json);
    assert_eq!(cfg.timeouts.process, Duration::from_secs(60));
    assert!(cfg.passthrough.enabled);
    assert_eq!(cfg.passthrough.arg_templates, ["--team={{.TEAM_ID}}"]);
}

#[test]
fn unknown_toml_key_is_rejected() {
    let err = parse_toml("stdio = \"cat\"\nbogus = 1\n").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    assert!(matches!(
        parse_toml("this is not toml ="),
        Err(ConfigError::ParseError { .. })
    ));
}

#[test]
fn load_settings_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    let settings = load_settings(Some(file.path())).unwrap();
    assert_eq!(settings.port, Some(9000));
}

#[test]
fn load_settings_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_settings(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));
}

// ---------------------------------------------------------------------------
// Layering
// ---------------------------------------------------------------------------

#[test]
fn host_env_var_overrides_bind_host() {
    let mut settings = with_command("cat");
    apply_env_overrides_from(&mut settings, |k| {
        (k == "HOST").then(|| "127.0.0.1".to_string())
    });
    assert_eq!(settings.host.as_deref(), Some("127.0.0.1"));
}

#[test]
fn empty_host_env_var_is_ignored() {
    let mut settings = AdapterSettings {
        host: Some("10.0.0.1".into()),
        ..with_command("cat")
    };
    apply_env_overrides_from(&mut settings, |_| Some("  ".to_string()));
    assert_eq!(settings.host.as_deref(), Some("10.0.0.1"));
}

#[test]
fn overlay_scalars_win_and_lists_append() {
    let base = parse_toml(SAMPLE).unwrap();
    let overlay = AdapterSettings {
        port: Some(7000),
        env: vec!["EXTRA=1".into()],
        header_arg: vec!["X-Channel=channel".into()],
        ..AdapterSettings::default()
    };
    let merged = merge_settings(base, overlay);
    assert_eq!(merged.port, Some(7000));
    assert_eq!(merged.host.as_deref(), Some("127.0.0.1"));
    assert_eq!(merged.env, ["GITHUB_HOST=github.com", "EXTRA=1"]);
    assert_eq!(merged.header_arg, ["X-Team-Id=team-id", "X-Channel=channel"]);

    let cfg = AdapterConfig::from_settings(merged).unwrap();
    let targets: Vec<&str> = cfg.header_args.iter().map(|(_, t)| t).collect();
    assert_eq!(targets, ["team-id", "channel"]);
}

#[test]
fn later_mapping_layer_replaces_earlier_target() {
    let base = AdapterSettings {
        header_env: vec!["X-Token=OLD".into()],
        ..with_command("cat")
    };
    let overlay = AdapterSettings {
        header_env: vec!["x-token=NEW".into()],
        ..AdapterSettings::default()
    };
    let cfg = AdapterConfig::from_settings(merge_settings(base, overlay)).unwrap();
    assert_eq!(cfg.header_env.len(), 1);
    assert_eq!(cfg.header_env.iter().next().unwrap().1, "NEW");
}
