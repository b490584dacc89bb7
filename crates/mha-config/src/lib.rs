// SPDX-License-Identifier: MIT OR Apache-2.0
//! Startup configuration for the MCP HTTP adapter.
//!
//! Settings arrive from an optional TOML file, the `HOST` environment
//! variable, and command-line flags, each captured as an [`AdapterSettings`]
//! layer. Layers are combined with [`merge_settings`] and validated once by
//! [`AdapterConfig::from_settings`] into the immutable [`AdapterConfig`] that
//! every request handler shares.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod parse;

pub use parse::{MappingKind, parse_env_pairs, parse_mapping, tokenize_command};

use mha_headers::HeaderMapping;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default read, write and process timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time allowed for in-flight requests at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Default request body limit (4 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors detected while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// No launch command was given, or it tokenized to nothing.
    #[error("a launch command is required (--stdio)")]
    MissingCommand,

    /// The launch command ends inside a quoted run.
    #[error("unclosed {quote} quote in launch command")]
    UnclosedQuote {
        /// The quote character left open.
        quote: char,
    },

    /// A `KEY=VALUE` or `Header=target` entry is malformed.
    #[error("invalid {option} entry {entry:?}: {reason}")]
    InvalidEntry {
        /// Option the entry was given to.
        option: &'static str,
        /// The offending entry.
        entry: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A mapping names something that is not a valid HTTP header.
    #[error("invalid header name {name:?} in {option}")]
    InvalidHeaderName {
        /// Option the mapping was given to.
        option: &'static str,
        /// The rejected header name.
        name: String,
    },

    /// A numeric setting that must be positive was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the setting.
        field: &'static str,
    },

    /// A setting holds a value outside its accepted set.
    #[error("invalid {field} {value:?}: expected one of {expected}")]
    InvalidValue {
        /// Name of the setting.
        field: &'static str,
        /// Rejected value.
        value: String,
        /// Accepted values.
        expected: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Settings layer
// ---------------------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "log_format",
                value: s.to_string(),
                expected: "text, json",
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// One unvalidated layer of settings, as read from a file or the command
/// line. Every field is optional so layers can be merged.
///
/// ```toml
/// stdio = "npx -y @modelcontextprotocol/server-github"
/// env = ["GITHUB_HOST=github.com"]
/// header_env = ["X-GitHub-Token=GITHUB_TOKEN"]
/// header_arg = ["X-Team-Id=team-id"]
/// port = 9000
/// process_timeout_secs = 60
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterSettings {
    /// Launch command line, tokenized with shell-like quoting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdio: Option<String>,
    /// Default environment entries (`KEY=VALUE`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Header to environment variable mappings (`Header=VAR`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub header_env: Vec<String>,
    /// Header to argument mappings (`Header=arg-name`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub header_arg: Vec<String>,
    /// Bind host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Listen port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Log output format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,
    /// Request body read timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    /// Response write timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout_secs: Option<u64>,
    /// Per-request subprocess timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_timeout_secs: Option<u64>,
    /// Seconds allowed for in-flight requests during shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_secs: Option<u64>,
    /// Maximum accepted request body size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<usize>,
    /// Enable `X-MCP-Env-*` / `X-MCP-Arg-*` / `X-MCP-Args` headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passthrough_headers: Option<bool>,
    /// Argument templates filled from `X-MCP-Arg-*` headers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arg_templates: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a settings layer from a TOML file, or an empty layer when `path` is
/// `None`. The `HOST` environment variable is applied on top.
pub fn load_settings(path: Option<&Path>) -> Result<AdapterSettings, ConfigError> {
    let mut settings = match path {
        Some(p) => {
            let content =
                std::fs::read_to_string(p).map_err(|source| ConfigError::FileNotFound {
                    path: p.display().to_string(),
                    source,
                })?;
            parse_toml(&content)?
        }
        None => AdapterSettings::default(),
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Parse a TOML string into a settings layer.
pub fn parse_toml(content: &str) -> Result<AdapterSettings, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment overrides from the process environment.
pub fn apply_env_overrides(settings: &mut AdapterSettings) {
    apply_env_overrides_from(settings, |key| std::env::var(key).ok());
}

/// Apply environment overrides using `lookup` in place of the process
/// environment. `HOST` replaces the bind host when set and non-empty.
pub fn apply_env_overrides_from<F>(settings: &mut AdapterSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("HOST").filter(|h| !h.trim().is_empty()) {
        settings.host = Some(host.trim().to_string());
    }
}

/// Overlay `overlay` on `base`. Scalars from `overlay` win when present;
/// list entries from `overlay` are appended after those of `base`.
pub fn merge_settings(base: AdapterSettings, overlay: AdapterSettings) -> AdapterSettings {
    fn concat(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
        a.extend(b);
        a
    }
    AdapterSettings {
        stdio: overlay.stdio.or(base.stdio),
        env: concat(base.env, overlay.env),
        header_env: concat(base.header_env, overlay.header_env),
        header_arg: concat(base.header_arg, overlay.header_arg),
        host: overlay.host.or(base.host),
        port: overlay.port.or(base.port),
        log_level: overlay.log_level.or(base.log_level),
        log_format: overlay.log_format.or(base.log_format),
        read_timeout_secs: overlay.read_timeout_secs.or(base.read_timeout_secs),
        write_timeout_secs: overlay.write_timeout_secs.or(base.write_timeout_secs),
        process_timeout_secs: overlay.process_timeout_secs.or(base.process_timeout_secs),
        shutdown_grace_secs: overlay.shutdown_grace_secs.or(base.shutdown_grace_secs),
        max_body_bytes: overlay.max_body_bytes.or(base.max_body_bytes),
        passthrough_headers: overlay.passthrough_headers.or(base.passthrough_headers),
        arg_templates: concat(base.arg_templates, overlay.arg_templates),
    }
}

// ---------------------------------------------------------------------------
// Validated config
// ---------------------------------------------------------------------------

/// Timeouts applied to each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed to receive the request body.
    pub read: Duration,
    /// Time allowed to send the response.
    pub write: Duration,
    /// Time allowed for the subprocess exchange.
    pub process: Duration,
    /// Time allowed for in-flight requests at shutdown.
    pub shutdown_grace: Duration,
}

impl Timeouts {
    /// Read, process and write budgets combined; the outer bound on one request.
    pub fn request_envelope(&self) -> Duration {
        self.read + self.process + self.write
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: DEFAULT_TIMEOUT,
            write: DEFAULT_TIMEOUT,
            process: DEFAULT_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Settings for the `X-MCP-*` prefix headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassthroughConfig {
    /// Whether prefix headers are honoured at all.
    pub enabled: bool,
    /// Templates rendered from `X-MCP-Arg-*` values.
    pub arg_templates: Vec<String>,
}

/// Logging settings consumed by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level directive (`info`, `debug`, ...).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Validated, immutable adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Program to launch per request.
    pub command: String,
    /// Arguments that precede any header-derived arguments.
    pub args: Vec<String>,
    /// Environment overrides applied to every child.
    pub default_env: BTreeMap<String, String>,
    /// Header to environment variable table.
    pub header_env: HeaderMapping,
    /// Header to `--name value` table.
    pub header_args: HeaderMapping,
    /// Bind host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Per-request timeouts.
    pub timeouts: Timeouts,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Prefix header settings.
    pub passthrough: PassthroughConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl AdapterConfig {
    /// Configuration for `command` with every other field at its default.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            default_env: BTreeMap::new(),
            header_env: HeaderMapping::new(),
            header_args: HeaderMapping::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeouts: Timeouts::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            passthrough: PassthroughConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate a merged settings layer.
    pub fn from_settings(settings: AdapterSettings) -> Result<Self, ConfigError> {
        let line = settings.stdio.as_deref().unwrap_or_default();
        let mut parts = tokenize_command(line)?.into_iter();
        let command = parts.next().ok_or(ConfigError::MissingCommand)?;
        let args = parts.collect();

        let default_env = parse_env_pairs(&settings.env)?;
        let header_env = parse_mapping(MappingKind::Env, &settings.header_env)?;
        let header_args = parse_mapping(MappingKind::Arg, &settings.header_arg)?;

        let timeouts = Timeouts {
            read: secs("read_timeout_secs", settings.read_timeout_secs, DEFAULT_TIMEOUT)?,
            write: secs("write_timeout_secs", settings.write_timeout_secs, DEFAULT_TIMEOUT)?,
            process: secs(
                "process_timeout_secs",
                settings.process_timeout_secs,
                DEFAULT_TIMEOUT,
            )?,
            shutdown_grace: secs(
                "shutdown_grace_secs",
                settings.shutdown_grace_secs,
                DEFAULT_SHUTDOWN_GRACE,
            )?,
        };

        let max_body_bytes = settings.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
        if max_body_bytes == 0 {
            return Err(ConfigError::Zero {
                field: "max_body_bytes",
            });
        }

        let level = settings
            .log_level
            .map(|l| l.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log_level",
                value: level,
                expected: "error, warn, info, debug, trace",
            });
        }

        Ok(Self {
            command,
            args,
            default_env,
            header_env,
            header_args,
            host: settings.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: settings.port.unwrap_or(DEFAULT_PORT),
            timeouts,
            max_body_bytes,
            passthrough: PassthroughConfig {
                enabled: settings.passthrough_headers.unwrap_or(false),
                arg_templates: settings.arg_templates,
            },
            logging: LoggingConfig {
                level,
                format: settings.log_format.unwrap_or_default(),
            },
        })
    }

    /// `host:port` suitable for binding; IPv6 literals are bracketed.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn secs(field: &'static str, value: Option<u64>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Zero { field }),
        Some(n) => Ok(Duration::from_secs(n)),
    }
}
