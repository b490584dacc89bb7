// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parsers for the textual startup options: the launch command line,
//! `KEY=VALUE` environment entries, and `Header=target` mappings.

use crate::ConfigError;
use http::HeaderName;
use mha_headers::HeaderMapping;
use std::collections::BTreeMap;

/// Which mapping table an entry belongs to. Argument targets get an extra
/// check because they are emitted as `--<target>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingKind {
    /// `--header-env`: header value becomes an environment variable.
    Env,
    /// `--header-arg`: header value becomes a `--<name> <value>` pair.
    Arg,
}

impl MappingKind {
    fn option(self) -> &'static str {
        match self {
            Self::Env => "--header-env",
            Self::Arg => "--header-arg",
        }
    }
}

/// Split a launch command into program and arguments.
///
/// Whitespace separates tokens. Single or double quotes group text, the other
/// quote character is literal inside a quoted run, and the quotes themselves
/// are removed. Empty tokens (including `""`) are dropped.
///
/// ```
/// let parts = mha_config::tokenize_command(r#"npx -y "my server" --name='a b'"#).unwrap();
/// assert_eq!(parts, ["npx", "-y", "my server", "--name=a b"]);
/// ```
pub fn tokenize_command(line: &str) -> Result<Vec<String>, ConfigError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }

    if let Some(quote) = quote {
        return Err(ConfigError::UnclosedQuote { quote });
    }
    if !current.is_empty() {
        parts.push(current);
    }
    Ok(parts)
}

fn split_pair<'a>(option: &'static str, entry: &'a str) -> Result<(&'a str, &'a str), ConfigError> {
    let invalid = |reason: &'static str| ConfigError::InvalidEntry {
        option,
        entry: entry.to_string(),
        reason,
    };
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| invalid("expected KEY=VALUE"))?;
    if key.trim().is_empty() {
        return Err(invalid("key is empty"));
    }
    if value.contains('=') {
        return Err(invalid("value cannot contain '='"));
    }
    Ok((key.trim(), value))
}

/// Parse repeatable `--env KEY=VALUE` entries. Later entries win.
pub fn parse_env_pairs<S: AsRef<str>>(entries: &[S]) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut env = BTreeMap::new();
    for entry in entries {
        let (key, value) = split_pair("--env", entry.as_ref())?;
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

/// Parse repeatable `Header=target` mapping entries into a [`HeaderMapping`]
/// that keeps declaration order.
pub fn parse_mapping<S: AsRef<str>>(
    kind: MappingKind,
    entries: &[S],
) -> Result<HeaderMapping, ConfigError> {
    let option = kind.option();
    let mut mapping = HeaderMapping::new();
    for entry in entries {
        let entry = entry.as_ref();
        let (header, target) = split_pair(option, entry)?;
        let name = HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
            ConfigError::InvalidHeaderName {
                option,
                name: header.to_string(),
            }
        })?;
        let target = target.trim();
        if target.is_empty() {
            return Err(ConfigError::InvalidEntry {
                option,
                entry: entry.to_string(),
                reason: "target is empty",
            });
        }
        if kind == MappingKind::Arg && target.starts_with('-') {
            return Err(ConfigError::InvalidEntry {
                option,
                entry: entry.to_string(),
                reason: "argument name must not start with '-'",
            });
        }
        mapping.insert(name, target.to_string());
    }
    Ok(mapping)
}
