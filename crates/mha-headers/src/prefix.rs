// SPDX-License-Identifier: MIT OR Apache-2.0
//! Prefix-based header conventions.
//!
//! * `X-MCP-Env-Api-Key: k` → env `API_KEY=k`
//! * `X-MCP-Args: ["--verbose","--output","json"]` → args verbatim
//! * `X-MCP-Arg-Team-Id: t1` + template `["--team", "{{.TEAM_ID}}"]` → `--team t1`
//!
//! These let the caller pick variable names, so the daemon only consults
//! them when passthrough is explicitly enabled.

use http::HeaderMap;
use std::collections::BTreeMap;

/// Prefix for headers that become environment variables.
pub const ENV_HEADER_PREFIX: &str = "x-mcp-env-";
/// Prefix for headers that become argument template variables.
pub const ARG_HEADER_PREFIX: &str = "x-mcp-arg-";
/// Header carrying a JSON array of literal arguments.
pub const ARGS_HEADER: &str = "x-mcp-args";

/// Convert a header-name suffix to a variable name: `Api-Key` → `API_KEY`.
pub fn header_suffix_to_var(suffix: &str) -> String {
    suffix.replace('-', "_").to_ascii_uppercase()
}

/// Collect `X-MCP-Env-*` headers as environment variables.
///
/// Header names compare case-insensitively. A header with an empty suffix is
/// ignored, as is any header whose first value is empty.
pub fn parse_env_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    collect_prefixed(headers, ENV_HEADER_PREFIX)
}

/// Build arguments from `X-MCP-Args` or `X-MCP-Arg-*` headers.
///
/// A well-formed JSON string array in `X-MCP-Args` takes precedence and is
/// returned as-is. Otherwise `X-MCP-Arg-*` headers are rendered through
/// `templates`; with no templates or no such headers the result is empty.
pub fn parse_arg_headers(headers: &HeaderMap, templates: &[String]) -> Vec<String> {
    let literal = headers
        .get(ARGS_HEADER)
        .map(|v| v.as_bytes())
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| serde_json::from_slice::<Vec<String>>(raw).ok());
    if let Some(args) = literal {
        return args;
    }

    let vars = collect_prefixed(headers, ARG_HEADER_PREFIX);
    if templates.is_empty() || vars.is_empty() {
        return Vec::new();
    }
    apply_args_template(templates, &vars)
}

/// Render each template element against `vars`.
///
/// Placeholders have the form `{{.NAME}}` (inner whitespace allowed). An
/// element that references a variable absent from `vars`, or that contains a
/// malformed placeholder, is kept verbatim.
pub fn apply_args_template(templates: &[String], vars: &BTreeMap<String, String>) -> Vec<String> {
    templates
        .iter()
        .map(|tmpl| render(tmpl, vars).unwrap_or_else(|| tmpl.clone()))
        .collect()
}

fn render(tmpl: &str, vars: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::with_capacity(tmpl.len());
    let mut rest = tmpl;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}")?;
        let name = after[..end].trim().strip_prefix('.')?;
        out.push_str(vars.get(name)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Some(out)
}

fn collect_prefixed(headers: &HeaderMap, prefix: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in headers.keys() {
        // HeaderName is always lower-case.
        let Some(suffix) = name.as_str().strip_prefix(prefix) else {
            continue;
        };
        if suffix.is_empty() {
            continue;
        }
        if let Some(value) = crate::mapping::header_value(headers, name) {
            out.insert(header_suffix_to_var(suffix), value);
        }
    }
    out
}
