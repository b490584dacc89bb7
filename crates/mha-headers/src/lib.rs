// SPDX-License-Identifier: MIT OR Apache-2.0
//! mha-headers
//!
//! Pure translation of HTTP request headers into the environment overrides and
//! command-line arguments handed to a stdio child process.
//!
//! Two mechanisms exist:
//!
//! * [`map_headers`] applies the operator-declared [`HeaderMapping`] tables
//!   (`--header-env` / `--header-arg`).
//! * [`prefix`] implements the opt-in `X-MCP-Env-*` / `X-MCP-Arg-*` /
//!   `X-MCP-Args` conventions.
//!
//! Nothing in this crate performs I/O or can fail.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Operator-declared header mapping tables.
pub mod mapping;
/// `X-MCP-*` prefix header conventions.
pub mod prefix;

pub use mapping::{HeaderMapping, MappedHeaders, map_headers};
pub use prefix::{
    ARG_HEADER_PREFIX, ARGS_HEADER, ENV_HEADER_PREFIX, apply_args_template, header_suffix_to_var,
    parse_arg_headers, parse_env_headers,
};
