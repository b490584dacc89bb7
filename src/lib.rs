// SPDX-License-Identifier: MIT OR Apache-2.0
//! MCP HTTP adapter.
//!
//! Serves a stdio-only MCP server over HTTP by launching it once per
//! request. The workspace crates are re-exported here:
//!
//! * [`headers`]: request header to environment/argument translation.
//! * [`host`]: one-shot child process execution.
//! * [`config`]: startup configuration.
//! * [`daemon`]: the HTTP server and its binary.
#![deny(unsafe_code)]

pub use mha_config as config;
pub use mha_daemon as daemon;
pub use mha_headers as headers;
pub use mha_host as host;
