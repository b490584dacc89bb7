// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use mha_config::{
    AdapterConfig, AdapterSettings, LogFormat, LoggingConfig, load_settings, merge_settings,
};
use mha_daemon::{AppState, ServerState, serve};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mcp-http-adapter",
    version,
    about = "Expose a stdio MCP server over HTTP, one process per request"
)]
struct Args {
    /// Command that starts the stdio MCP server (e.g. "npx -y server-filesystem /data").
    #[arg(long)]
    stdio: Option<String>,

    /// Default environment variable for every child (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Map a request header to an environment variable (repeatable).
    #[arg(long = "header-env", value_name = "HEADER=VAR")]
    header_env: Vec<String>,

    /// Map a request header to a `--name value` argument (repeatable).
    #[arg(long = "header-arg", value_name = "HEADER=NAME")]
    header_arg: Vec<String>,

    /// Bind host (default 0.0.0.0, or $HOST).
    #[arg(long)]
    host: Option<String>,

    /// Listen port.
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Log level: error, warn, info, debug, trace. RUST_LOG wins when set.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_name = "text|json")]
    log_format: Option<LogFormat>,

    /// TOML config file; command-line values override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds allowed for each child process exchange.
    #[arg(long)]
    process_timeout_secs: Option<u64>,

    /// Seconds allowed to receive a request body.
    #[arg(long)]
    read_timeout_secs: Option<u64>,

    /// Seconds allowed to send a response.
    #[arg(long)]
    write_timeout_secs: Option<u64>,

    /// Seconds in-flight requests may run after a shutdown signal.
    #[arg(long)]
    shutdown_grace_secs: Option<u64>,

    /// Largest accepted request body in bytes.
    #[arg(long)]
    max_body_bytes: Option<usize>,

    /// Honour X-MCP-Env-*, X-MCP-Arg-* and X-MCP-Args request headers.
    #[arg(long)]
    passthrough_headers: bool,

    /// Argument template filled from X-MCP-Arg-* headers, e.g. "--team={{.TEAM_ID}}" (repeatable).
    #[arg(long = "arg-template")]
    arg_templates: Vec<String>,
}

impl Args {
    fn into_settings(self) -> (Option<PathBuf>, AdapterSettings) {
        let settings = AdapterSettings {
            stdio: self.stdio,
            env: self.env,
            header_env: self.header_env,
            header_arg: self.header_arg,
            host: self.host,
            port: self.port,
            log_level: self.log_level,
            log_format: self.log_format,
            read_timeout_secs: self.read_timeout_secs,
            write_timeout_secs: self.write_timeout_secs,
            process_timeout_secs: self.process_timeout_secs,
            shutdown_grace_secs: self.shutdown_grace_secs,
            max_body_bytes: self.max_body_bytes,
            passthrough_headers: self.passthrough_headers.then_some(true),
            arg_templates: self.arg_templates,
        };
        (self.config, settings)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "mha.daemon", error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(target: "mha.daemon", error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(target: "mha.daemon", "received SIGINT, starting graceful shutdown"),
        () = terminate => info!(target: "mha.daemon", "received SIGTERM, starting graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config_path, cli) = Args::parse().into_settings();
    let file = load_settings(config_path.as_deref())?;
    let config = AdapterConfig::from_settings(merge_settings(file, cli))
        .context("invalid configuration")?;

    init_tracing(&config.logging);
    debug!(
        target: "mha.daemon",
        command = %config.command,
        args = ?config.args,
        header_env = config.header_env.len(),
        header_args = config.header_args.len(),
        passthrough = config.passthrough.enabled,
        "configuration loaded"
    );

    let addr = config.listen_addr();
    let state = Arc::new(AppState::new(Arc::new(config)));
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            let mut lifecycle = state.lifecycle.write().await;
            if let Err(err) =
                lifecycle.transition(ServerState::Stopped, Some(format!("bind failed: {e}")))
            {
                warn!(target: "mha.daemon", error = %err, "lifecycle transition rejected");
            }
            return Err(e).with_context(|| format!("bind {addr}"));
        }
    };

    serve(listener, state, shutdown_signal()).await
}
