//! Gateway - encrypted-address TCP relay
//!
//! Accepts client connections, decrypts the backend address from each
//! handshake and relays traffic to it.

mod pidfile;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_cipher::{Aes256CbcCipher, SharedSecret};
use gateway_server::{
    bind_listener, diagnostics, install_panic_hook, DialPolicy, Gateway, GatewayConfig,
};
use pidfile::PidFile;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Gateway - relay TCP connections to backends named by an encrypted handshake
#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GATEWAY_GIT_HASH"), ")"))]
#[command(long_about = r#"
Gateway accepts TCP clients, reads an encrypted "host:port" from the first
frame each client sends, connects to that backend and relays bytes both ways.
Only clients holding the shared secret can route traffic.

EXAMPLES:
  # Listen on port 7000, three dial attempts of 5 seconds each
  GW_SECRET=s3cret gateway --port 7000 --dial-retry 3 --dial-timeout 5

  # Share the port with other gateway processes and expose diagnostics
  GW_SECRET=s3cret GW_REUSE_PORT=1 gateway --port 7000 --diag-addr 127.0.0.1:7070

ENVIRONMENT VARIABLES:
  GW_SECRET            Shared secret used to decrypt handshakes (required)
  GW_DIAL_RETRY        Dial attempts per connection (0 = default of 1)
  GW_DIAL_TIMEOUT      Seconds per dial attempt (0 = default of 3)
  GW_PORT              Listen port on 0.0.0.0 (0 = ephemeral)
  GW_REUSE_PORT        Set to 1 to enable SO_REUSEPORT
  GW_DIAG_ADDR         Bind address of the diagnostics HTTP endpoint
  GW_READ_BUFFER_SIZE  Handshake read buffer size in bytes (at least 257)
  GW_PID_FILE          PID file path
"#)]
struct Cli {
    /// Shared secret used to decrypt handshakes
    #[arg(long, env = "GW_SECRET", hide_env_values = true)]
    secret: String,

    /// Dial attempts per connection; only timeouts are retried
    #[arg(long, env = "GW_DIAL_RETRY", default_value_t = 0)]
    dial_retry: u32,

    /// Timeout of each dial attempt, in seconds
    #[arg(long, env = "GW_DIAL_TIMEOUT", default_value_t = 0)]
    dial_timeout: u64,

    /// Listen port
    #[arg(long, env = "GW_PORT", default_value_t = 0)]
    port: u16,

    /// Enable SO_REUSEPORT on the listener
    #[arg(
        long,
        env = "GW_REUSE_PORT",
        value_parser = parse_flag,
        num_args = 0..=1,
        default_value = "0",
        default_missing_value = "1"
    )]
    reuse_port: bool,

    /// Diagnostics HTTP endpoint (e.g., 127.0.0.1:7070); disabled if unset
    #[arg(long, env = "GW_DIAG_ADDR")]
    diag_addr: Option<SocketAddr>,

    /// Handshake read buffer size in bytes; also the longest accepted text line
    #[arg(long, env = "GW_READ_BUFFER_SIZE")]
    read_buffer_size: Option<usize>,

    /// PID file guarding against a second instance
    #[arg(long, env = "GW_PID_FILE", default_value = "gateway.pid")]
    pid_file: PathBuf,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim() {
        "1" | "true" | "yes" => Ok(true),
        "" | "0" | "false" | "no" => Ok(false),
        other => Err(format!("expected 0 or 1, got {:?}", other)),
    }
}

fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C elsewhere)
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;
    install_panic_hook();

    info!(
        git = env!("GATEWAY_GIT_HASH"),
        built = env!("GATEWAY_BUILD_TIME"),
        "Gateway {} starting",
        env!("CARGO_PKG_VERSION")
    );

    let _pid_file = PidFile::create(&cli.pid_file)?;

    let secret = SharedSecret::new(cli.secret).context("Invalid GW_SECRET")?;
    let dial_policy = DialPolicy::normalized(cli.dial_retry, cli.dial_timeout);
    info!(
        dial_retry = dial_policy.retry_count(),
        dial_timeout = ?dial_policy.dial_timeout(),
        reuse_port = cli.reuse_port,
        read_buffer_size = ?cli.read_buffer_size,
        "Configuration loaded"
    );

    let mut config = GatewayConfig::new(Aes256CbcCipher::new(secret), dial_policy);
    if let Some(size) = cli.read_buffer_size {
        config = config
            .with_read_buffer_size(size)
            .context("Invalid GW_READ_BUFFER_SIZE")?;
    }
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.port));
    let listener = bind_listener(bind_addr, cli.reuse_port)?;

    let gateway = Gateway::new(listener, config);
    let shutdown = gateway.shutdown_token();

    if let Some(diag_addr) = cli.diag_addr {
        let diag_listener = TcpListener::bind(diag_addr)
            .await
            .with_context(|| format!("Failed to bind diagnostics endpoint {}", diag_addr))?;
        let router = gateway.diagnostics_router();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = diagnostics::serve(diag_listener, router, token).await {
                error!("Diagnostics server error: {}", e);
            }
        });
    }

    let mut gateway_task = tokio::spawn(gateway.run());

    tokio::select! {
        result = wait_for_signal() => {
            result?;
            info!("Received shutdown signal");
        }
        result = &mut gateway_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{:#}", anyhow::Error::from(e)),
                Err(e) => error!("Gateway task failed: {}", e),
            }
            // Connections already relaying keep running until we are told to stop
            warn!("Gateway is no longer accepting connections; waiting for shutdown signal");
            wait_for_signal().await?;
            info!("Received shutdown signal");
        }
    }

    // In-flight relays are cut, not drained
    shutdown.cancel();
    info!("Gateway killed");

    Ok(())
}
