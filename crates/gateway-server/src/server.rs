//! Gateway server: listener setup and the accept loop

use crate::accept::{accept_with_backoff, AcceptBackoff, Acceptor};
use crate::config::GatewayConfig;
use crate::diagnostics;
use crate::dial::{Connector, TcpConnector};
use crate::handler::ConnectionHandler;
use crate::pool::ReaderPool;
use crate::stats::GatewayStats;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How often idle read buffers beyond the live connection count are released
const POOL_RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

const LISTEN_BACKLOG: i32 = 1024;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Set GW_REUSE_PORT=1 to share the port with another gateway")]
    Bind {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("Accept failed, no longer accepting connections: {0}")]
    Accept(#[source] std::io::Error),
}

/// Bind the client-facing listener, optionally with `SO_REUSEPORT`
pub fn bind_listener(addr: SocketAddr, reuse_port: bool) -> Result<TcpListener, GatewayError> {
    let bind_error = |e: std::io::Error| GatewayError::Bind {
        address: addr.ip().to_string(),
        port: addr.port(),
        reason: e.to_string(),
    };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    if reuse_port {
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(bind_error)?;
        #[cfg(not(unix))]
        tracing::warn!("SO_REUSEPORT is not supported on this platform, ignoring");
    }
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.bind(&addr.into()).map_err(bind_error)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;

    let listener = TcpListener::from_std(socket.into())?;
    debug!(reuse_port, "Bound listener on {}", addr);
    Ok(listener)
}

pub struct Gateway<A = TcpListener, C = TcpConnector> {
    acceptor: A,
    handler: ConnectionHandler<C>,
    pool: Arc<ReaderPool>,
    stats: Arc<GatewayStats>,
    shutdown: CancellationToken,
}

impl Gateway<TcpListener, TcpConnector> {
    pub fn new(listener: TcpListener, config: GatewayConfig) -> Self {
        Self::with_parts(listener, TcpConnector, config)
    }
}

impl<A: Acceptor, C: Connector> Gateway<A, C> {
    pub fn with_parts(acceptor: A, connector: C, config: GatewayConfig) -> Self {
        let pool = ReaderPool::new(config.read_buffer_size());
        let stats = Arc::new(GatewayStats::new());
        let shutdown = CancellationToken::new();
        let handler = ConnectionHandler::new(
            Arc::new(config),
            Arc::new(connector),
            Arc::clone(&pool),
            Arc::clone(&stats),
            shutdown.clone(),
        );

        Self {
            acceptor,
            handler,
            pool,
            stats,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    pub fn stats(&self) -> Arc<GatewayStats> {
        Arc::clone(&self.stats)
    }

    pub fn pool(&self) -> Arc<ReaderPool> {
        Arc::clone(&self.pool)
    }

    /// Cancelling this token stops the accept loop and ends every relay
    /// without draining.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn diagnostics_router(&self) -> axum::Router {
        diagnostics::router(self.stats(), self.pool())
    }

    /// Accept connections until shutdown (`Ok`) or a non-temporary accept
    /// error (`Err`). Connections already running are not affected by the
    /// latter.
    pub async fn run(self) -> Result<(), GatewayError> {
        info!("Gateway listening on {}", self.local_addr()?);

        let mut backoff = AcceptBackoff::new();
        let mut reclaim = tokio::time::interval(POOL_RECLAIM_INTERVAL);

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Gateway stopped accepting connections");
                    return Ok(());
                }
                _ = reclaim.tick() => {
                    let active = self.stats.snapshot(Default::default()).active;
                    self.pool.shrink_to(active as usize);
                    continue;
                }
                result = accept_with_backoff(&self.acceptor, &mut backoff, &self.stats) => result,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("New connection from {}", peer);
                    tokio::spawn(self.handler.clone().run(stream, peer));
                }
                Err(e) => {
                    error!("Failed to accept connection, giving up: {}", e);
                    return Err(GatewayError::Accept(e));
                }
            }
        }
    }
}
