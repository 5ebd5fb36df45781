//! Per-connection pipeline: handshake, dial, bootstrap, status token, relay

use crate::bootstrap::{bootstrap, BootstrapError};
use crate::config::GatewayConfig;
use crate::dial::{dial, Connector, DialError};
use crate::handshake::{decode_handshake, HandshakeError};
use crate::pool::ReaderPool;
use crate::relay::{relay, RelayEnd};
use crate::stats::GatewayStats;
use futures::FutureExt;
use gateway_proto::{BufferedReader, StatusToken};
use std::any::Any;
use std::backtrace::Backtrace;
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Dial failed: {0}")]
    Dial(#[from] DialError),

    #[error("Agent bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("IO error on client connection: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Token the client should receive for this failure, if any
    pub fn status(&self) -> Option<StatusToken> {
        match self {
            ConnectionError::Handshake(e) => e.status(),
            ConnectionError::Dial(e) => Some(e.status()),
            ConnectionError::Bootstrap(e) => Some(e.status()),
            ConnectionError::Io(_) => None,
        }
    }
}

/// Handles accepted connections. Cheap to clone; one clone per connection.
pub struct ConnectionHandler<C> {
    config: Arc<GatewayConfig>,
    connector: Arc<C>,
    pool: Arc<ReaderPool>,
    stats: Arc<GatewayStats>,
    shutdown: CancellationToken,
}

impl<C> Clone for ConnectionHandler<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            pool: Arc::clone(&self.pool),
            stats: Arc::clone(&self.stats),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<C: Connector> ConnectionHandler<C> {
    pub fn new(
        config: Arc<GatewayConfig>,
        connector: Arc<C>,
        pool: Arc<ReaderPool>,
        stats: Arc<GatewayStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            connector,
            pool,
            stats,
            shutdown,
        }
    }

    /// Serve one client to completion. Never fails and never unwinds: errors
    /// and panics are logged and end only this connection.
    pub async fn run<S>(self, client: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.stats.connection_opened();

        let outcome = AssertUnwindSafe(self.handle(client, peer))
            .catch_unwind()
            .instrument(info_span!("connection", %peer))
            .await;

        match outcome {
            Ok(Ok(end)) => debug!(%peer, ?end, "Connection closed"),
            Ok(Err(e)) => match e.status() {
                Some(token @ (StatusToken::DialError | StatusToken::DialTimeout)) => {
                    warn!(%peer, status = %token, "Connection rejected: {}", e)
                }
                Some(token) => debug!(%peer, status = %token, "Connection rejected: {}", e),
                None => debug!(%peer, "Connection dropped: {}", e),
            },
            Err(panic) => {
                self.stats.record_panic();
                error!(%peer, "Connection handler panicked: {}", panic_message(&*panic));
            }
        }

        self.stats.connection_closed();
    }

    async fn handle<S>(&self, mut client: S, peer: SocketAddr) -> Result<RelayEnd, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let established = tokio::select! {
            result = self.establish(&mut client, peer) => result,
            _ = self.shutdown.cancelled() => return Ok(RelayEnd::Shutdown),
        };

        let agent = match established {
            Ok(agent) => agent,
            Err(e) => {
                if let Some(token) = e.status() {
                    if let Err(write_err) = self.write_status(&mut client, token).await {
                        debug!("Failed to send {} to client: {}", token, write_err);
                    }
                }
                return Err(e);
            }
        };

        self.write_status(&mut client, StatusToken::Ok).await?;
        Ok(relay(client, agent, &self.stats, &self.shutdown).await)
    }

    /// Everything up to the `200` token. The read buffer goes back to the pool
    /// when this returns.
    async fn establish<S>(&self, client: &mut S, peer: SocketAddr) -> Result<C::Stream, ConnectionError>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = self.pool.acquire();
        let mut reader = BufferedReader::new(client, &mut buf, self.config.read_buffer_size());
        let handshake = decode_handshake(&mut reader, self.config.cipher()).await?;

        debug!(
            agent = %handshake.destination,
            binary = handshake.binary,
            "Dialing agent"
        );

        let policy = self.config.dial_policy();
        let mut agent = dial(self.connector.as_ref(), &handshake.destination, policy).await?;

        bootstrap(
            &mut agent,
            &peer.to_string(),
            handshake.leftover,
            policy.dial_timeout(),
        )
        .await?;

        Ok(agent)
    }

    async fn write_status<S>(&self, client: &mut S, token: StatusToken) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        self.stats.record_status(token);
        client.write_all(token.as_bytes()).await?;
        client.flush().await
    }
}

/// Report panics through `tracing` with the panic site and a backtrace.
///
/// The hook runs on the panicking task before unwinding, so the report lands
/// inside that connection's span. [`ConnectionHandler::run`] still contains
/// the panic afterwards.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        error!(
            "{}",
            describe_panic(panic_message(info.payload()), info.location(), &backtrace)
        );
    }));
}

fn describe_panic(
    message: &str,
    location: Option<&Location<'_>>,
    backtrace: &Backtrace,
) -> String {
    match location {
        Some(location) => format!("Panic at {}: {}\n{}", location, message, backtrace),
        None => format!("Panic: {}\n{}", message, backtrace),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
