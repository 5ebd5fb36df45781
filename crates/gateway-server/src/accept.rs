//! Accepting client connections with backoff on temporary errors

use crate::stats::GatewayStats;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

pub const INITIAL_ACCEPT_DELAY: Duration = Duration::from_millis(5);
pub const MAX_ACCEPT_DELAY: Duration = Duration::from_secs(1);

/// Exponential backoff between failed accepts: 5ms doubling up to 1s, back
/// to zero after any successful accept.
#[derive(Debug, Clone, Default)]
pub struct AcceptBackoff {
    delay: Duration,
}

impl AcceptBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the delay for the next retry
    pub fn next_delay(&mut self) -> Duration {
        self.delay = if self.delay.is_zero() {
            INITIAL_ACCEPT_DELAY
        } else {
            (self.delay * 2).min(MAX_ACCEPT_DELAY)
        };
        self.delay
    }

    pub fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }

    pub fn current(&self) -> Duration {
        self.delay
    }
}

/// Errors worth retrying: interrupted or aborted handshakes and transient
/// resource exhaustion (EINTR, ENOMEM, ENFILE, EMFILE, ENOBUFS).
pub fn is_temporary(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::OutOfMemory => true,
        _ => matches!(e.raw_os_error(), Some(4 | 12 | 23 | 24 | 105)),
    }
}

/// Source of client connections
#[async_trait]
pub trait Acceptor: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Accept the next connection, sleeping through temporary errors.
///
/// Returns the first non-temporary error; the caller should stop accepting.
pub async fn accept_with_backoff<A>(
    acceptor: &A,
    backoff: &mut AcceptBackoff,
    stats: &GatewayStats,
) -> io::Result<(A::Stream, SocketAddr)>
where
    A: Acceptor + ?Sized,
{
    loop {
        match acceptor.accept().await {
            Ok(conn) => {
                backoff.reset();
                return Ok(conn);
            }
            Err(e) if is_temporary(&e) => {
                let delay = backoff.next_delay();
                stats.accept_retried();
                warn!("Accept error: {}; retrying in {:?}", e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
