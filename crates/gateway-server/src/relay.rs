//! Bidirectional relay between a client and its agent
//!
//! The agent->client direction runs as its own task; client->agent runs in
//! the caller. Whichever direction finishes first (EOF or error) ends the
//! relay: the other direction is aborted and both sockets are dropped. Bytes
//! still in flight on the other direction are not drained. Shutdown
//! cancellation ends the relay the same way.

use crate::stats::GatewayStats;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Which event ended the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// client->agent copy finished
    ClientClosed,
    /// agent->client copy finished (or its task failed)
    AgentClosed,
    /// Process shutdown
    Shutdown,
}

/// Aborts the copy task if the relay is dropped early (e.g. by a panic)
struct AbortOnDrop(JoinHandle<io::Result<u64>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn copy_counted<R, W, F>(reader: &mut R, writer: &mut W, mut on_bytes: F) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
        on_bytes(n as u64);
    }

    Ok(total)
}

/// Relay until either direction ends or `shutdown` fires.
///
/// Both streams are closed when this returns.
pub async fn relay<C, A>(
    client: C,
    agent: A,
    stats: &Arc<GatewayStats>,
    shutdown: &CancellationToken,
) -> RelayEnd
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    A: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut agent_read, mut agent_write) = tokio::io::split(agent);

    let downstream_stats = Arc::clone(stats);
    let mut downstream = AbortOnDrop(tokio::spawn(async move {
        copy_counted(&mut agent_read, &mut client_write, |n| {
            downstream_stats.add_agent_to_client(n)
        })
        .await
    }));

    let end = tokio::select! {
        result = copy_counted(&mut client_read, &mut agent_write, |n| stats.add_client_to_agent(n)) => {
            match result {
                Ok(bytes) => debug!(bytes, "Client closed"),
                Err(e) => debug!("Client->agent copy failed: {}", e),
            }
            RelayEnd::ClientClosed
        }
        joined = &mut downstream.0 => {
            match joined {
                Ok(Ok(bytes)) => debug!(bytes, "Agent closed"),
                Ok(Err(e)) => debug!("Agent->client copy failed: {}", e),
                Err(e) if e.is_panic() => {
                    stats.record_panic();
                    error!("Agent->client copy task panicked: {}", e);
                }
                Err(e) => debug!("Agent->client copy task cancelled: {}", e),
            }
            RelayEnd::AgentClosed
        }
        _ = shutdown.cancelled() => {
            debug!("Relay cancelled by shutdown");
            RelayEnd::Shutdown
        }
    };

    if end != RelayEnd::AgentClosed {
        // Tear down the other direction and wait for its halves to drop
        downstream.0.abort();
        let _ = (&mut downstream.0).await;
    }

    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};

    #[tokio::test]
    async fn test_relays_both_directions() {
        let (client, mut client_peer) = duplex(1024);
        let (agent, mut agent_peer) = duplex(1024);
        let stats = Arc::new(GatewayStats::new());
        let shutdown = CancellationToken::new();

        let relay_stats = Arc::clone(&stats);
        let handle =
            tokio::spawn(async move { relay(client, agent, &relay_stats, &shutdown).await });

        client_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        agent_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        agent_peer.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client_peer);
        assert_eq!(handle.await.unwrap(), RelayEnd::ClientClosed);

        // Agent side is closed once the relay returns
        let mut rest = Vec::new();
        agent_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let snapshot = stats.snapshot(Default::default());
        assert_eq!(snapshot.bytes_client_to_agent, 4);
        assert_eq!(snapshot.bytes_agent_to_client, 5);
    }

    #[tokio::test]
    async fn test_agent_close_ends_relay() {
        let (client, mut client_peer) = duplex(1024);
        let (agent, agent_peer) = duplex(1024);
        let stats = Arc::new(GatewayStats::new());
        let shutdown = CancellationToken::new();

        drop(agent_peer);
        assert_eq!(
            relay(client, agent, &stats, &shutdown).await,
            RelayEnd::AgentClosed
        );

        let mut rest = Vec::new();
        client_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_ends_relay() {
        let (client, mut client_peer) = duplex(1024);
        let (agent, _agent_peer) = duplex(1024);
        let stats = Arc::new(GatewayStats::new());
        let shutdown = CancellationToken::new();

        shutdown.cancel();
        assert_eq!(
            relay(client, agent, &stats, &shutdown).await,
            RelayEnd::Shutdown
        );

        let mut rest = Vec::new();
        client_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    /// Agent stream whose read side panics
    struct PanickingAgent;

    impl AsyncRead for PanickingAgent {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            panic!("agent read exploded");
        }
    }

    impl AsyncWrite for PanickingAgent {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_copy_task_panic_is_contained() {
        let (client, _client_peer) = duplex(1024);
        let stats = Arc::new(GatewayStats::new());
        let shutdown = CancellationToken::new();

        let end = relay(client, PanickingAgent, &stats, &shutdown).await;
        assert_eq!(end, RelayEnd::AgentClosed);
        assert_eq!(stats.snapshot(Default::default()).panics, 1);
    }
}
