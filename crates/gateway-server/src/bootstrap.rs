//! Agent bootstrap: tell the backend who the client is, then hand over any
//! bytes the client pipelined behind its handshake.

use gateway_proto::{Preamble, PreambleError, StatusToken};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Client address too long for preamble: {0} bytes")]
    AddressTooLong(usize),

    #[error("IO error writing to agent: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writing to agent did not complete within {0:?}")]
    Timeout(Duration),
}

impl BootstrapError {
    pub fn status(&self) -> StatusToken {
        StatusToken::DialError
    }
}

impl From<PreambleError> for BootstrapError {
    fn from(e: PreambleError) -> Self {
        match e {
            PreambleError::AddressTooLong(len) => BootstrapError::AddressTooLong(len),
            PreambleError::Io(e) => BootstrapError::Io(e),
            PreambleError::InvalidUtf8 => {
                BootstrapError::Io(std::io::ErrorKind::InvalidData.into())
            }
        }
    }
}

/// Write the preamble and `leftover` to the agent.
///
/// The whole write is bounded by `write_timeout`; the bound ends with this
/// call, so the relay that follows runs without a deadline.
pub async fn bootstrap<W>(
    agent: &mut W,
    client_addr: &str,
    leftover: &[u8],
    write_timeout: Duration,
) -> Result<(), BootstrapError>
where
    W: AsyncWrite + Unpin,
{
    let mut out = Preamble::new(client_addr)?.encode();
    out.extend_from_slice(leftover);

    let write = async {
        agent.write_all(&out).await?;
        agent.flush().await
    };

    tokio::time::timeout(write_timeout, write)
        .await
        .map_err(|_| BootstrapError::Timeout(write_timeout))??;

    trace!(
        client_addr,
        leftover = leftover.len(),
        "Agent bootstrap complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_preamble_then_leftover() {
        let (mut agent, mut backend) = tokio::io::duplex(1024);

        bootstrap(&mut agent, "192.0.2.10:40000", b"GET /", Duration::from_secs(1))
            .await
            .unwrap();
        drop(agent);

        let preamble = Preamble::read_from(&mut backend).await.unwrap();
        assert_eq!(preamble.client_addr(), "192.0.2.10:40000");

        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"GET /");
    }

    #[tokio::test]
    async fn test_rejects_oversized_client_address() {
        let (mut agent, _backend) = tokio::io::duplex(1024);
        let addr = "x".repeat(300);

        let err = bootstrap(&mut agent, &addr, b"", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::AddressTooLong(300)));
        assert_eq!(err.status(), StatusToken::DialError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_agent_times_out() {
        // Tiny pipe nobody drains
        let (mut agent, _backend) = tokio::io::duplex(4);

        let err = bootstrap(&mut agent, "127.0.0.1:1", &[0u8; 64], Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_closed_agent_is_io_error() {
        let (mut agent, backend) = tokio::io::duplex(16);
        drop(backend);

        let err = bootstrap(&mut agent, "127.0.0.1:1", b"data", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Io(_)));
    }
}
