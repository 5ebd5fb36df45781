//! Backend dialing with a bounded retry-on-timeout policy

use crate::config::DialPolicy;
use async_trait::async_trait;
use gateway_proto::StatusToken;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DialError {
    #[error("Failed to connect to {address}: {source}")]
    Failed {
        address: String,
        source: io::Error,
    },

    #[error("Connecting to {address} timed out after {attempts} attempt(s)")]
    TimedOut { address: String, attempts: u32 },
}

impl DialError {
    pub fn status(&self) -> StatusToken {
        match self {
            DialError::Failed { .. } => StatusToken::DialError,
            DialError::TimedOut { .. } => StatusToken::DialTimeout,
        }
    }
}

/// Opens backend connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, address: &str) -> io::Result<Self::Stream>;
}

/// Plain TCP connector; `address` is resolved as `host:port`
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, address: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::TimedOut
}

/// Dial `address`, retrying only attempts that time out.
///
/// Any other failure is returned immediately as [`DialError::Failed`].
pub async fn dial<C: Connector + ?Sized>(
    connector: &C,
    address: &str,
    policy: &DialPolicy,
) -> Result<C::Stream, DialError> {
    let attempts = policy.retry_count();

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.dial_timeout(), connector.connect(address)).await {
            Ok(Ok(stream)) => {
                debug!(agent = address, attempt, "Connected to agent");
                return Ok(stream);
            }
            Ok(Err(e)) if !is_timeout(&e) => {
                return Err(DialError::Failed {
                    address: address.to_string(),
                    source: e,
                });
            }
            Ok(Err(_)) | Err(_) => {
                warn!(agent = address, attempt, attempts, "Dial attempt timed out");
            }
        }
    }

    Err(DialError::TimedOut {
        address: address.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    enum Behavior {
        Hang,
        TimedOutError,
        Refuse,
        SucceedOn(u32),
    }

    struct MockConnector {
        behavior: Behavior,
        attempts: Arc<AtomicU32>,
    }

    impl MockConnector {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                attempts: Arc::new(AtomicU32::new(0)),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Stream = tokio::io::DuplexStream;

        async fn connect(&self, _address: &str) -> io::Result<Self::Stream> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.behavior {
                Behavior::Hang => {
                    std::future::pending::<io::Result<Self::Stream>>().await
                }
                Behavior::TimedOutError => Err(io::ErrorKind::TimedOut.into()),
                Behavior::Refuse => Err(io::ErrorKind::ConnectionRefused.into()),
                Behavior::SucceedOn(k) if n >= k => Ok(tokio::io::duplex(64).0),
                Behavior::SucceedOn(_) => {
                    std::future::pending::<io::Result<Self::Stream>>().await
                }
            }
        }
    }

    fn policy(retries: u32) -> DialPolicy {
        DialPolicy::new(retries, Duration::from_secs(3)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried_then_exhausted() {
        let connector = MockConnector::new(Behavior::Hang);
        let err = dial(&connector, "10.0.0.1:80", &policy(3)).await.unwrap_err();

        assert_eq!(connector.attempts(), 3);
        assert!(matches!(err, DialError::TimedOut { attempts: 3, .. }));
        assert_eq!(err.status(), StatusToken::DialTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_io_error_is_retryable() {
        let connector = MockConnector::new(Behavior::TimedOutError);
        let err = dial(&connector, "10.0.0.1:80", &policy(2)).await.unwrap_err();

        assert_eq!(connector.attempts(), 2);
        assert_eq!(err.status(), StatusToken::DialTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refusal_is_not_retried() {
        let connector = MockConnector::new(Behavior::Refuse);
        let err = dial(&connector, "10.0.0.1:80", &policy(5)).await.unwrap_err();

        assert_eq!(connector.attempts(), 1);
        assert!(matches!(err, DialError::Failed { .. }));
        assert_eq!(err.status(), StatusToken::DialError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_timeouts() {
        let connector = MockConnector::new(Behavior::SucceedOn(3));
        assert!(dial(&connector, "10.0.0.1:80", &policy(3)).await.is_ok());
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = dial(&TcpConnector, &addr, &policy(3)).await.unwrap_err();
        assert_eq!(err.status(), StatusToken::DialError);
    }
}
