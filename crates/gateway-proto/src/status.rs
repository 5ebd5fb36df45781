//! Status tokens written to the client socket

use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Outcome of the handshake/dial phase, sent as exactly 3 ASCII digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusToken {
    /// Handshake, dial and bootstrap succeeded; relay begins
    Ok,
    /// Malformed, short or unreadable handshake frame
    BadRequest,
    /// Frame payload failed to decode or decrypt
    BadAddress,
    /// Non-retryable dial failure, or backend bootstrap failed
    DialError,
    /// Every dial attempt timed out
    DialTimeout,
}

impl StatusToken {
    pub const ALL: [StatusToken; 5] = [
        StatusToken::Ok,
        StatusToken::BadRequest,
        StatusToken::BadAddress,
        StatusToken::DialError,
        StatusToken::DialTimeout,
    ];

    /// Wire bytes of this token
    pub const fn as_bytes(self) -> &'static [u8; 3] {
        match self {
            StatusToken::Ok => b"200",
            StatusToken::BadRequest => b"400",
            StatusToken::BadAddress => b"401",
            StatusToken::DialError => b"502",
            StatusToken::DialTimeout => b"503",
        }
    }

    pub const fn code(self) -> u16 {
        match self {
            StatusToken::Ok => 200,
            StatusToken::BadRequest => 400,
            StatusToken::BadAddress => 401,
            StatusToken::DialError => 502,
            StatusToken::DialTimeout => 503,
        }
    }

    pub fn from_bytes(bytes: &[u8; 3]) -> Option<Self> {
        Self::ALL.into_iter().find(|token| token.as_bytes() == bytes)
    }

    /// Read one token from the gateway (client side)
    pub async fn read_from<R>(reader: &mut R) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = [0u8; 3];
        reader.read_exact(&mut bytes).await?;
        Self::from_bytes(&bytes).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown status token {:?}", String::from_utf8_lossy(&bytes)),
            )
        })
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
