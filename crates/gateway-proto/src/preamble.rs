//! Preamble sent to the backend ahead of relayed traffic
//!
//! One length byte followed by the client's remote address ("ip:port"), so the
//! backend learns the real origin of the connection.

use crate::MAX_PREAMBLE_ADDR_LEN;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum PreambleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Client address is {0} bytes, preamble allows at most {max}", max = MAX_PREAMBLE_ADDR_LEN)]
    AddressTooLong(usize),

    #[error("Client address is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    client_addr: String,
}

impl Preamble {
    /// Oversized addresses are rejected rather than truncated
    pub fn new(client_addr: impl Into<String>) -> Result<Self, PreambleError> {
        let client_addr = client_addr.into();
        if client_addr.len() > MAX_PREAMBLE_ADDR_LEN {
            return Err(PreambleError::AddressTooLong(client_addr.len()));
        }
        Ok(Self { client_addr })
    }

    pub fn client_addr(&self) -> &str {
        &self.client_addr
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.client_addr.len());
        out.push(self.client_addr.len() as u8);
        out.extend_from_slice(self.client_addr.as_bytes());
        out
    }

    /// Parse the preamble on the backend side
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, PreambleError>
    where
        R: AsyncRead + Unpin,
    {
        let len = reader.read_u8().await? as usize;
        let mut addr = vec![0u8; len];
        reader.read_exact(&mut addr).await?;
        let client_addr = String::from_utf8(addr).map_err(|_| PreambleError::InvalidUtf8)?;
        Ok(Self { client_addr })
    }
}
