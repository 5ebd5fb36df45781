//! Handshake frames carrying the encrypted destination address

use crate::{BufferedReader, BINARY_MARKER, MAX_CIPHERTEXT_LEN};
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::trace;

/// Frame errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed before handshake")]
    Closed,

    #[error("Unexpected end of stream inside handshake frame")]
    UnexpectedEof,

    #[error("Handshake line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("Ciphertext too large for a binary frame: {0} bytes")]
    CiphertextTooLong(usize),

    #[error("Invalid text frame: {0}")]
    InvalidText(&'static str),
}

impl FrameError {
    /// True when the peer went away before sending a single byte
    pub fn is_closed(&self) -> bool {
        matches!(self, FrameError::Closed)
    }
}

/// Wire encoding of an encrypted destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Length-prefixed raw ciphertext
    Binary(Vec<u8>),
    /// Base64 ciphertext line, without the trailing `\n`
    Text(Vec<u8>),
}

impl Frame {
    /// Build a binary frame; the ciphertext must fit in one length byte
    pub fn binary(ciphertext: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        let frame = Frame::Binary(ciphertext.into());
        frame.validate()?;
        Ok(frame)
    }

    /// Build a text frame from a base64 line
    pub fn text(line: impl Into<String>) -> Result<Self, FrameError> {
        let frame = Frame::Text(line.into().into_bytes());
        frame.validate()?;
        Ok(frame)
    }

    /// Check the frame can be written without losing its boundary
    fn validate(&self) -> Result<(), FrameError> {
        match self {
            Frame::Binary(ciphertext) => {
                if ciphertext.len() > MAX_CIPHERTEXT_LEN {
                    return Err(FrameError::CiphertextTooLong(ciphertext.len()));
                }
            }
            Frame::Text(line) => match line.first() {
                None => return Err(FrameError::InvalidText("empty line")),
                Some(&BINARY_MARKER) => {
                    return Err(FrameError::InvalidText("line starts with the binary marker"))
                }
                Some(_) if line.contains(&b'\n') => {
                    return Err(FrameError::InvalidText("line contains a newline"))
                }
                Some(_) => {}
            },
        }
        Ok(())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }

    /// Encode for the wire. Variants built directly are checked here too, so an
    /// oversized ciphertext is rejected rather than given a wrapped length byte.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        self.validate()?;
        let out = match self {
            Frame::Binary(ciphertext) => {
                let mut out = Vec::with_capacity(2 + ciphertext.len());
                out.push(BINARY_MARKER);
                out.push(ciphertext.len() as u8);
                out.extend_from_slice(ciphertext);
                out
            }
            Frame::Text(line) => {
                let mut out = Vec::with_capacity(line.len() + 1);
                out.extend_from_slice(line);
                out.push(b'\n');
                out
            }
        };
        Ok(out)
    }

    /// Read one frame. The first byte selects the framing; for text frames it
    /// is left in place and becomes part of the line.
    pub async fn read_from<R>(reader: &mut BufferedReader<'_, R>) -> Result<Self, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        if reader.peek_byte().await? == BINARY_MARKER {
            reader.read_byte().await?;
            let len = reader.read_byte().await? as usize;
            let ciphertext = reader.read_exact(len).await?;
            trace!(len, "Read binary handshake frame");
            return Ok(Frame::Binary(ciphertext));
        }

        let mut line = reader.read_line().await?;
        line.pop();
        trace!(len = line.len(), "Read text handshake frame");
        Ok(Frame::Text(line))
    }
}
