//! Handshake decoding: frame, then decrypt the destination address

use gateway_cipher::{AddressCipher, CipherError};
use gateway_proto::{BufferedReader, Frame, FrameError, StatusToken};
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Failed to read handshake frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Failed to decrypt destination address: {0}")]
    Address(#[from] CipherError),

    #[error("Destination address is not valid UTF-8")]
    NotUtf8,
}

impl HandshakeError {
    /// Token owed to the client, or `None` when it left before sending anything
    pub fn status(&self) -> Option<StatusToken> {
        match self {
            HandshakeError::Frame(e) if e.is_closed() => None,
            HandshakeError::Frame(_) => Some(StatusToken::BadRequest),
            HandshakeError::Address(_) | HandshakeError::NotUtf8 => Some(StatusToken::BadAddress),
        }
    }
}

#[derive(Debug)]
pub struct HandshakeResult<'a> {
    pub destination: String,
    pub binary: bool,
    /// Client bytes read past the frame; forwarded to the agent first
    pub leftover: &'a [u8],
}

/// Read one frame from `reader` and decrypt the destination it carries.
///
/// The returned `leftover` borrows the reader's buffer; nothing is consumed
/// past the frame boundary.
pub async fn decode_handshake<'r, R>(
    reader: &'r mut BufferedReader<'_, R>,
    cipher: &dyn AddressCipher,
) -> Result<HandshakeResult<'r>, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let frame = Frame::read_from(reader).await?;

    let plaintext = match &frame {
        Frame::Binary(ciphertext) => cipher.decrypt(ciphertext)?,
        Frame::Text(line) => cipher.decrypt_base64(line)?,
    };
    let destination = String::from_utf8(plaintext).map_err(|_| HandshakeError::NotUtf8)?;

    let leftover = reader.buffered();
    debug!(
        binary = frame.is_binary(),
        leftover = leftover.len(),
        "Decoded handshake"
    );

    Ok(HandshakeResult {
        destination,
        binary: frame.is_binary(),
        leftover,
    })
}
