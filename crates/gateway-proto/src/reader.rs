//! Read-ahead reader over a caller-owned buffer
//!
//! The buffer is borrowed, not owned, so the server can hand it back to its
//! pool once the handshake is parsed. Bytes read past the frame boundary stay
//! in the buffer and are exposed through [`BufferedReader::buffered`].

use crate::FrameError;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

pub struct BufferedReader<'a, R> {
    inner: &'a mut R,
    buf: &'a mut BytesMut,
    limit: usize,
    consumed_any: bool,
}

impl<'a, R> BufferedReader<'a, R>
where
    R: AsyncRead + Unpin,
{
    /// `limit` bounds how much may be buffered while searching for a line end.
    pub fn new(inner: &'a mut R, buf: &'a mut BytesMut, limit: usize) -> Self {
        Self {
            inner,
            buf,
            limit: limit.max(1),
            consumed_any: false,
        }
    }

    /// Read more bytes from the underlying stream; `Ok(0)` on EOF.
    ///
    /// A single read never takes the buffer past `limit`, whatever spare
    /// capacity a reused buffer happens to carry.
    async fn fill(&mut self) -> Result<usize, FrameError> {
        let want = self.limit.saturating_sub(self.buf.len()).max(1);
        self.buf.reserve(want);
        let n = AsyncReadExt::take(&mut *self.inner, want as u64)
            .read_buf(&mut *self.buf)
            .await?;
        Ok(n)
    }

    async fn ensure(&mut self, n: usize) -> Result<(), FrameError> {
        while self.buf.len() < n {
            if self.fill().await? == 0 {
                return Err(if self.buf.is_empty() && !self.consumed_any {
                    FrameError::Closed
                } else {
                    FrameError::UnexpectedEof
                });
            }
        }
        Ok(())
    }

    /// Look at the next byte without consuming it
    pub async fn peek_byte(&mut self) -> Result<u8, FrameError> {
        self.ensure(1).await?;
        Ok(self.buf[0])
    }

    pub async fn read_byte(&mut self) -> Result<u8, FrameError> {
        self.ensure(1).await?;
        self.consumed_any = true;
        Ok(self.buf.get_u8())
    }

    /// Read exactly `n` bytes
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, FrameError> {
        self.ensure(n).await?;
        let out = self.buf[..n].to_vec();
        self.buf.advance(n);
        self.consumed_any = true;
        Ok(out)
    }

    /// Read up to and including the next `\n`
    pub async fn read_line(&mut self) -> Result<Vec<u8>, FrameError> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos + 1;
                let line = self.buf[..end].to_vec();
                self.buf.advance(end);
                self.consumed_any = true;
                return Ok(line);
            }
            scanned = self.buf.len();

            if scanned >= self.limit {
                return Err(FrameError::LineTooLong(self.limit));
            }

            if self.fill().await? == 0 {
                return Err(if self.buf.is_empty() && !self.consumed_any {
                    FrameError::Closed
                } else {
                    FrameError::UnexpectedEof
                });
            }
        }
    }

    /// Bytes already read ahead but not consumed (peek, no copy)
    pub fn buffered(&self) -> &[u8] {
        &self.buf[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let mut input: &[u8] = b"abc";
        let mut buf = BytesMut::new();
        let mut reader = BufferedReader::new(&mut input, &mut buf, 64);

        assert_eq!(reader.peek_byte().await.unwrap(), b'a');
        assert_eq!(reader.read_byte().await.unwrap(), b'a');
        assert_eq!(reader.read_exact(2).await.unwrap(), b"bc");
    }

    #[tokio::test]
    async fn test_read_line_keeps_leftover() {
        let mut input: &[u8] = b"hello\nworld";
        let mut buf = BytesMut::new();
        let mut reader = BufferedReader::new(&mut input, &mut buf, 64);

        assert_eq!(reader.read_line().await.unwrap(), b"hello\n");
        assert_eq!(reader.buffered(), b"world");
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let mut input: &[u8] = b"0123456789abcdef";
        let mut buf = BytesMut::new();
        let mut reader = BufferedReader::new(&mut input, &mut buf, 8);

        assert!(matches!(
            reader.read_line().await,
            Err(FrameError::LineTooLong(8))
        ));
    }

    #[tokio::test]
    async fn test_line_limit_ignores_spare_capacity() {
        let mut line = vec![b'A'; 100];
        line.push(b'\n');
        let mut input: &[u8] = &line;
        let mut buf = BytesMut::with_capacity(8192);
        let mut reader = BufferedReader::new(&mut input, &mut buf, 16);

        assert!(matches!(
            reader.read_line().await,
            Err(FrameError::LineTooLong(16))
        ));
        assert_eq!(reader.buffered().len(), 16);
    }

    #[tokio::test]
    async fn test_eof_before_any_byte_is_closed() {
        let mut input: &[u8] = b"";
        let mut buf = BytesMut::new();
        let mut reader = BufferedReader::new(&mut input, &mut buf, 8);

        assert!(matches!(reader.read_byte().await, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_short_read_is_unexpected_eof() {
        let mut input: &[u8] = b"\x05ab";
        let mut buf = BytesMut::new();
        let mut reader = BufferedReader::new(&mut input, &mut buf, 64);

        assert_eq!(reader.read_byte().await.unwrap(), 5);
        assert!(matches!(
            reader.read_exact(5).await,
            Err(FrameError::UnexpectedEof)
        ));
    }
}
