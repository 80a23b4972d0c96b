//! Async adapter that drives a [`BodyDecoder`] from a stream.

use audioserver_core::{BodyDecoder, Decoded};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::infrastructure::error::SessionError;

/// Bytes reserved in the read buffer before each socket read.
pub const READ_CHUNK: usize = 16 * 1024;

/// Reads one request body.  Bytes already buffered after the head are
/// consumed first.
pub struct BodyReader<'a, S> {
    stream: &'a mut S,
    buf: &'a mut BytesMut,
    decoder: BodyDecoder,
}

impl<'a, S> BodyReader<'a, S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(stream: &'a mut S, buf: &'a mut BytesMut, decoder: BodyDecoder) -> Self {
        Self {
            stream,
            buf,
            decoder,
        }
    }

    /// Next slice of body payload, or `None` once the body is complete.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnexpectedEof`] if the peer closes mid-body, or the
    /// underlying I/O or framing error.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, SessionError> {
        loop {
            match self.decoder.decode(&mut *self.buf)? {
                Decoded::Data(data) => return Ok(Some(data)),
                Decoded::Done => return Ok(None),
                Decoded::NeedMore => {
                    self.buf.reserve(READ_CHUNK);
                    if self.stream.read_buf(&mut *self.buf).await? == 0 {
                        return Err(SessionError::UnexpectedEof);
                    }
                }
            }
        }
    }

    /// Reads the whole body into memory.
    ///
    /// A declared `Content-Length` over `limit` is rejected before anything
    /// is read.
    ///
    /// # Errors
    ///
    /// [`SessionError::BodyTooLarge`] when the body exceeds `limit`.
    pub async fn read_to_end(&mut self, limit: usize) -> Result<Vec<u8>, SessionError> {
        if self
            .decoder
            .declared_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(SessionError::BodyTooLarge { limit });
        }
        let mut body = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(SessionError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
