//! Incremental request body decoder.
//!
//! The decoder never performs I/O.  The session feeds it the bytes it has
//! read so far and it hands back body data one slice at a time, so an upload
//! can be streamed to disk without holding the whole body in memory.

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::error::ProtocolError;
use crate::protocol::request::RequestHead;

/// Upper bound for a chunk-size or trailer line.
const MAX_CHUNK_LINE: usize = 4096;

/// Result of one [`BodyDecoder::decode`] step.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A slice of body payload.
    Data(Bytes),
    /// The buffer holds no further decodable bytes; read more.
    NeedMore,
    /// The body is complete.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataCrlf,
    Trailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length { remaining: u64 },
    Chunked(ChunkState),
    Done,
}

/// Body framing state machine for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDecoder {
    framing: Framing,
    declared: Option<u64>,
}

impl BodyDecoder {
    /// Picks the framing from the request head.
    ///
    /// `Transfer-Encoding: chunked` wins over `Content-Length`; with neither
    /// the body is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] for unsupported codings or invalid lengths.
    pub fn for_head(head: &RequestHead) -> Result<Self, ProtocolError> {
        if head.is_chunked()? {
            return Ok(Self::chunked());
        }
        Ok(match head.content_length()? {
            Some(length) => Self::length(length),
            None => Self::empty(),
        })
    }

    /// A body of exactly `length` bytes.
    pub fn length(length: u64) -> Self {
        let framing = if length == 0 {
            Framing::Done
        } else {
            Framing::Length { remaining: length }
        };
        Self {
            framing,
            declared: Some(length),
        }
    }

    /// A chunked body of unknown length.
    pub fn chunked() -> Self {
        Self {
            framing: Framing::Chunked(ChunkState::Size),
            declared: None,
        }
    }

    /// No body at all.
    pub fn empty() -> Self {
        Self::length(0)
    }

    /// Length announced by `Content-Length`, if the body is length-delimited.
    pub fn declared_length(&self) -> Option<u64> {
        self.declared
    }

    pub fn is_done(&self) -> bool {
        self.framing == Framing::Done
    }

    /// Consumes framing and payload bytes from the front of `buf`.
    ///
    /// Bytes belonging to the body are removed from `buf`; anything past the
    /// end of the body is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedChunk`] when chunk framing is broken.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Decoded, ProtocolError> {
        loop {
            match self.framing {
                Framing::Done => return Ok(Decoded::Done),
                Framing::Length { remaining } => {
                    if buf.is_empty() {
                        return Ok(Decoded::NeedMore);
                    }
                    let data = take_data(buf, remaining);
                    let left = remaining - data.len() as u64;
                    self.framing = if left == 0 {
                        Framing::Done
                    } else {
                        Framing::Length { remaining: left }
                    };
                    return Ok(Decoded::Data(data));
                }
                Framing::Chunked(ChunkState::Size) => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(Decoded::NeedMore);
                    };
                    let size = parse_chunk_size(&line)?;
                    self.framing = Framing::Chunked(if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data { remaining: size }
                    });
                }
                Framing::Chunked(ChunkState::Data { remaining }) => {
                    if buf.is_empty() {
                        return Ok(Decoded::NeedMore);
                    }
                    let data = take_data(buf, remaining);
                    let left = remaining - data.len() as u64;
                    self.framing = Framing::Chunked(if left == 0 {
                        ChunkState::DataCrlf
                    } else {
                        ChunkState::Data { remaining: left }
                    });
                    return Ok(Decoded::Data(data));
                }
                Framing::Chunked(ChunkState::DataCrlf) => {
                    if buf.len() < 2 {
                        return Ok(Decoded::NeedMore);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(ProtocolError::MalformedChunk(
                            "missing CRLF after chunk data".to_string(),
                        ));
                    }
                    buf.advance(2);
                    self.framing = Framing::Chunked(ChunkState::Size);
                }
                Framing::Chunked(ChunkState::Trailer) => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(Decoded::NeedMore);
                    };
                    // Trailer fields are discarded; an empty line ends the body.
                    if line.is_empty() {
                        self.framing = Framing::Done;
                    }
                }
            }
        }
    }
}

fn take_data(buf: &mut BytesMut, remaining: u64) -> Bytes {
    let take = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
    buf.split_to(take).freeze()
}

/// Removes one CRLF-terminated line from `buf`, without the terminator.
fn take_line(buf: &mut BytesMut) -> Result<Option<BytesMut>, ProtocolError> {
    match buf.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = buf.split_to(pos);
            buf.advance(2);
            Ok(Some(line))
        }
        None if buf.len() > MAX_CHUNK_LINE => Err(ProtocolError::MalformedChunk(
            "chunk line too long".to_string(),
        )),
        None => Ok(None),
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::MalformedChunk("chunk size is not ASCII".to_string()))?;
    // Chunk extensions follow a ';' and are ignored.
    let digits = text.split(';').next().unwrap_or_default().trim();
    if digits.is_empty() || digits.len() > 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::MalformedChunk(format!(
            "invalid chunk size {digits:?}"
        )));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProtocolError::MalformedChunk(format!("invalid chunk size: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs the decoder over `input` fed in `step`-sized pieces and returns the
    /// concatenated payload.
    fn decode_all(mut decoder: BodyDecoder, input: &[u8], step: usize) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        let mut chunks = input.chunks(step);
        loop {
            match decoder.decode(&mut buf).expect("body must decode") {
                Decoded::Data(data) => out.extend_from_slice(&data),
                Decoded::Done => return out,
                Decoded::NeedMore => match chunks.next() {
                    Some(piece) => buf.extend_from_slice(piece),
                    None => panic!("input ended before body was complete"),
                },
            }
        }
    }

    #[test]
    fn test_empty_body_is_done_immediately() {
        let mut decoder = BodyDecoder::empty();
        let mut buf = BytesMut::from(&b"leftover"[..]);

        assert_eq!(decoder.decode(&mut buf), Ok(Decoded::Done));
        assert_eq!(&buf[..], b"leftover");
    }

    #[test]
    fn test_length_body_stops_at_declared_length() {
        // Arrange
        let mut decoder = BodyDecoder::length(5);
        let mut buf = BytesMut::from(&b"hello world"[..]);

        // Act
        let first = decoder.decode(&mut buf).unwrap();
        let second = decoder.decode(&mut buf).unwrap();

        // Assert
        assert_eq!(first, Decoded::Data(Bytes::from_static(b"hello")));
        assert_eq!(second, Decoded::Done);
        assert_eq!(&buf[..], b" world");
    }

    #[test]
    fn test_length_body_across_small_reads() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let out = decode_all(BodyDecoder::length(payload.len() as u64), &payload, 7);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_chunked_body_with_extension_and_trailer() {
        let input = b"5;name=x\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: 1\r\n\r\n";
        let out = decode_all(BodyDecoder::chunked(), input, 3);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_chunked_body_byte_by_byte() {
        let input = b"a\r\n0123456789\r\n0\r\n\r\n";
        let out = decode_all(BodyDecoder::chunked(), input, 1);
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn test_chunked_missing_crlf_is_error() {
        let mut decoder = BodyDecoder::chunked();
        let mut buf = BytesMut::from(&b"3\r\nabcXX"[..]);

        assert!(matches!(decoder.decode(&mut buf), Ok(Decoded::Data(_))));
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ProtocolError::MalformedChunk(_))
        ));
    }

    #[test]
    fn test_chunked_invalid_size_is_error() {
        let mut decoder = BodyDecoder::chunked();
        let mut buf = BytesMut::from(&b"zz\r\n"[..]);
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn test_for_head_prefers_chunked() {
        let head = RequestHead::parse(
            b"POST / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap();

        let decoder = BodyDecoder::for_head(&head).unwrap();

        assert_eq!(decoder.declared_length(), None);
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_for_head_without_framing_is_empty() {
        let head = RequestHead::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let decoder = BodyDecoder::for_head(&head).unwrap();
        assert!(decoder.is_done());
        assert_eq!(decoder.declared_length(), Some(0));
    }
}
