//! Codec for encoding and decoding IRC lines.
//!
//! Lines are terminated by CRLF on output. On input a bare LF is accepted,
//! blank lines are skipped, and invalid UTF-8 is replaced rather than rejected.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::message::IrcMessage;

/// Maximum outbound line length, CRLF included.
pub const MAX_LINE_LENGTH: usize = 512;

/// Maximum inbound line length. Leaves room for IRCv3 message tags.
pub const MAX_INBOUND_LINE_LENGTH: usize = 16 * 1024;

/// Line terminator.
const CRLF: &[u8] = b"\r\n";

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Line exceeds the allowed length.
    #[error("Line length {0} exceeds maximum {1}")]
    LineTooLong(usize, usize),

    /// Message contains CR, LF or NUL inside a parameter.
    #[error("Message contains a line break or NUL: {0}")]
    ForbiddenCharacter(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a message to bytes, CRLF included.
///
/// # Errors
///
/// Returns an error if the line is too long or contains forbidden characters.
pub fn encode(message: &IrcMessage) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a message into an existing buffer.
///
/// # Errors
///
/// Returns an error if the line is too long or contains forbidden characters.
pub fn encode_into(message: &IrcMessage, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    if message.has_forbidden_chars() {
        return Err(ProtocolError::ForbiddenCharacter(message.command.clone()));
    }

    let line = message.to_string();
    let total = line.len() + CRLF.len();
    if total > MAX_LINE_LENGTH {
        return Err(ProtocolError::LineTooLong(total, MAX_LINE_LENGTH));
    }

    buf.reserve(total);
    buf.put_slice(line.as_bytes());
    buf.put_slice(CRLF);
    Ok(())
}

/// Try to decode a message from a buffer, advancing it past consumed lines.
///
/// Returns `Ok(Some(message))` for a complete line, `Ok(None)` if more data is
/// needed. Blank or unparsable lines are consumed and skipped.
///
/// # Errors
///
/// Returns an error if a pending line exceeds [`MAX_INBOUND_LINE_LENGTH`].
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<IrcMessage>, ProtocolError> {
    loop {
        let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
            if buf.len() > MAX_INBOUND_LINE_LENGTH {
                return Err(ProtocolError::LineTooLong(buf.len(), MAX_INBOUND_LINE_LENGTH));
            }
            return Ok(None);
        };

        let line = buf.split_to(newline + 1);
        let text = String::from_utf8_lossy(&line);
        match IrcMessage::parse(&text) {
            Some(message) => return Ok(Some(message)),
            None => trace!(line = %text.trim_end(), "Skipping unparsable line"),
        }
    }
}

/// Streaming codec for use with `tokio_util::codec::Framed`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IrcCodec;

impl IrcCodec {
    /// Create a new codec instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for IrcCodec {
    type Item = IrcMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_from(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = decode_from(src)? {
            return Ok(Some(message));
        }
        // A final line without a terminator still counts.
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        let text = String::from_utf8_lossy(rest.chunk());
        Ok(IrcMessage::parse(&text))
    }
}

impl Encoder<IrcMessage> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: IrcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, dst)
    }
}
