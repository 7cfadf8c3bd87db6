//! Decoder for the `application/vnd.amazon.eventstream` framing used by
//! `converse-stream` responses.
//!
//! Each frame is laid out as:
//!
//! ```text
//! [total length: u32][headers length: u32][prelude crc: u32]
//! [headers ...][payload ...][message crc: u32]
//! ```
//!
//! All integers are big-endian and both CRCs are CRC-32 (IEEE). Frames may be split
//! across or packed into network reads arbitrarily, so the decoder buffers bytes
//! until a whole frame is available.

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};

use crate::error::{GatewayError, Result};
use crate::translate::bedrock_types::ConverseStreamEvent;

const PRELUDE_LEN: usize = 12;
const MESSAGE_CRC_LEN: usize = 4;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + MESSAGE_CRC_LEN;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

const TYPE_BOOL_TRUE: u8 = 0;
const TYPE_BOOL_FALSE: u8 = 1;
const TYPE_BYTE: u8 = 2;
const TYPE_INT16: u8 = 3;
const TYPE_INT32: u8 = 4;
const TYPE_INT64: u8 = 5;
const TYPE_BYTES: u8 = 6;
const TYPE_STRING: u8 = 7;
const TYPE_TIMESTAMP: u8 = 8;
const TYPE_UUID: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Bytes(Bytes),
    String(String),
    /// Milliseconds since the epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: HeaderValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub headers: Vec<Header>,
    pub payload: Bytes,
}

impl Message {
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|h| match h.value {
            HeaderValue::String(ref s) if h.name == name => Some(s.as_str()),
            _ => None,
        })
    }

    /// Interpret the frame as a Converse stream event.
    ///
    /// Returns `Ok(None)` for event types the gateway does not translate.
    ///
    /// # Errors
    /// Returns `GatewayError::Backend` for exception/error frames or malformed payloads.
    pub fn into_event(self) -> Result<Option<ConverseStreamEvent>> {
        match self.header_str(":message-type") {
            Some("event") => {
                let event_type = self.header_str(":event-type").unwrap_or_default();
                ConverseStreamEvent::from_typed_payload(event_type, &self.payload).map_err(|e| {
                    GatewayError::backend(format!("Malformed {event_type} event: {e}"))
                })
            }
            Some("exception") => {
                let exception_type = self.header_str(":exception-type").unwrap_or("exception");
                let message = serde_json::from_slice::<serde_json::Value>(&self.payload)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                    .unwrap_or_else(|| String::from_utf8_lossy(&self.payload).into_owned());
                Err(GatewayError::backend(format!("{exception_type}: {message}")))
            }
            Some("error") => {
                let code = self.header_str(":error-code").unwrap_or("error");
                let message = self.header_str(":error-message").unwrap_or_default();
                Err(GatewayError::backend(format!("{code}: {message}")))
            }
            other => {
                tracing::debug!(message_type = ?other, "Skipping event-stream frame");
                Ok(None)
            }
        }
    }
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buffer: BytesMut,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet forming a complete frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// # Errors
    /// Returns `GatewayError::Backend` when a frame is corrupt. The stream cannot be
    /// resynchronized after that.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let mut prelude = &self.buffer[..PRELUDE_LEN];
        let total_len = prelude.get_u32() as usize;
        let headers_len = prelude.get_u32() as usize;
        let prelude_crc = prelude.get_u32();

        if crc32fast::hash(&self.buffer[..8]) != prelude_crc {
            return Err(malformed("prelude checksum mismatch"));
        }
        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total_len) {
            return Err(malformed(format!("invalid frame length {total_len}")));
        }
        if headers_len > total_len - MIN_MESSAGE_LEN {
            return Err(malformed(format!("invalid headers length {headers_len}")));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let frame = self.buffer.split_to(total_len).freeze();
        let body_end = total_len - MESSAGE_CRC_LEN;
        let message_crc = (&frame[body_end..]).get_u32();
        if crc32fast::hash(&frame[..body_end]) != message_crc {
            return Err(malformed("message checksum mismatch"));
        }

        let headers_end = PRELUDE_LEN + headers_len;
        let headers = parse_headers(&frame[PRELUDE_LEN..headers_end])?;
        let payload = frame.slice(headers_end..body_end);

        Ok(Some(Message { headers, payload }))
    }
}

fn malformed(detail: impl std::fmt::Display) -> GatewayError {
    GatewayError::backend(format!("Malformed event stream: {detail}"))
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(malformed("truncated header"));
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn parse_headers(mut buf: &[u8]) -> Result<Vec<Header>> {
    let mut headers = Vec::new();

    while !buf.is_empty() {
        let name_len = take(&mut buf, 1)?[0] as usize;
        let name = std::str::from_utf8(take(&mut buf, name_len)?)
            .map_err(|_| malformed("header name is not UTF-8"))?
            .to_string();
        let value_type = take(&mut buf, 1)?[0];

        let value = match value_type {
            TYPE_BOOL_TRUE => HeaderValue::Bool(true),
            TYPE_BOOL_FALSE => HeaderValue::Bool(false),
            TYPE_BYTE => HeaderValue::Byte(take(&mut buf, 1)?.get_i8()),
            TYPE_INT16 => HeaderValue::Int16(take(&mut buf, 2)?.get_i16()),
            TYPE_INT32 => HeaderValue::Int32(take(&mut buf, 4)?.get_i32()),
            TYPE_INT64 => HeaderValue::Int64(take(&mut buf, 8)?.get_i64()),
            TYPE_BYTES => {
                let len = take(&mut buf, 2)?.get_u16() as usize;
                HeaderValue::Bytes(Bytes::copy_from_slice(take(&mut buf, len)?))
            }
            TYPE_STRING => {
                let len = take(&mut buf, 2)?.get_u16() as usize;
                let value = std::str::from_utf8(take(&mut buf, len)?)
                    .map_err(|_| malformed("header value is not UTF-8"))?;
                HeaderValue::String(value.to_string())
            }
            TYPE_TIMESTAMP => HeaderValue::Timestamp(take(&mut buf, 8)?.get_i64()),
            TYPE_UUID => {
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(take(&mut buf, 16)?);
                HeaderValue::Uuid(uuid)
            }
            other => return Err(malformed(format!("unknown header type {other}"))),
        };

        headers.push(Header { name, value });
    }

    Ok(headers)
}

/// Decode a byte stream of frames into Converse stream events.
///
/// Ends after yielding the first error. A body that stops mid-frame is reported
/// as an error.
pub fn decode_events<S, E>(bytes: S) -> impl Stream<Item = Result<ConverseStreamEvent>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<GatewayError> + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = MessageDecoder::new();
        tokio::pin!(bytes);

        'read: while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => decoder.push(&chunk),
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }

            loop {
                match decoder.next_message() {
                    Ok(Some(message)) => match message.into_event() {
                        Ok(Some(event)) => yield Ok(event),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Ok(None) => continue 'read,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if decoder.buffered() > 0 {
            yield Err(malformed(format!(
                "stream ended with {} undecoded bytes",
                decoder.buffered()
            )));
        }
    }
}
