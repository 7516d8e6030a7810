//! Newline-delimited JSON framing
//!
//! Every message occupies one line of UTF-8 JSON terminated by `\n`. A trailing
//! `\r` is tolerated and blank lines are skipped. Frames that fail to parse are
//! yielded as `Err` items rather than decoder errors, so a `FramedRead` keeps
//! delivering the frames that follow a bad one.

use std::cmp;

use bytes::{ Buf, BufMut, BytesMut };
use tokio_util::codec::{ Decoder, Encoder };
use tracing::warn;

use crate::errors::Error;
use crate::messages::Message;

/// Largest frame accepted before the decoder starts discarding input
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4 * 1024 * 1024;

/// Codec turning byte streams into [`Message`] frames and back
#[derive(Debug, Clone)]
pub struct MessageCodec {
    /// Upper bound on a single frame, excluding the terminator
    max_frame_length: usize,
    /// Offset up to which the buffer has already been scanned for `\n`
    next_index: usize,
    /// Set while skipping the remainder of an oversized frame
    discarding: bool,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            max_frame_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &line[start..end]
}

/// Parse a single frame (without its terminator) into a message
pub fn decode(frame: &[u8]) -> Result<Message, Error> {
    let value: serde_json::Value = serde_json
        ::from_slice(frame)
        .map_err(|e| Error::MalformedMessage {
            id: None,
            reason: format!("invalid JSON: {}", e),
        })?;
    Message::from_value(value)
}

/// Serialize a message into a single line, without the terminator
pub fn encode(message: &Message) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(message)?)
}

impl Decoder for MessageCodec {
    type Item = Result<Message, Error>;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Scan no further than one byte past the limit
            let read_to = cmp::min(self.max_frame_length.saturating_add(1), buf.len());
            let newline = buf[self.next_index..read_to].iter().position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    // Drop the tail of the oversized frame and resume normal decoding
                    buf.advance(offset + self.next_index + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let newline_index = offset + self.next_index;
                    self.next_index = 0;
                    let frame = buf.split_to(newline_index + 1);
                    let line = trim_line(&frame[..newline_index]);
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(decode(line)));
                }
                (false, None) if buf.len() > self.max_frame_length => {
                    warn!("Discarding frame larger than {} bytes", self.max_frame_length);
                    self.discarding = true;
                    return Ok(
                        Some(
                            Err(Error::MalformedMessage {
                                id: None,
                                reason: format!(
                                    "frame exceeds maximum length of {} bytes",
                                    self.max_frame_length
                                ),
                            })
                        )
                    );
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        // A final frame without a terminator is still a frame
        self.next_index = 0;
        if self.discarding || trim_line(buf).is_empty() {
            self.discarding = false;
            buf.clear();
            return Ok(None);
        }
        let frame = buf.split_to(buf.len());
        Ok(Some(decode(trim_line(&frame))))
    }
}

impl<'a> Encoder<&'a Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, message: &'a Message, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = encode(message)?;
        buf.reserve(bytes.len() + 1);
        buf.put_slice(&bytes);
        buf.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ ErrorData, Notification, Request, RequestId, Response };
    use serde_json::{ Value, json };

    fn frame(message: &Message) -> BytesMut {
        let mut buf = BytesMut::new();
        MessageCodec::new().encode(message, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_encoded_frame_is_one_line() {
        let message = Message::Request(
            Request::new(1, "tools/call", Some(json!({"name": "echo", "arguments": {"text": "a\nb"}})))
        );
        let buf = frame(&message);
        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(buf.last(), Some(&b'\n'));
    }

    #[test]
    fn test_roundtrip_preserves_messages() {
        let error = |data: Option<Value>| ErrorData {
            code: -32000,
            message: "x".to_string(),
            data,
        };
        let messages = vec![
            Message::Request(Request::new("req-1", "ping", None)),
            Message::Request(Request::new(RequestId::Number(7), "tools/call", Some(Value::Null))),
            Message::Request(Request::new(RequestId::Number(-3), "tools/list", Some(json!({})))),
            Message::Response(Response::success(RequestId::Number(4), json!({"tools": []}))),
            Message::Response(Response::success(RequestId::from("abc"), Value::Null)),
            Message::Response(Response::error(RequestId::Number(1), error(None))),
            Message::Response(Response::error(RequestId::Number(1), error(Some(Value::Null)))),
            Message::Response(Response::error(RequestId::from("e"), error(Some(json!({"name": "bogus"}))))),
            Message::Notification(Notification::new("notifications/cancelled", Some(json!({"requestId": 4})))),
            Message::Notification(Notification::new("notifications/initialized", None)),
            Message::Notification(Notification::new("notifications/progress", Some(Value::Null)))
        ];

        for message in messages {
            let mut buf = frame(&message);
            let decoded = MessageCodec::new().decode(&mut buf).unwrap().unwrap().unwrap();
            assert_eq!(decoded, message);
            assert_eq!(decode(&encode(&message).unwrap()).unwrap(), message);
        }
    }

    #[test]
    fn test_decodes_frames_split_across_reads() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(b"{\"jsonrpc\":\"2.0\",");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\"id\":1,\"method\":\"ping\"}\r\n\n{\"jsonrpc\":\"2.0\",\"method\":\"x\"}\n");
        let first = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(first.method(), Some("ping"));
        let second = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert!(matches!(second, Message::Notification(_)));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_bad_frame_does_not_poison_the_stream() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(
            &b"not json\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n"[..]
        );

        let bad = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(bad, Err(Error::MalformedMessage { id: None, .. })));
        let good = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(good.id(), Some(&RequestId::Number(2)));
    }

    #[test]
    fn test_oversized_frame_is_skipped() {
        let mut codec = MessageCodec::with_max_frame_length(32);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[b'x'; 40]);

        let oversized = codec.decode(&mut buf).unwrap().unwrap();
        assert!(oversized.is_err());

        buf.extend_from_slice(b"xxxx\n{\"jsonrpc\":\"2.0\",\"method\":\"n\"}\n");
        let next = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(next.method(), Some("n"));
    }

    #[test]
    fn test_unterminated_final_frame_at_eof() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":9,\"result\":null}"[..]);
        let message = codec.decode_eof(&mut buf).unwrap().unwrap().unwrap();
        assert!(matches!(message, Message::Response(_)));
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
