//! Framing for the warm process socket

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::Response;
use crate::error::{Error, ProtocolError};

const TERMINATOR: &[u8] = b"\n\n";

/// Requests end at a blank line or at EOF; responses are one JSON line
#[derive(Debug, Clone)]
pub struct WireCodec {
    max_len: usize,
    /// Bytes already searched for the terminator
    scanned: usize,
}

impl WireCodec {
    pub fn new(max_len: usize) -> Self {
        Self { max_len, scanned: 0 }
    }

    fn take_payload(&mut self, src: &mut BytesMut, len: usize, skip: usize) -> Result<String, Error> {
        let payload = src.split_to(len);
        src.advance(skip);
        self.scanned = 0;
        String::from_utf8(payload.to_vec())
            .map_err(|e| ProtocolError::InvalidJson(format!("invalid UTF-8: {}", e)).into())
    }
}

impl Decoder for WireCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        // Resume one byte early in case the terminator straddled two reads
        let from = self.scanned.saturating_sub(1);
        if let Some(pos) = src[from..]
            .windows(TERMINATOR.len())
            .position(|w| w == TERMINATOR)
        {
            return self.take_payload(src, from + pos, TERMINATOR.len()).map(Some);
        }

        if src.len() > self.max_len {
            return Err(ProtocolError::TooLarge(self.max_len).into());
        }
        self.scanned = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        let len = src.len();
        self.take_payload(src, len, 0).map(Some)
    }
}

impl Encoder<Response> for WireCodec {
    type Error = Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Error> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_waits_for_terminator() {
        let mut codec = WireCodec::new(1024);
        let mut buf = BytesMut::from(&b"{\"action\":\"ping\"}\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("{\"action\":\"ping\"}")
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_eof_flushes_remainder() {
        let mut codec = WireCodec::new(1024);
        let mut buf = BytesMut::from(&b"{\"action\":\"ping\"}"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().as_deref(),
            Some("{\"action\":\"ping\"}")
        );

        let mut blank = BytesMut::from(&b" \n"[..]);
        assert_eq!(codec.decode_eof(&mut blank).unwrap(), None);
    }

    #[test]
    fn test_oversized_request_is_rejected() {
        let mut codec = WireCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::TooLarge(8))));
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = WireCodec::new(8);
        let mut dst = BytesMut::new();
        codec.encode(Response::ok("pong"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"{\"success\":true,\"response\":\"pong\"}\n");
    }
}
