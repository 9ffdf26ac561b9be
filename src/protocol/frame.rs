//! Frame format used between two engine endpoints.
//!
//! Frames are the atomic units exchanged on a connection.  A frame
//! consists of a **start line** (`VERB stream_id`), zero or more
//! **headers**, an `End:` marker and an optional body.  All line
//! endings are CRLF.  The body length is carried in the `Length`
//! header so frames can be read back off a byte stream.
//!
//! Payload data travels base64 encoded in the body; payload metadata
//! travels base64 encoded in the `Metadata` header.
//!
//! ```text
//! REQUEST_STREAM 1\r\n
//! Request-N: 5\r\n
//! Length: 8\r\n
//! End:\r\n
//! aGVsbG8=
//! ```

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Result, RSocketError};
use crate::payload::Payload;

pub const HEADER_REQUEST_N: &str = "Request-N";
pub const HEADER_FLAGS: &str = "Flags";
pub const HEADER_METADATA: &str = "Metadata";
pub const HEADER_LENGTH: &str = "Length";
pub const HEADER_ERROR: &str = "Error";

const FLAG_NEXT: &str = "next";
const FLAG_COMPLETE: &str = "complete";

/// The frame verbs understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    RequestResponse,
    RequestFnf,
    RequestStream,
    RequestChannel,
    RequestN,
    Payload,
    Error,
    Cancel,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::RequestResponse => "REQUEST_RESPONSE",
            FrameKind::RequestFnf => "REQUEST_FNF",
            FrameKind::RequestStream => "REQUEST_STREAM",
            FrameKind::RequestChannel => "REQUEST_CHANNEL",
            FrameKind::RequestN => "REQUEST_N",
            FrameKind::Payload => "PAYLOAD",
            FrameKind::Error => "ERROR",
            FrameKind::Cancel => "CANCEL",
        }
    }

    pub fn parse(verb: &str) -> Result<Self> {
        Ok(match verb {
            "REQUEST_RESPONSE" => FrameKind::RequestResponse,
            "REQUEST_FNF" => FrameKind::RequestFnf,
            "REQUEST_STREAM" => FrameKind::RequestStream,
            "REQUEST_CHANNEL" => FrameKind::RequestChannel,
            "REQUEST_N" => FrameKind::RequestN,
            "PAYLOAD" => FrameKind::Payload,
            "ERROR" => FrameKind::Error,
            "CANCEL" => FrameKind::Cancel,
            other => {
                return Err(RSocketError::MalformedFrame(format!(
                    "unknown verb {:?}",
                    other
                )))
            }
        })
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed frame.  `headers` is case sensitive; `body` holds the
/// raw body text without the trailing length accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub stream_id: u32,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl Frame {
    pub fn new(kind: FrameKind, stream_id: u32) -> Self {
        Frame {
            kind,
            stream_id,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// A request frame carrying the initial payload.  `request_n` is
    /// only written for stream and channel requests.
    pub fn request(kind: FrameKind, stream_id: u32, payload: &Payload, request_n: Option<u64>) -> Self {
        let mut frame = Frame::new(kind, stream_id);
        if let Some(n) = request_n {
            frame.set_header(HEADER_REQUEST_N, &n.to_string());
        }
        frame.set_payload(payload);
        frame
    }

    /// A `PAYLOAD` frame.  `payload` is `None` for a bare completion.
    pub fn payload(stream_id: u32, payload: Option<&Payload>, complete: bool) -> Self {
        let mut frame = Frame::new(FrameKind::Payload, stream_id);
        let mut flags = Vec::new();
        if let Some(payload) = payload {
            flags.push(FLAG_NEXT);
            frame.set_payload(payload);
        }
        if complete {
            flags.push(FLAG_COMPLETE);
        }
        frame.set_header(HEADER_FLAGS, &flags.join(","));
        frame
    }

    pub fn request_n(stream_id: u32, n: u64) -> Self {
        let mut frame = Frame::new(FrameKind::RequestN, stream_id);
        frame.set_header(HEADER_REQUEST_N, &n.to_string());
        frame
    }

    pub fn cancel(stream_id: u32) -> Self {
        Frame::new(FrameKind::Cancel, stream_id)
    }

    pub fn error(stream_id: u32, err: &RSocketError) -> Self {
        let mut frame = Frame::new(FrameKind::Error, stream_id);
        // Header values are single line.
        frame.set_header(HEADER_ERROR, &err.to_string().replace(['\r', '\n'], " "));
        frame
    }

    /// Parse a raw frame from a string, the inverse of
    /// [`encode`](Self::encode).  Headers end at the `End:` marker;
    /// everything after it is the body.
    pub fn parse(raw: &str) -> Result<Self> {
        let (head, body) = match raw.split_once("End:\r\n") {
            Some((head, body)) => (head, body),
            None => {
                return Err(RSocketError::MalformedFrame("missing End: marker".into()))
            }
        };
        let mut lines = head.split("\r\n");
        let start_line = lines
            .next()
            .ok_or_else(|| RSocketError::MalformedFrame("missing start line".into()))?;
        let (kind, stream_id) = parse_start_line(start_line)?;
        let mut frame = Frame::new(kind, stream_id);
        for line in lines.filter(|l| !l.is_empty()) {
            frame.push_header_line(line)?;
        }
        frame.headers.remove(HEADER_LENGTH);
        if !body.is_empty() {
            frame.body = Some(body.to_string());
        }
        Ok(frame)
    }

    /// Textual representation, including the `Length` header.
    pub fn encode(&self) -> String {
        let mut out = format!("{} {}\r\n", self.kind, self.stream_id);
        let mut keys: Vec<&String> = self
            .headers
            .keys()
            .filter(|k| k.as_str() != HEADER_LENGTH)
            .collect();
        keys.sort();
        for key in keys {
            out.push_str(&format!("{}: {}\r\n", key, self.headers[key]));
        }
        let body = self.body.as_deref().unwrap_or("");
        out.push_str(&format!("{}: {}\r\n", HEADER_LENGTH, body.len()));
        out.push_str("End:\r\n");
        out.push_str(body);
        out
    }

    pub fn header(&self, key: &str) -> Option<&String> {
        self.headers.get(key)
    }

    pub fn set_header<S: Into<String>>(&mut self, key: S, value: &str) {
        self.headers.insert(key.into(), value.to_string());
    }

    pub(crate) fn push_header_line(&mut self, line: &str) -> Result<()> {
        let (key, val) = line
            .split_once(':')
            .ok_or_else(|| RSocketError::MalformedFrame(format!("bad header line {:?}", line)))?;
        self.headers.insert(key.trim().to_string(), val.trim().to_string());
        Ok(())
    }

    fn set_payload(&mut self, payload: &Payload) {
        if let Some(metadata) = payload.metadata() {
            self.set_header(HEADER_METADATA, &STANDARD.encode(metadata));
        }
        self.body = if payload.data().is_empty() {
            None
        } else {
            Some(STANDARD.encode(payload.data()))
        };
    }

    /// Decode the payload carried by this frame.
    pub fn to_payload(&self) -> Result<Payload> {
        let data = match &self.body {
            Some(body) => STANDARD.decode(body.trim())?,
            None => Vec::new(),
        };
        let metadata = match self.header(HEADER_METADATA) {
            Some(meta) => Some(STANDARD.decode(meta)?),
            None => None,
        };
        Ok(Payload::new(data, metadata))
    }

    /// The `Request-N` header; absent counts as zero.
    pub fn request_n_value(&self) -> Result<u64> {
        match self.header(HEADER_REQUEST_N) {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| RSocketError::InvalidRequestN(value.clone())),
            None => Ok(0),
        }
    }

    pub fn has_next(&self) -> bool {
        self.has_flag(FLAG_NEXT)
    }

    pub fn is_complete(&self) -> bool {
        self.has_flag(FLAG_COMPLETE)
    }

    pub fn error_message(&self) -> String {
        self.header(HEADER_ERROR)
            .cloned()
            .unwrap_or_else(|| "unspecified error".into())
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.header(HEADER_FLAGS)
            .map(|flags| flags.split(',').any(|f| f.trim() == flag))
            .unwrap_or(false)
    }
}

pub(crate) fn parse_start_line(line: &str) -> Result<(FrameKind, u32)> {
    let mut parts = line.split_whitespace();
    let verb = parts
        .next()
        .ok_or_else(|| RSocketError::MalformedFrame("empty start line".into()))?;
    let kind = FrameKind::parse(verb)?;
    let stream_id = parts
        .next()
        .ok_or_else(|| RSocketError::MalformedFrame("missing stream id".into()))?
        .parse::<u32>()
        .map_err(|_| RSocketError::MalformedFrame(format!("bad stream id in {:?}", line)))?;
    Ok((kind, stream_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_stream_frame_text() {
        let frame = Frame::request(FrameKind::RequestStream, 1, &Payload::from("hello"), Some(5));
        assert_eq!(
            frame.encode(),
            "REQUEST_STREAM 1\r\nRequest-N: 5\r\nLength: 8\r\nEnd:\r\naGVsbG8="
        );
    }

    #[test]
    fn payload_flags_and_metadata_survive_parsing() {
        let payload = Payload::new(b"data".to_vec(), Some(b"meta".to_vec()));
        let frame = Frame::payload(7, Some(&payload), true);
        let parsed = Frame::parse(&frame.encode()).unwrap();

        assert_eq!(parsed.kind, FrameKind::Payload);
        assert_eq!(parsed.stream_id, 7);
        assert!(parsed.has_next());
        assert!(parsed.is_complete());
        assert_eq!(parsed.to_payload().unwrap(), payload);
    }

    #[test]
    fn bare_completion_has_no_next() {
        let frame = Frame::parse(&Frame::payload(3, None, true).encode()).unwrap();
        assert!(!frame.has_next());
        assert!(frame.is_complete());
        assert!(frame.body.is_none());
    }

    #[test]
    fn error_text_is_single_line() {
        let frame = Frame::error(2, &RSocketError::Rejected("no\r\nroute".into()));
        let parsed = Frame::parse(&frame.encode()).unwrap();
        assert_eq!(parsed.error_message(), "request rejected: no  route");
    }

    #[test]
    fn rejects_unknown_verbs_and_bad_ids() {
        assert!(Frame::parse("HELLO 1\r\nEnd:\r\n").is_err());
        assert!(Frame::parse("CANCEL x\r\nEnd:\r\n").is_err());
        assert!(Frame::parse("CANCEL 1\r\n").is_err());
    }

    #[test]
    fn bad_request_n_is_an_error() {
        let mut frame = Frame::new(FrameKind::RequestN, 1);
        frame.set_header(HEADER_REQUEST_N, "-3");
        assert!(matches!(
            frame.request_n_value(),
            Err(RSocketError::InvalidRequestN(_))
        ));
    }
}
