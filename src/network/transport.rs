//! Frame I/O over a byte stream.
//!
//! [`FrameReader`] and [`FrameWriter`] move [`Frame`]s across any
//! `AsyncRead`/`AsyncWrite` pair: a TCP socket in production, an
//! in‑memory duplex in tests.  The reader follows the text layout of
//! [`Frame::encode`]: it reads header lines up to the `End:` marker,
//! then exactly `Length` bytes of body.  Bodies longer than the
//! configured maximum are refused before any of their bytes are
//! buffered.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Result, RSocketError};
use crate::protocol::frame::{parse_start_line, Frame, HEADER_LENGTH};

const END_MARKER: &str = "End:";

/// Reads frames off the read half of a connection.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            max_frame_size,
        }
    }

    /// Read the next frame.  Returns `Ok(None)` when the peer closed
    /// the connection cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut line = String::new();
        let start = loop {
            if self.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if !trimmed.is_empty() {
                break trimmed.to_string();
            }
        };
        let (kind, stream_id) = parse_start_line(&start)?;
        let mut frame = Frame::new(kind, stream_id);

        loop {
            if self.read_line(&mut line).await? == 0 {
                return Err(RSocketError::MalformedFrame(
                    "connection closed inside frame header".into(),
                ));
            }
            let header = line.trim_end_matches(['\r', '\n']);
            if header == END_MARKER {
                break;
            }
            if !header.is_empty() {
                frame.push_header_line(header)?;
            }
        }

        let length = match frame.headers.remove(HEADER_LENGTH) {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| RSocketError::MalformedFrame(format!("bad length {:?}", value)))?,
            None => 0,
        };
        if length > self.max_frame_size {
            return Err(RSocketError::FrameTooLarge {
                size: length,
                limit: self.max_frame_size,
            });
        }
        if length > 0 {
            let mut body = vec![0u8; length];
            self.reader.read_exact(&mut body).await?;
            let body = String::from_utf8(body)
                .map_err(|_| RSocketError::MalformedFrame("body is not utf-8".into()))?;
            frame.body = Some(body);
        }
        Ok(Some(frame))
    }

    /// One line, bounded by the frame size limit.
    async fn read_line(&mut self, line: &mut String) -> Result<usize> {
        line.clear();
        let limit = self.max_frame_size as u64;
        let n = (&mut self.reader).take(limit).read_line(line).await?;
        if n as u64 == limit && !line.ends_with('\n') {
            return Err(RSocketError::MalformedFrame("header line too long".into()));
        }
        Ok(n)
    }
}

/// Writes frames to the write half of a connection.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame and flush it.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.writer.write_all(frame.encode().as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::protocol::frame::FrameKind;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frames_cross_a_byte_stream_in_order() {
        let (a, b) = duplex(4096);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b, 1024);

        let request = Frame::request(FrameKind::RequestChannel, 1, &Payload::from("hi"), Some(3));
        writer.send_frame(&request).await.unwrap();
        writer.send_frame(&Frame::request_n(1, 2)).await.unwrap();
        writer.send_frame(&Frame::payload(1, None, true)).await.unwrap();
        writer.shutdown().await.unwrap();

        let first = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(first, request);
        assert_eq!(first.to_payload().unwrap().data(), b"hi");
        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(second.request_n_value().unwrap(), 2);
        let third = reader.read_frame().await.unwrap().unwrap();
        assert!(third.is_complete());
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let (a, b) = duplex(4096);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b, 16);

        let big = Payload::from("x".repeat(64));
        writer.send_frame(&Frame::payload(3, Some(&big), false)).await.unwrap();
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, RSocketError::FrameTooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn hangup_inside_header_is_an_error() {
        let (mut a, b) = duplex(4096);
        let mut reader = FrameReader::new(b, 1024);
        a.write_all(b"REQUEST_N 5\r\nRequest-N: 1\r\n").await.unwrap();
        drop(a);
        assert!(matches!(
            reader.read_frame().await,
            Err(RSocketError::MalformedFrame(_))
        ));
    }
}
