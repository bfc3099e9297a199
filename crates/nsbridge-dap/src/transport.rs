//! DAP transport layer: Content-Length based message framing.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DapError;

/// Largest body a client frame may declare.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Encode a message into a DAP wire-format frame.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, DapError> {
    let body = serde_json::to_vec(message)
        .map_err(|e| DapError::InvalidMessage(format!("cannot serialize message: {e}")))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Read the next frame from a client stream.
///
/// Returns `Ok(None)` on a clean EOF between frames. A frame declaring more
/// than [`MAX_MESSAGE_SIZE`] bytes is a `Transport` error and nothing of its
/// body is read.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>, DapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            if headers.is_empty() {
                return Ok(None);
            }
            return Err(DapError::Transport("EOF inside message header".into()));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if headers.is_empty() {
                // Stray blank line between frames.
                continue;
            }
            break;
        }
        headers.push(line.to_string());
    }

    let length = parse_content_length(headers.iter().map(String::as_str))?;
    if length > MAX_MESSAGE_SIZE {
        return Err(DapError::Transport(format!(
            "message too large: {length} bytes (limit {MAX_MESSAGE_SIZE})"
        )));
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| DapError::InvalidMessage(format!("JSON parse error: {e}")))
}

/// Frame and write one message, then flush.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), DapError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_message(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn parse_content_length<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<usize, DapError> {
    for line in lines {
        if let Some(value) = line.trim().strip_prefix("Content-Length:") {
            let value = value.trim();
            return value.parse::<usize>().map_err(|e| {
                DapError::Transport(format!("invalid Content-Length value '{value}': {e}"))
            });
        }
    }
    Err(DapError::Transport("missing Content-Length header".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let msg = json!({"output": "héllo"});
        let encoded = encode_message(&msg).unwrap();
        let text = String::from_utf8(encoded).unwrap();
        let (header, body) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
    }

    #[tokio::test]
    async fn read_without_content_length_is_an_error() {
        let mut reader = BufReader::new(&b"Bad-Header: 42\r\n\r\n{}"[..]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("missing Content-Length"), "got: {err}");
    }

    #[tokio::test]
    async fn read_short_body_is_an_io_error() {
        let mut reader = BufReader::new(&b"Content-Length: 100\r\n\r\n{\"short\":true}"[..]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, DapError::Io(_)), "got: {err}");
    }

    #[tokio::test]
    async fn oversized_content_length_is_rejected() {
        for length in [u64::MAX, MAX_MESSAGE_SIZE as u64 + 1] {
            let frame = format!("Content-Length: {length}\r\n\r\n{{}}");
            let mut reader = BufReader::new(frame.as_bytes());
            let err = read_message(&mut reader).await.unwrap_err();
            assert!(err.to_string().contains("message too large"), "got: {err}");
        }
    }

    #[tokio::test]
    async fn unparsable_content_length_is_rejected() {
        let mut reader = BufReader::new(&b"Content-Length: 99999999999999999999999\r\n\r\n{}"[..]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("invalid Content-Length"), "got: {err}");
    }

    #[tokio::test]
    async fn read_consecutive_frames_then_eof() {
        let mut bytes = encode_message(&json!({"seq": 1, "type": "request", "command": "initialize"}))
            .unwrap();
        bytes.extend(encode_message(&json!({"seq": 2, "type": "request", "command": "launch"})).unwrap());
        let mut reader = BufReader::new(bytes.as_slice());

        let first = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(first["command"], "initialize");
        let second = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(second["command"], "launch");
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_truncated_header_is_an_error() {
        let mut reader = BufReader::new(&b"Content-Length: 10\r\n"[..]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, DapError::Transport(_)));
    }

    #[tokio::test]
    async fn write_then_read() {
        let mut buf = Vec::new();
        write_message(&mut buf, &json!({"seq": 5, "type": "event", "event": "initialized"}))
            .await
            .unwrap();
        let mut reader = BufReader::new(buf.as_slice());
        let value = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(value["event"], "initialized");
    }
}
