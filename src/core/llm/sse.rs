//! Server-Sent Events line parser for streaming chat completions.
//!
//! Buffers raw response chunks, splits them on newlines and yields the
//! payload of every `data:` line. The `[DONE]` marker ends the stream.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use super::base::{ModelError, ModelResult};

enum SseLine {
    Data(String),
    Done,
}

/// Turn a response byte stream into a stream of `data:` payloads.
///
/// A read error is yielded once as `ModelError::ConnectionFailed` and ends the stream.
pub fn data_lines<S>(byte_stream: S) -> impl Stream<Item = ModelResult<String>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };

                    match parse_line(line) {
                        Some(SseLine::Data(data)) => return Some((Ok(data), (stream, buffer, false))),
                        Some(SseLine::Done) => return None,
                        None => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Some((
                            Err(ModelError::ConnectionFailed(format!(
                                "Stream read error: {e}"
                            ))),
                            (stream, buffer, true),
                        ));
                    }
                    None => {
                        // Last line may arrive without a trailing newline
                        let rest = buffer.split();
                        if let Ok(line) = std::str::from_utf8(&rest)
                            && let Some(SseLine::Data(data)) = parse_line(line)
                        {
                            return Some((Ok(data), (stream, buffer, true)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

fn parse_line(line: &str) -> Option<SseLine> {
    let trimmed = line.trim();

    // Empty lines separate events; ':' starts a comment
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    match data {
        "" => None,
        "[DONE]" => Some(SseLine::Done),
        payload => Some(SseLine::Data(payload.to_string())),
    }
}
