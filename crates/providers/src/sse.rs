//! SSE plumbing for the LLM transport.
//!
//! The chat-completions stream arrives as chunked `text/event-stream`
//! bytes. Chunks are buffered, complete events (delimited by a blank
//! line) are drained, and each `data:` payload is handed to a parser
//! closure that returns zero or more [`StreamEvent`]s. A finalizer
//! closure runs once when the body ends so the parser can flush any
//! partially-assembled tool call.

use crate::util::from_reqwest;
use vitrine_domain::error::Result;
use vitrine_domain::stream::{BoxStream, StreamEvent};

/// Drain complete `data:` payloads from an SSE buffer.
///
/// Events are delimited by a blank line; `event:`, `id:` and `retry:`
/// lines are ignored. Consumed bytes are removed in place so a trailing
/// partial event survives until the next chunk.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos + 2).collect();
        for line in block.lines() {
            let line = line.trim_end_matches('\r').trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
    }

    payloads
}

/// Build a [`BoxStream`] of parsed events from an SSE `reqwest::Response`.
///
/// `parse_data` receives each `data:` payload; it is `FnMut` because the
/// OpenAI parser keeps per-index tool-call assembly state across payloads.
/// `finish` runs after the body closes (flushing whatever the parser still
/// holds).
pub(crate) fn sse_response_stream<F, G>(
    response: reqwest::Response,
    mut parse_data: F,
    finish: G,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
    G: FnOnce() -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        for event in parse_data(&data) {
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    // Body closed. A final event may lack the trailing
                    // blank line; force-drain it.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            for event in parse_data(&data) {
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }

        for event in finish() {
            yield event;
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("event: message\ndata: {\"delta\":\"a\"}\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["{\"delta\":\"a\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_events() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["first", "second"]);
    }

    #[test]
    fn drain_partial_event_stays_buffered() {
        let mut buf = String::from("data: complete\n\ndata: part");
        assert_eq!(drain_data_lines(&mut buf), vec!["complete"]);
        assert_eq!(buf, "data: part");
    }

    #[test]
    fn drain_handles_crlf_lines() {
        let mut buf = String::from("data: payload\r\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["payload"]);
    }

    #[test]
    fn drain_ignores_non_data_lines() {
        let mut buf = String::from("event: ping\nid: 7\nretry: 5000\ndata: payload\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["payload"]);
    }

    #[test]
    fn drain_skips_empty_data_lines() {
        let mut buf = String::from("data: \n\n");
        assert!(drain_data_lines(&mut buf).is_empty());
    }

    #[test]
    fn drain_done_sentinel_preserved() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn drain_incremental_buffering() {
        let mut buf = String::from("data: chunk1");
        assert!(drain_data_lines(&mut buf).is_empty());

        buf.push_str("\n\ndata: chunk2\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["chunk1", "chunk2"]);
        assert!(buf.is_empty());
    }
}
