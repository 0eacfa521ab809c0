//! Incremental decoders for the two inbound framings.
//!
//! Both decoders are resilient by design: a line or event that fails to parse
//! as a [`Response`] is dropped with a logged warning and never aborts the
//! stream, so one malformed frame cannot affect other in-flight requests.

use tracing::warn;

use crate::jsonrpc::{Request, Response};

/// Encode a request for a streaming transport: one JSON object, one newline.
pub fn encode_line(request: &Request) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}

/// Newline-delimited JSON decoder with partial-frame carry-over.
///
/// Feed raw chunks as they arrive from the transport; complete lines are
/// parsed and returned, an incomplete trailing fragment is buffered until the
/// next call. Chunk boundaries are arbitrary, so the buffer holds raw bytes
/// and UTF-8 conversion happens only on complete lines: a multibyte character
/// split across two reads is reassembled, never mangled.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every complete message it unlocked.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Response> {
        self.buf.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(message) = parse_frame(&line) {
                messages.push(message);
            }
        }
        messages
    }

    /// Bytes currently buffered waiting for a terminating newline.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Flush a trailing line that was never newline-terminated before the
    /// stream ended (a process writing its last response without `\n`).
    pub fn finish(&mut self) -> Vec<Response> {
        let rest = std::mem::take(&mut self.buf);
        parse_frame(&rest).into_iter().collect()
    }
}

/// Decode one complete frame's bytes, skipping invalid UTF-8 like any other
/// malformed frame.
fn parse_frame(bytes: &[u8]) -> Option<Response> {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse_line(text.trim_end_matches(['\n', '\r'])),
        Err(e) => {
            warn!(error = %e, "skipping frame with invalid UTF-8");
            None
        }
    }
}

/// Parse one complete line, skipping blanks and malformed frames.
pub fn parse_line(line: &str) -> Option<Response> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Response>(line) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, line, "skipping malformed frame");
            None
        }
    }
}

/// Incremental decoder for the HTTP push leg's `data: <json>` event lines.
///
/// Events are terminated by a blank line (`\n\n`). Multiple `data:` fields in
/// one event are joined with newlines before parsing; `id:`, `event:` and
/// comment fields are ignored. Like [`LineDecoder`], the buffer holds raw
/// bytes so a multibyte character straddling a chunk boundary survives intact.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buf: Vec<u8>,
}

impl EventStreamDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the event stream, returning every complete message.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Response> {
        self.buf.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buf.drain(..pos + 2).collect();
            if let Some(message) = parse_event(&event) {
                messages.push(message);
            }
        }
        messages
    }

    /// Flush a trailing event that was never terminated before the stream
    /// ended. Called when the long-poll connection drops mid-event.
    pub fn finish(&mut self) -> Vec<Response> {
        let rest = std::mem::take(&mut self.buf);
        parse_event(&rest).into_iter().collect()
    }
}

fn parse_event(event: &[u8]) -> Option<Response> {
    let event = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "skipping event with invalid UTF-8");
            return None;
        }
    };
    let mut data_lines = Vec::new();
    for line in event.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start());
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    parse_line(&data_lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_line_appends_newline() {
        let req = Request::new(1, "tools/list", None);
        let line = encode_line(&req).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn decodes_complete_lines() {
        let mut decoder = LineDecoder::new();
        let messages = decoder.feed(
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":2}\n",
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, 1);
        assert_eq!(messages[1].id, 2);
    }

    #[test]
    fn carries_partial_frame_across_feeds() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"{\"jsonrpc\":\"2.0\",\"id\":9,").is_empty());
        assert!(decoder.pending_len() > 0);
        let messages = decoder.feed(b"\"result\":{\"done\":true}}\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 9);
        assert_eq!(messages[0].result(), Some(&json!({"done": true})));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn multibyte_char_split_across_feeds_survives() {
        let frame = "{\"jsonrpc\":\"2.0\",\"id\":9,\"result\":\"café\"}\n".as_bytes();
        // Cut inside the two-byte encoding of 'é'.
        let cut = frame.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(&frame[..cut]).is_empty());
        let messages = decoder.feed(&frame[cut..]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].result(), Some(&json!("café")));
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let mut decoder = LineDecoder::new();
        let messages =
            decoder.feed(b"not json at all\n{\"jsonrpc\":\"2.0\",\"id\":5,\"result\":null}\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 5);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"\n\r\n\n").is_empty());
    }

    #[test]
    fn finish_recovers_unterminated_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder
            .feed(b"{\"jsonrpc\":\"2.0\",\"id\":11,\"result\":11}")
            .is_empty());
        let messages = decoder.finish();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 11);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn event_stream_parses_data_lines() {
        let mut decoder = EventStreamDecoder::new();
        let messages =
            decoder.feed(b"data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":\"ok\"}\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 3);
    }

    #[test]
    fn event_stream_buffers_incomplete_events() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"data: {\"jsonrpc\":\"2.0\",").is_empty());
        let messages = decoder.feed(b"\"id\":4,\"result\":4}\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 4);
    }

    #[test]
    fn event_stream_preserves_multibyte_char_split_across_chunks() {
        let event = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"café\"}\n\n".as_bytes();
        let cut = event.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(&event[..cut]).is_empty());
        let messages = decoder.feed(&event[cut..]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].result(), Some(&json!("café")));
    }

    #[test]
    fn event_stream_ignores_non_data_fields() {
        let mut decoder = EventStreamDecoder::new();
        let messages = decoder.feed(
            b"event: message\nid: 17\ndata: {\"jsonrpc\":\"2.0\",\"id\":6,\"result\":6}\n\n: keep-alive\n\n",
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 6);
    }

    #[test]
    fn finish_recovers_unterminated_event() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder
            .feed(b"data: {\"jsonrpc\":\"2.0\",\"id\":8,\"result\":8}")
            .is_empty());
        let messages = decoder.finish();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 8);
    }
}
