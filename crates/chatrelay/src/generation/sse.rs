//! Incremental server-sent events decoding
//!
//! Model APIs stream replies as SSE:
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: [DONE]
//! ```
//! Network chunks split lines (and UTF-8 sequences) arbitrarily, so the
//! decoder buffers bytes until a full line is available.

/// Represents a parsed SSE event
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Data event containing the payload
    Data(String),
    /// Terminal [DONE] marker
    Done,
}

/// Stateful decoder fed with raw body chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.handle_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the body ends
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.handle_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        if let Some(data) = self.data.take() {
            events.push(SseEvent::Data(data));
        }
        events
    }

    fn handle_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.data.take().map(SseEvent::Data);
        }
        if line.starts_with(':') {
            return None;
        }

        let value = match line.strip_prefix("data:") {
            Some(v) => v.strip_prefix(' ').unwrap_or(v),
            // event:, id:, retry: carry nothing we use
            None => return None,
        };

        if value == "[DONE]" {
            return Some(SseEvent::Done);
        }

        match self.data.as_mut() {
            Some(current) => {
                current.push('\n');
                current.push_str(value);
            }
            None => self.data = Some(value.to_string()),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic() {
        let raw = "data: {\"text\":\"Hello\"}\n\ndata: {\"text\":\" world\"}\n\ndata: [DONE]\n\n";

        let mut decoder = SseDecoder::new();
        let events = decoder.push(raw.as_bytes());

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SseEvent::Data(r#"{"text":"Hello"}"#.to_string()));
        assert_eq!(events[1], SseEvent::Data(r#"{"text":" world"}"#.to_string()));
        assert_eq!(events[2], SseEvent::Done);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decode_across_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"da").is_empty());
        assert!(decoder.push(b"ta: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        let events = decoder.push(b"\n");
        assert_eq!(events, vec![SseEvent::Data(r#"{"a":1}"#.to_string())]);
    }

    #[test]
    fn test_decode_split_utf8_sequence() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);
        assert_eq!(events, vec![SseEvent::Data("caf\u{e9}".to_string())]);
    }

    #[test]
    fn test_decode_crlf_and_comments() {
        let raw = ": keep-alive\r\ndata: one\r\n\r\n: another comment\r\ndata: [DONE]\r\n";
        let mut decoder = SseDecoder::new();
        let events = decoder.push(raw.as_bytes());
        assert_eq!(
            events,
            vec![SseEvent::Data("one".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn test_multi_line_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: first\ndata: second\n\n");
        assert_eq!(events, vec![SseEvent::Data("first\nsecond".to_string())]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"text\":\"test\"}").is_empty());
        assert_eq!(
            decoder.finish(),
            vec![SseEvent::Data(r#"{"text":"test"}"#.to_string())]
        );
    }

    #[test]
    fn test_other_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: message\nid: 7\nretry: 100\ndata:x\n\n");
        assert_eq!(events, vec![SseEvent::Data("x".to_string())]);
    }

    #[test]
    fn test_empty_input() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"").is_empty());
        assert!(decoder.push(b"\n\n").is_empty());
        assert!(decoder.finish().is_empty());
    }
}
