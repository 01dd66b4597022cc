//! Incremental `text/event-stream` decoder.

/// Turns raw stream chunks into complete `data` payloads.
///
/// Lines may be split across chunks and end in `\n` or `\r\n`. Comment
/// lines (`:ok`, `:hb`) and fields other than `data` are skipped. Multiple
/// `data:` lines of one event are joined with `\n`; the event is dispatched
/// on the blank line that ends it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current incomplete line.
    pending: Vec<u8>,
    /// `data` lines of the event being assembled.
    data: Vec<String>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event payload it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];

            let mut line = std::mem::take(&mut self.pending);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        self.pending.extend_from_slice(rest);

        frames
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let frame = self.data.join("\n");
            self.data.clear();
            return Some(frame);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}
