//! Server-sent events decoding for streaming JSON-RPC responses.

/// Turns a byte stream into SSE event payloads.
///
/// `data:` lines accumulate until a blank line ends the event; other
/// fields (`event:`, `id:`, comments) are ignored. Bytes are buffered
/// until a newline arrives, so multi-byte characters split across
/// network chunks survive intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed bytes; returns the payloads of every event completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        events
    }

    /// The event left open when the stream ends, if any.
    pub(crate) fn finish(mut self) -> Option<String> {
        let rest = self.push(b"\n\n");
        rest.into_iter().next()
    }
}
