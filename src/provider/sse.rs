//! Minimal Server-Sent Events framing shared by the HTTP providers.

use crate::error::ProviderError;

/// Splits a byte stream into `data:` payloads.
///
/// Multi-line `data:` fields are joined with `\n`; an event ends at a blank
/// line. Other fields (`event:`, `id:`, `retry:`, comments) are dropped.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    data: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect every event they complete.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                if let Some(data) = self.data.take() {
                    events.push(data);
                }
                continue;
            }

            let line = std::str::from_utf8(&line)
                .map_err(|_| ProviderError::transport("event stream is not valid UTF-8"))?;

            if let Some(rest) = line.strip_prefix("data:") {
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                match &mut self.data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(rest);
                    }
                    None => self.data = Some(rest.to_string()),
                }
            }
        }

        Ok(events)
    }

    /// Flush the event left open when the body ends without a blank line.
    pub fn finish(&mut self) -> Result<Option<String>, ProviderError> {
        let mut events = if self.buf.is_empty() {
            Vec::new()
        } else {
            self.push(b"\n")?
        };
        Ok(events.pop().or_else(|| self.data.take()))
    }
}
