//! Incremental assembly of one assistant reply.
//!
//! A reply cycle runs `begin -> consume_fragment* -> (finish | fail -> finish)`.
//! Every published value is the complete text so far, so a surface can
//! redraw it any number of times.

use crate::error::{ChatError, ProviderError};

/// Longest slice of provider detail kept in an error turn.
const MAX_ERROR_DETAIL: usize = 200;

/// Receives the live, not yet committed text of the reply in progress.
pub trait LiveSink {
    fn publish(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Streaming,
    Terminal,
}

#[derive(Debug, Default)]
struct StreamState {
    accumulated_text: String,
    terminal: bool,
}

pub struct ResponseAssembler<'a> {
    sink: &'a mut (dyn LiveSink + Send),
    phase: Phase,
    state: StreamState,
}

impl<'a> ResponseAssembler<'a> {
    pub fn new(sink: &'a mut (dyn LiveSink + Send)) -> Self {
        Self {
            sink,
            phase: Phase::Idle,
            state: StreamState::default(),
        }
    }

    pub fn begin(&mut self) {
        if self.phase == Phase::Streaming {
            tracing::debug!(
                discarded = self.state.accumulated_text.len(),
                "restarting reply; partial text dropped"
            );
        }
        self.state = StreamState::default();
        self.phase = Phase::Streaming;
    }

    pub fn consume_fragment(&mut self, fragment: &str) -> Result<(), ChatError> {
        match self.phase {
            Phase::Streaming => {}
            Phase::Idle => return Err(ChatError::InvalidState("fragment received before begin")),
            Phase::Terminal => return Err(ChatError::InvalidState("fragment received after reply ended")),
        }
        tracing::trace!(len = fragment.len(), "fragment");
        self.state.accumulated_text.push_str(fragment);
        self.sink.publish(&self.state.accumulated_text);
        Ok(())
    }

    /// Replace whatever arrived so far with a short error notice.
    pub fn fail(&mut self, error: &ProviderError) -> Result<(), ChatError> {
        match self.phase {
            Phase::Streaming => {}
            Phase::Idle => return Err(ChatError::InvalidState("fail called before begin")),
            Phase::Terminal => return Err(ChatError::InvalidState("reply already ended")),
        }
        tracing::warn!(status = ?error.status, "provider failed: {}", error.message);
        self.state.accumulated_text = error_notice(error);
        self.state.terminal = true;
        self.phase = Phase::Terminal;
        self.sink.publish(&self.state.accumulated_text);
        Ok(())
    }

    /// End the cycle and hand back the text to commit.
    pub fn finish(&mut self) -> Result<String, ChatError> {
        if self.phase == Phase::Idle {
            return Err(ChatError::InvalidState("finish called before begin"));
        }
        self.state.terminal = true;
        let text = std::mem::take(&mut self.state.accumulated_text);
        self.phase = Phase::Idle;
        tracing::debug!(len = text.len(), "reply finished");
        Ok(text)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.terminal
    }
}

fn error_notice(error: &ProviderError) -> String {
    let detail = error.to_string();
    let mut short: String = detail.chars().take(MAX_ERROR_DETAIL).collect();
    if short.len() < detail.len() {
        short.push('…');
    }
    format!("⚠️ Error: {short}")
}

#[cfg(test)]
mod tests {
    use super::*;

    impl LiveSink for Vec<String> {
        fn publish(&mut self, text: &str) {
            self.push(text.to_string());
        }
    }

    #[test]
    fn publishes_whole_text_on_each_fragment() {
        let mut published: Vec<String> = Vec::new();
        let mut asm = ResponseAssembler::new(&mut published);
        asm.begin();
        for f in ["Hel", "lo, ", "world"] {
            asm.consume_fragment(f).unwrap();
        }
        let text = asm.finish().unwrap();
        assert_eq!(text, "Hello, world");
        assert_eq!(published, ["Hel", "Hello, ", "Hello, world"]);
    }

    #[test]
    fn fail_replaces_partial_text() {
        let mut published: Vec<String> = Vec::new();
        let mut asm = ResponseAssembler::new(&mut published);
        asm.begin();
        asm.consume_fragment("partial").unwrap();
        asm.fail(&ProviderError::http(500, "timeout")).unwrap();
        assert!(asm.is_terminal());

        assert_eq!(
            asm.consume_fragment("late"),
            Err(ChatError::InvalidState("fragment received after reply ended"))
        );
        let text = asm.finish().unwrap();
        assert_eq!(text, "⚠️ Error: HTTP 500: timeout");
        assert_eq!(published.last().map(String::as_str), Some(text.as_str()));
    }

    #[test]
    fn fail_without_fragments() {
        let mut published: Vec<String> = Vec::new();
        let mut asm = ResponseAssembler::new(&mut published);
        asm.begin();
        asm.fail(&ProviderError::transport("connection reset")).unwrap();
        assert!(asm.fail(&ProviderError::transport("again")).is_err());
        assert_eq!(asm.finish().unwrap(), "⚠️ Error: connection reset");
    }

    #[test]
    fn long_error_detail_is_truncated() {
        let mut published: Vec<String> = Vec::new();
        let mut asm = ResponseAssembler::new(&mut published);
        asm.begin();
        asm.fail(&ProviderError::transport("x".repeat(5000))).unwrap();
        let text = asm.finish().unwrap();
        assert!(text.starts_with("⚠️ Error: xxx"));
        assert!(text.ends_with('…'));
        assert!(text.chars().count() < MAX_ERROR_DETAIL + 20);
    }

    #[test]
    fn operations_before_begin_are_rejected() {
        let mut published: Vec<String> = Vec::new();
        let mut asm = ResponseAssembler::new(&mut published);
        assert!(matches!(asm.consume_fragment("x"), Err(ChatError::InvalidState(_))));
        assert!(matches!(asm.finish(), Err(ChatError::InvalidState(_))));
        assert!(matches!(
            asm.fail(&ProviderError::transport("x")),
            Err(ChatError::InvalidState(_))
        ));
        drop(asm);
        assert!(published.is_empty());
    }

    #[test]
    fn finished_cycle_needs_new_begin() {
        let mut published: Vec<String> = Vec::new();
        let mut asm = ResponseAssembler::new(&mut published);
        asm.begin();
        asm.consume_fragment("one").unwrap();
        assert_eq!(asm.finish().unwrap(), "one");
        assert!(asm.consume_fragment("two").is_err());

        asm.begin();
        assert!(!asm.is_terminal());
        asm.consume_fragment("two").unwrap();
        assert_eq!(asm.finish().unwrap(), "two");
    }

    #[test]
    fn empty_reply_commits_empty_text() {
        let mut published: Vec<String> = Vec::new();
        let mut asm = ResponseAssembler::new(&mut published);
        asm.begin();
        assert_eq!(asm.finish().unwrap(), "");
        drop(asm);
        assert!(published.is_empty());
    }
}
