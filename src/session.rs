//! One user session: the conversation log plus the provider driving it.

use crate::assembler::ResponseAssembler;
use crate::conversation::{ConversationLog, RoleVocabulary, Turn};
use crate::error::ChatError;
use crate::provider::{ChatRequest, GenerationConfig, Provider};
use crate::render::RenderSurface;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_stream::StreamExt;

/// Read-only settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: String,
    pub greeting: String,
    pub roles: RoleVocabulary,
    pub generation: GenerationConfig,

    /// Send the greeting back to the provider as context.
    pub include_greeting: bool,

    /// Pause between fragments to simulate typing.
    pub typing_delay: Duration,
}

pub struct ChatSession {
    log: ConversationLog,
    provider: Box<dyn Provider + Send + Sync>,
    settings: SessionSettings,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the reply cycle ends, including when
/// the `submit` future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ChatError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ChatError::ReplyInFlight)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatSession {
    pub fn new(provider: Box<dyn Provider + Send + Sync>, settings: SessionSettings) -> Self {
        Self {
            log: ConversationLog::new(),
            provider,
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Seed the greeting. Safe to call on every redraw.
    pub fn initialize(&self) {
        self.log.initialize(&self.settings.greeting);
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.log.all_turns()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one full reply cycle for `text` and return the index of the
    /// committed assistant turn.
    ///
    /// Provider failures never surface here; they are committed as an
    /// error turn. Only input and state errors are returned.
    pub async fn submit<S>(&self, text: &str, surface: &mut S) -> Result<usize, ChatError>
    where
        S: RenderSurface + Send,
    {
        let _guard = InFlight::acquire(&self.in_flight)?;
        self.initialize();

        let user_index = self.log.append_user(text)?;
        surface.redraw(&self.log.all_turns());

        let mut messages = self.log.to_provider_messages(&self.settings.roles);
        if !self.settings.include_greeting {
            // Index 0 is always the greeting, seeded above.
            messages.remove(0);
        }
        let req = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            roles: self.settings.roles.clone(),
            generation: self.settings.generation.clone(),
        };
        tracing::debug!(
            provider = self.provider.name(),
            user_index,
            context = req.messages.len(),
            "requesting reply"
        );

        let reply = {
            let mut asm = ResponseAssembler::new(&mut *surface);
            asm.begin();

            match self.provider.stream_chat(req).await {
                Ok(mut stream) => {
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(chunk) if chunk.text.is_empty() => {}
                            Ok(chunk) => {
                                if !self.settings.typing_delay.is_zero() {
                                    tokio::time::sleep(self.settings.typing_delay).await;
                                }
                                asm.consume_fragment(&chunk.text)?;
                            }
                            Err(e) => {
                                asm.fail(&e)?;
                                break;
                            }
                        }
                    }
                }
                Err(e) => asm.fail(&e)?,
            }

            tracing::debug!(failed = asm.is_terminal(), "reply stream ended");
            asm.finish()?
        };

        let index = self.log.append_assistant(reply);
        surface.redraw(&self.log.all_turns());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::LiveSink;
    use crate::conversation::Role;
    use crate::error::ProviderError;
    use crate::provider::scripted::{Script, ScriptedProvider};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Recorder {
        live: Vec<String>,
        redraws: Vec<usize>,
    }

    impl LiveSink for Recorder {
        fn publish(&mut self, text: &str) {
            self.live.push(text.to_string());
        }
    }

    impl RenderSurface for Recorder {
        fn redraw(&mut self, turns: &[Turn]) {
            self.redraws.push(turns.len());
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            model: "test-model".into(),
            greeting: "Hey, I'm Ramana".into(),
            roles: RoleVocabulary::new("user", "model"),
            generation: GenerationConfig::default(),
            include_greeting: true,
            typing_delay: Duration::ZERO,
        }
    }

    fn session(provider: &ScriptedProvider, settings: SessionSettings) -> ChatSession {
        ChatSession::new(Box::new(provider.clone()), settings)
    }

    #[tokio::test]
    async fn streamed_reply_is_committed() {
        let provider = ScriptedProvider::new([Script::Fragments(vec!["Hel", "lo, ", "world"])]);
        let session = session(&provider, settings());
        session.initialize();

        let mut rec = Recorder::default();
        let index = session.submit("hi", &mut rec).await.unwrap();

        assert_eq!(index, 2);
        assert_eq!(rec.live, ["Hel", "Hello, ", "Hello, world"]);
        assert_eq!(rec.redraws, [2, 3]);
        let turns = session.turns();
        assert_eq!(turns[2].role(), Role::Assistant);
        assert_eq!(turns[2].text(), "Hello, world");
    }

    #[tokio::test]
    async fn every_submission_gets_one_reply() {
        let err = || ProviderError::http(500, "timeout");
        let provider = ScriptedProvider::new([
            Script::Fragments(vec!["one"]),
            Script::Reject(err()),
            Script::FailAfter(vec!["par", "tial"], err()),
            Script::Fragments(vec![]),
            Script::Fragments(vec!["five"]),
        ]);
        let session = session(&provider, settings());
        session.initialize();
        session.initialize();

        let mut rec = Recorder::default();
        for n in 0..5 {
            session.submit(&format!("message {n}"), &mut rec).await.unwrap();
        }

        let turns = session.turns();
        assert_eq!(turns.len(), 1 + 2 * 5);
        for pair in turns[1..].chunks(2) {
            assert_eq!(pair[0].role(), Role::User);
            assert_eq!(pair[1].role(), Role::Assistant);
        }
        assert_eq!(turns[4].text(), "⚠️ Error: HTTP 500: timeout");
        assert_eq!(turns[6].text(), "⚠️ Error: HTTP 500: timeout");
        assert_eq!(turns[8].text(), "");
    }

    #[tokio::test]
    async fn blank_input_creates_no_turns() {
        let provider = ScriptedProvider::default();
        let session = session(&provider, settings());
        session.initialize();

        let mut rec = Recorder::default();
        assert_eq!(session.submit("   ", &mut rec).await, Err(ChatError::InvalidInput));
        assert_eq!(session.turns().len(), 1);
        assert!(provider.requests().is_empty());
        assert!(rec.redraws.is_empty());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn context_includes_full_history() {
        let provider = ScriptedProvider::new([
            Script::Fragments(vec!["hey"]),
            Script::Fragments(vec!["sure"]),
        ]);
        let session = session(&provider, settings());

        let mut rec = Recorder::default();
        session.submit("hi", &mut rec).await.unwrap();
        session.submit("again", &mut rec).await.unwrap();

        let requests = provider.requests();
        let second: Vec<(&str, &str)> = requests[1]
            .messages
            .iter()
            .map(|m| (m.role.as_str(), m.content.as_str()))
            .collect();
        assert_eq!(
            second,
            [
                ("model", "Hey, I'm Ramana"),
                ("user", "hi"),
                ("model", "hey"),
                ("user", "again"),
            ]
        );
        assert_eq!(requests[1].model, "test-model");
    }

    #[tokio::test]
    async fn greeting_can_be_left_out_of_context() {
        let provider = ScriptedProvider::new([Script::Fragments(vec!["hey"])]);
        let session = session(
            &provider,
            SessionSettings {
                include_greeting: false,
                ..settings()
            },
        );

        let mut rec = Recorder::default();
        session.submit("hi", &mut rec).await.unwrap();

        let messages = &provider.requests()[0].messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(session.turns().len(), 3);
    }

    #[tokio::test]
    async fn second_submission_while_streaming_is_rejected() {
        let release = Arc::new(Notify::new());
        let provider = ScriptedProvider::new([
            Script::Hold(vec!["slow"], Arc::clone(&release)),
            Script::Fragments(vec!["later"]),
        ]);
        let session = Arc::new(session(&provider, settings()));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                let mut rec = Recorder::default();
                session.submit("first", &mut rec).await
            }
        });

        while session.turns().len() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(session.is_busy());

        let mut rec = Recorder::default();
        assert_eq!(session.submit("second", &mut rec).await, Err(ChatError::ReplyInFlight));

        release.notify_one();
        assert_eq!(first.await.unwrap(), Ok(2));
        assert!(!session.is_busy());
        assert_eq!(session.turns()[2].text(), "slow");

        assert_eq!(session.submit("second", &mut rec).await, Ok(4));
    }

    #[tokio::test]
    async fn dropped_reply_commits_nothing() {
        let release = Arc::new(Notify::new());
        let provider = ScriptedProvider::new([Script::Hold(vec!["partial"], release)]);
        let session = session(&provider, settings());

        let mut rec = Recorder::default();
        let cycle = session.submit("hi", &mut rec);
        let timed_out = tokio::time::timeout(Duration::from_millis(50), cycle).await;
        assert!(timed_out.is_err());

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role(), Role::User);
        assert!(!session.is_busy());
        assert_eq!(rec.live, ["partial"]);
    }
}
