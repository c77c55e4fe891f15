use super::{single_chunk, ChatChunk, ChatRequest, ChunkStream, Provider, StreamFuture};
use crate::error::ProviderError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const FRAGMENT_DELAY: Duration = Duration::from_millis(120);

/// Offline provider that echoes the latest user message back.
#[derive(Debug, Default, Clone)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }
}

fn reply_parts(req: &ChatRequest) -> Vec<String> {
    let last_user = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == req.roles.user)
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    vec![
        format!("[stub {}] ", req.model),
        "You said: ".to_string(),
        last_user.to_string(),
        format!(" ({} turns of context)", req.messages.len()),
    ]
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn stream_chat(&self, req: ChatRequest) -> StreamFuture {
        Box::pin(async move {
            let parts = reply_parts(&req);
            if !req.generation.stream {
                return Ok(single_chunk(parts.concat()));
            }

            let (tx, rx) = mpsc::channel::<Result<ChatChunk, ProviderError>>(32);

            tokio::spawn(async move {
                for text in parts {
                    tokio::time::sleep(FRAGMENT_DELAY).await;
                    if tx.send(Ok(ChatChunk { text })).await.is_err() {
                        break;
                    }
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}
