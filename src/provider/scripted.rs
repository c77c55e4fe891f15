//! Scripted in-memory provider for tests.

use super::{ChatChunk, ChatRequest, ChunkStream, Provider, StreamFuture};
use crate::error::ProviderError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit these fragments, then end the stream.
    Fragments(Vec<&'static str>),
    /// Emit these fragments, then fail mid-stream.
    FailAfter(Vec<&'static str>, ProviderError),
    /// Fail before any fragment is produced.
    Reject(ProviderError),
    /// Emit these fragments, then wait for `release` before ending.
    Hold(Vec<&'static str>, Arc<Notify>),
}

#[derive(Debug, Default, Clone)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedProvider {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn ok(text: &str) -> Result<ChatChunk, ProviderError> {
    Ok(ChatChunk { text: text.to_string() })
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn stream_chat(&self, req: ChatRequest) -> StreamFuture {
        self.requests.lock().unwrap().push(req);
        let script = self.scripts.lock().unwrap().pop_front();

        Box::pin(async move {
            let script = script.ok_or_else(|| ProviderError::transport("no scripted reply left"))?;
            let stream: ChunkStream = match script {
                Script::Fragments(parts) => Box::pin(tokio_stream::iter(
                    parts.into_iter().map(ok).collect::<Vec<_>>(),
                )),
                Script::FailAfter(parts, err) => {
                    let mut items: Vec<_> = parts.into_iter().map(ok).collect();
                    items.push(Err(err));
                    Box::pin(tokio_stream::iter(items))
                }
                Script::Reject(err) => return Err(err),
                Script::Hold(parts, release) => {
                    let (tx, rx) = tokio::sync::mpsc::channel(16);
                    tokio::spawn(async move {
                        for p in parts {
                            let _ = tx.send(ok(p)).await;
                        }
                        release.notified().await;
                    });
                    Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
                }
            };
            Ok(stream)
        })
    }
}
