use crate::conversation::{ProviderMessage, RoleVocabulary};
use crate::error::ProviderError;
use futures_core::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Sampling options forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,

    /// Ask for incremental fragments instead of one whole reply.
    pub stream: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 256,
            temperature: 0.75,
            top_p: 0.95,
            stream: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,

    /// Full conversation context, oldest first, already mapped to `roles`.
    pub messages: Vec<ProviderMessage>,
    pub roles: RoleVocabulary,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub text: String,
}

pub type ChunkStream = BoxStream<'static, Result<ChatChunk, ProviderError>>;
pub type StreamFuture = Pin<Box<dyn Future<Output = Result<ChunkStream, ProviderError>> + Send>>;

/// Provider interface.
///
/// Both transports produce a finite, ordered stream; a whole-shot reply is
/// a stream with a single chunk.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Role strings this backend expects.
    fn default_roles(&self) -> RoleVocabulary {
        RoleVocabulary::default()
    }

    /// Start producing a reply for the given context.
    fn stream_chat(&self, req: ChatRequest) -> StreamFuture;
}

/// Wrap a complete reply as a one-chunk stream.
pub fn single_chunk(text: String) -> ChunkStream {
    Box::pin(tokio_stream::once(Ok(ChatChunk { text })))
}

/// Trim a vendor error body down to something displayable.
pub fn short_body(body: &str) -> String {
    const LIMIT: usize = 300;
    let body = body.trim();
    if body.chars().count() <= LIMIT {
        return body.to_string();
    }
    let mut out: String = body.chars().take(LIMIT).collect();
    out.push('…');
    out
}
