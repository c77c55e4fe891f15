use super::sse::SseParser;
use super::{short_body, single_chunk, ChatChunk, ChatRequest, ChunkStream, Provider, StreamFuture};
use crate::conversation::RoleVocabulary;
use crate::error::ProviderError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";

/// Gemini over the Generative Language API, authenticated with an API key.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
    api_key: String,
    api_base: Url,
}

impl GoogleProvider {
    pub fn new(http: reqwest::Client, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            api_key,
            api_base: Url::parse("https://generativelanguage.googleapis.com/")?,
        })
    }

    fn build_url(&self, model: &str, stream: bool) -> Result<Url, ProviderError> {
        // streamGenerateContent speaks Server-Sent Events with alt=sse.
        let method = if stream { "streamGenerateContent" } else { "generateContent" };
        let mut url = self
            .api_base
            .join(&format!("v1beta/models/{model}:{method}"))
            .map_err(|e| ProviderError::transport(format!("invalid model name {model:?}: {e}")))?;

        url.query_pairs_mut().append_pair("key", &self.api_key);
        if stream {
            url.query_pairs_mut().append_pair("alt", "sse");
        }
        Ok(url)
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }
}

impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn default_roles(&self) -> RoleVocabulary {
        RoleVocabulary::new("user", "model")
    }

    fn stream_chat(&self, req: ChatRequest) -> StreamFuture {
        let this = self.clone();

        Box::pin(async move {
            let stream = req.generation.stream;
            let url = this.build_url(&req.model, stream)?;
            let body = GenerateContentRequest::from_request(&req);

            let resp = this
                .http
                .post(url)
                .headers(Self::headers())
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(ProviderError::http(status.as_u16(), error_message(&text)));
            }

            if !stream {
                let parsed: GenerateContentResponse = resp.json().await?;
                let mut progress = ReplyProgress::default();
                let text = progress.accept(&parsed)?.unwrap_or_default();
                progress.finish()?;
                return Ok(single_chunk(text));
            }

            let (tx, rx) = mpsc::channel::<Result<ChatChunk, ProviderError>>(64);

            tokio::spawn(async move {
                let mut bytes_stream = resp.bytes_stream();
                let mut parser = SseParser::new();
                let mut progress = ReplyProgress::default();
                let mut ended = false;

                while !ended {
                    let events = match bytes_stream.next().await {
                        Some(item) => item.map_err(ProviderError::from).and_then(|b| parser.push(&b)),
                        None => {
                            ended = true;
                            parser.finish().map(|last| last.into_iter().collect())
                        }
                    };
                    let events = match events {
                        Ok(events) => events,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };

                    for data in events {
                        if data.trim().is_empty() {
                            continue;
                        }
                        let text = serde_json::from_str::<GenerateContentResponse>(&data)
                            .map_err(|e| ProviderError::transport(format!("malformed stream event: {e}")))
                            .and_then(|r| progress.accept(&r));
                        match text {
                            Ok(Some(text)) => {
                                if tx.send(Ok(ChatChunk { text })).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    }
                }

                if let Err(e) = progress.finish() {
                    let _ = tx.send(Err(e)).await;
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: WireGenerationConfig,
}

impl GenerateContentRequest {
    fn from_request(req: &ChatRequest) -> Self {
        Self {
            contents: req
                .messages
                .iter()
                .map(|m| Content {
                    role: Some(m.role.clone()),
                    parts: vec![Part {
                        text: Some(m.content.clone()),
                    }],
                })
                .collect(),
            generation_config: WireGenerationConfig {
                max_output_tokens: req.generation.max_output_tokens,
                temperature: req.generation.temperature,
                top_p: req.generation.top_p,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text(r: &GenerateContentResponse) -> Option<String> {
    // Concatenate all text parts of the first candidate.
    let content = r.candidates.first()?.content.as_ref()?;
    let out: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if out.is_empty() { None } else { Some(out) }
}

/// What a reply has produced so far. Gemini withholds text for blocked
/// prompts and filtered candidates; those become errors, never empty turns.
#[derive(Debug, Default)]
struct ReplyProgress {
    produced_text: bool,
}

impl ReplyProgress {
    fn accept(&mut self, r: &GenerateContentResponse) -> Result<Option<String>, ProviderError> {
        if let Some(reason) = r.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
            return Err(ProviderError::transport(format!("prompt blocked: {reason}")));
        }
        let text = extract_text(r);
        if text.is_none() {
            let finish = r.candidates.first().and_then(|c| c.finish_reason.as_deref());
            if let Some(reason) = finish.filter(|f| !matches!(*f, "STOP" | "MAX_TOKENS" | "FINISH_REASON_UNSPECIFIED")) {
                return Err(ProviderError::transport(format!("response blocked: {reason}")));
            }
        }
        self.produced_text |= text.is_some();
        Ok(text)
    }

    /// Called once the response is complete.
    fn finish(&self) -> Result<(), ProviderError> {
        if self.produced_text {
            Ok(())
        } else {
            Err(ProviderError::transport("provider returned no text"))
        }
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => short_body(body),
    }
}
