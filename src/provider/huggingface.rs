use super::sse::SseParser;
use super::{short_body, single_chunk, ChatChunk, ChatRequest, ChunkStream, Provider, StreamFuture};
use crate::conversation::RoleVocabulary;
use crate::error::ProviderError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";
pub const DEFAULT_ENDPOINT: &str = "https://api-inference.huggingface.co/models/";

/// Text-generation endpoint for an open-weight instruct model.
///
/// The model sees the conversation as a plain transcript, one
/// `Role: text` line per turn, ending with an open assistant cue.
#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    http: reqwest::Client,
    token: String,
    endpoint: Url,
}

impl HuggingFaceProvider {
    pub fn new(http: reqwest::Client, token: String, endpoint: Option<&str>) -> anyhow::Result<Self> {
        let mut endpoint = endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        Ok(Self {
            http,
            token,
            endpoint: Url::parse(&endpoint)?,
        })
    }

    fn build_url(&self, model: &str) -> Result<Url, ProviderError> {
        self.endpoint
            .join(model)
            .map_err(|e| ProviderError::transport(format!("invalid model name {model:?}: {e}")))
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ProviderError::transport("access token contains invalid header characters"))?;
        h.insert(AUTHORIZATION, auth);
        Ok(h)
    }
}

impl Provider for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    fn default_roles(&self) -> RoleVocabulary {
        RoleVocabulary::new("User", "Assistant")
    }

    fn stream_chat(&self, req: ChatRequest) -> StreamFuture {
        let this = self.clone();

        Box::pin(async move {
            let url = this.build_url(&req.model)?;
            let headers = this.headers()?;
            let body = TextGenerationRequest::from_request(&req);

            let resp = this.http.post(url).headers(headers).json(&body).send().await?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(ProviderError::http(status.as_u16(), error_message(&text)));
            }

            if !body.stream {
                let parsed: Vec<Generation> = resp.json().await?;
                let text = parsed
                    .into_iter()
                    .next()
                    .map(|g| g.generated_text.trim().to_string())
                    .unwrap_or_default();
                return Ok(single_chunk(text));
            }

            let (tx, rx) = mpsc::channel::<Result<ChatChunk, ProviderError>>(64);

            tokio::spawn(async move {
                let mut bytes_stream = resp.bytes_stream();
                let mut parser = SseParser::new();
                let mut started = false;
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
                        let text = match token_text(&data) {
                            Ok(Some(text)) => text,
                            Ok(None) => continue,
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        };
                        // Models usually open with a space after the cue.
                        let text = if started { text } else { text.trim_start().to_string() };
                        if text.is_empty() {
                            continue;
                        }
                        started = true;
                        if tx.send(Ok(ChatChunk { text })).await.is_err() {
                            return;
                        }
                    }
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

/// Render the context as a `Role: text` transcript ending with the
/// assistant cue.
fn render_prompt(req: &ChatRequest) -> String {
    let mut prompt = String::new();
    for m in &req.messages {
        prompt.push_str(&m.role);
        prompt.push_str(": ");
        prompt.push_str(&m.content);
        prompt.push('\n');
    }
    prompt.push_str(&req.roles.assistant);
    prompt.push(':');
    prompt
}

#[derive(Debug, Clone, Serialize)]
struct TextGenerationRequest {
    inputs: String,
    parameters: Parameters,
    stream: bool,
}

impl TextGenerationRequest {
    fn from_request(req: &ChatRequest) -> Self {
        Self {
            inputs: render_prompt(req),
            parameters: Parameters {
                max_new_tokens: req.generation.max_output_tokens,
                temperature: req.generation.temperature,
                top_p: req.generation.top_p,
                do_sample: true,
                return_full_text: false,
            },
            stream: req.generation.stream,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Parameters {
    max_new_tokens: u32,
    temperature: f64,
    top_p: f64,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    token: Option<Token>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Token {
    text: String,
    #[serde(default)]
    special: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Decode one stream event; `None` for events that carry no visible text.
fn token_text(data: &str) -> Result<Option<String>, ProviderError> {
    if data.trim().is_empty() {
        return Ok(None);
    }
    let ev: StreamEvent = serde_json::from_str(data)
        .map_err(|e| ProviderError::transport(format!("malformed stream event: {e}")))?;
    if let Some(error) = ev.error {
        return Err(ProviderError::transport(error));
    }
    Ok(ev.token.filter(|t| !t.special).map(|t| t.text))
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) => b.error,
        Err(_) => short_body(body),
    }
}
