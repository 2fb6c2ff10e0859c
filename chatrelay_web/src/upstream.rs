use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::BoxStream, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use session::Message;
use tokio::io::AsyncBufReadExt;
use tracing::info;

pub const MODEL: &str = "llama-3.1-70b-versatile";
pub const TEMPERATURE: f64 = 0.1;
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Body of an OpenAI-compatible chat completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub temperature: f64,
}

impl CompletionRequest {
    /// A streamed request with the fixed model and sampling temperature.
    pub fn streaming(messages: Vec<Message>) -> Self {
        Self {
            model: MODEL.to_owned(),
            messages,
            stream: true,
            temperature: TEMPERATURE,
        }
    }
}

/// One streamed completion chunk. Chunks that only carry metadata (role
/// announcements, finish reasons) have no delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub delta: Option<String>,
}

impl Fragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
        }
    }

    pub fn into_text(self) -> String {
        self.delta.unwrap_or_default()
    }
}

pub type FragmentStream = BoxStream<'static, anyhow::Result<Fragment>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Starts a streamed completion. An error here means nothing has been
    /// generated yet; errors inside the returned stream happen mid-reply.
    async fn open_stream(&self, request: CompletionRequest) -> anyhow::Result<FragmentStream>;
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    async fn open_stream(&self, request: CompletionRequest) -> anyhow::Result<FragmentStream> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        info!(
            "Requesting completion from {url}: model = {}, messages = {}",
            request.model,
            request.messages.len()
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to reach inference provider")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("inference provider returned {status}: {text}");
        }

        Ok(sse_fragments(response.bytes_stream()))
    }
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Data(Fragment),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> anyhow::Result<SseLine> {
    let Some(data) = line.strip_prefix("data:") else {
        // blank separators, `:` comments, `event:`/`id:` fields
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let payload: ChunkPayload = serde_json::from_str(data)
        .with_context(|| format!("invalid completion chunk: {data}"))?;
    if let Some(error) = payload.error {
        bail!("inference provider reported an error mid-stream: {error}");
    }
    let delta = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content);

    Ok(SseLine::Data(Fragment { delta }))
}

/// Decodes a server-sent-event body into completion fragments, one per
/// `data:` line, stopping at `[DONE]` or the end of the body.
pub fn sse_fragments<S, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let body = Box::pin(body.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err)));
    let reader = tokio::io::BufReader::new(tokio_util::io::StreamReader::new(body));
    let mut lines = reader.lines();

    Box::pin(async_stream::stream! {
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    yield Err(anyhow::Error::new(e).context("failed to read completion stream"));
                    break;
                }
            };
            match parse_sse_line(&line) {
                Ok(SseLine::Data(fragment)) => yield Ok(fragment),
                Ok(SseLine::Done) => break,
                Ok(SseLine::Skip) => {}
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    })
}
