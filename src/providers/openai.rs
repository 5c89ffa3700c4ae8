use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use axum::body::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::Config;
use crate::data_models::{Answer, ChatMessage, SearchHit};

use super::{LanguageModel, TextStream, endpoint, ensure_success, http_client};

const PROVIDER: &str = "OpenAI";

pub const SUMMARY_PROMPT: &str = "Summarize the search results into a structured response with a \
title, a summary, the most useful links, and a few related follow-up questions. Only use links \
that appear in the search results.";

/// OpenAI Chat Completions client.
pub struct OpenAi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    summary_model: String,
    timeout: Duration,
}

impl OpenAi {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        chat_model: impl Into<String>,
        summary_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into(),
            chat_model: chat_model.into(),
            summary_model: summary_model.into(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.openai_api_key,
            &config.openai_base_url,
            &config.chat_model,
            &config.summary_model,
            config.upstream_timeout,
        )
    }

    fn completions_url(&self) -> String {
        endpoint(&self.base_url, "chat/completions")
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum StreamEvent {
    Fragment(String),
    Skip,
    Done,
}

/// Splits an SSE byte stream into `data:` payloads. Lines may arrive split
/// across network chunks, including in the middle of a UTF-8 sequence.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    line.strip_prefix("data:")
        .map(|data| data.strip_prefix(' ').unwrap_or(data).to_string())
}

pub(crate) fn parse_stream_event(data: &str) -> Result<StreamEvent> {
    if data.trim() == "[DONE]" {
        return Ok(StreamEvent::Done);
    }
    let chunk: StreamChunk =
        serde_json::from_str(data).with_context(|| format!("malformed stream chunk: {data}"))?;
    if let Some(error) = chunk.error {
        bail!("{PROVIDER} stream error: {error}");
    }
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();
    if content.is_empty() {
        Ok(StreamEvent::Skip)
    } else {
        Ok(StreamEvent::Fragment(content))
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl StreamState {
    fn queue(&mut self, payload: &str) {
        match parse_stream_event(payload) {
            Ok(StreamEvent::Fragment(text)) => self.pending.push_back(Ok(text)),
            Ok(StreamEvent::Skip) => {}
            Ok(StreamEvent::Done) => self.finished = true,
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

fn fragment_stream(response: reqwest::Response) -> TextStream {
    let state = StreamState {
        body: response.bytes_stream().boxed(),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for payload in state.decoder.feed(&bytes) {
                        if state.finished {
                            break;
                        }
                        state.queue(&payload);
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(anyhow!(e).context("reading completion stream")));
                    state.finished = true;
                }
                None => {
                    if let Some(payload) = state.decoder.finish() {
                        state.queue(&payload);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LanguageModel for OpenAi {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        if messages.is_empty() {
            bail!("at least one chat message is required");
        }
        let body = CompletionRequest {
            model: &self.chat_model,
            messages,
            stream: true,
            response_format: None,
        };

        tracing::debug!(model = %self.chat_model, messages = messages.len(), "opening completion stream");
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("sending streamed completion request")?;
        let response = ensure_success(PROVIDER, response).await?;

        Ok(fragment_stream(response))
    }

    async fn summarize(&self, query: &str, hits: &[SearchHit]) -> Result<Answer> {
        let messages = [
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(format!(
                "Question: {query}\n\nHere are the search results: {}",
                serde_json::to_string(hits)?
            )),
        ];
        let body = CompletionRequest {
            model: &self.summary_model,
            messages: &messages,
            stream: false,
            response_format: Some(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": Answer::SCHEMA_NAME,
                    "strict": true,
                    "schema": Answer::json_schema(),
                }
            })),
        };

        tracing::debug!(model = %self.summary_model, hits = hits.len(), "requesting structured summary");
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("sending summary request")?;
        let response = ensure_success(PROVIDER, response).await?;
        let completion: CompletionResponse = response
            .json()
            .await
            .context("decoding summary response")?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| anyhow!("{PROVIDER} returned no choices"))?;
        if let Some(refusal) = message.refusal {
            bail!("{PROVIDER} refused to summarize: {refusal}");
        }
        let content = message
            .content
            .ok_or_else(|| anyhow!("{PROVIDER} returned an empty message"))?;

        Answer::parse(&content).context("model output does not match the answer schema")
    }
}
