use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkType {
    Content,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub content: String,
    pub chunk_type: ChunkType,
}

impl StreamChunk {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            chunk_type: ChunkType::Content,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            chunk_type: ChunkType::Done,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            chunk_type: ChunkType::Error,
        }
    }
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LLMError>> + Send>>;

/// Connection settings for an OpenAI-compatible endpoint.
///
/// Nothing here is read from the process environment; the binary resolves
/// env vars and `.env` files before building one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url.filter(|u| !u.is_empty());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Full chat-completions URL derived from `base_url`.
    pub fn endpoint(&self) -> String {
        let base = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn stream_complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
    ) -> Result<ChunkStream, LLMError>;

    fn model_name(&self) -> &str;

    /// Runs one completion and returns the concatenated text.
    ///
    /// Every failure is logged and collapsed into `None`; callers only ever
    /// see "full text, or nothing".
    async fn think(&self, messages: &[Message], temperature: f32) -> Option<String> {
        tracing::info!(model = %self.model_name(), "calling model");

        let mut stream = match self.stream_complete(messages.to_vec(), temperature).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "error occurred when calling LLM API");
                return None;
            }
        };

        let mut collected = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => match chunk.chunk_type {
                    ChunkType::Content => collected.push_str(&chunk.content),
                    ChunkType::Done => break,
                    ChunkType::Error => {
                        tracing::error!(error = %chunk.content, "model stream reported an error");
                        return None;
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "model stream failed");
                    return None;
                }
            }
        }

        tracing::debug!(response = %collected, "model response received");
        Some(collected)
    }
}

pub struct OpenAIClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(config: ClientConfig) -> Result<Self, LLMError> {
        if config.model.trim().is_empty() {
            return Err(LLMError::ConfigError(
                "model id must be provided".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LLMError::ConfigError(e.to_string()))?;

        tracing::info!(
            model = %config.model,
            base_url = config.base_url.as_deref().unwrap_or("default (OpenAI)"),
            "initialized model client"
        );

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_request(&self, messages: &[Message], temperature: f32) -> Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "stream": true,
        })
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Content(String),
    Error(String),
    Event,
    Done,
    Ignored,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Ignored;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return SseLine::Ignored;
    };

    if let Some(error) = json.get("error") {
        return SseLine::Error(error_message(error));
    }

    let content: String = json
        .get("choices")
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
        .filter_map(|choice| choice.pointer("/delta/content").and_then(|c| c.as_str()))
        .collect();

    if content.is_empty() {
        SseLine::Event
    } else {
        SseLine::Content(content)
    }
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// Parses a body that turned out not to be an event stream.
fn parse_full_response(body: &str) -> Result<String, LLMError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|_| LLMError::ParseError(format!("Failed to parse response: {}", body)))?;

    if let Some(error) = json.get("error") {
        return Err(LLMError::ApiError(error_message(error)));
    }

    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| LLMError::ParseError(format!("Response has no choices: {}", body)))?;

    Ok(choices
        .iter()
        .filter_map(|choice| choice.pointer("/message/content").and_then(|c| c.as_str()))
        .collect())
}

/// Splits a response body into SSE lines.
///
/// The raw body is kept only until the first event arrives; after that the
/// response is known to be a stream and the non-streaming fallback is moot.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    raw_body: Vec<u8>,
    saw_event: bool,
}

impl SseDecoder {
    /// Feeds a network chunk; returns the lines it completed.
    fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        if !self.saw_event {
            self.raw_body.extend_from_slice(bytes);
        }
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(self.classify(&raw));
        }
        lines
    }

    /// Flushes a trailing line that had no newline.
    fn finish(&mut self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(self.classify(&raw))
    }

    fn classify(&mut self, raw: &[u8]) -> SseLine {
        let line = parse_sse_line(&String::from_utf8_lossy(raw));
        if !self.saw_event && matches!(line, SseLine::Content(_) | SseLine::Event | SseLine::Done) {
            self.saw_event = true;
            self.raw_body = Vec::new();
        }
        line
    }

    /// The whole body, when it never contained an event.
    fn fallback_body(&self) -> Option<String> {
        (!self.saw_event).then(|| String::from_utf8_lossy(&self.raw_body).into_owned())
    }
}

fn parse_stream(response: reqwest::Response) -> impl Stream<Item = Result<StreamChunk, LLMError>> + Send {
    async_stream::stream! {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(LLMError::RequestFailed(e.to_string()));
                    return;
                }
            };

            for line in decoder.push(&bytes) {
                match line {
                    SseLine::Content(content) => {
                        yield Ok(StreamChunk::content(content));
                    }
                    SseLine::Error(message) => {
                        yield Ok(StreamChunk::error(message));
                        return;
                    }
                    SseLine::Done => {
                        yield Ok(StreamChunk::done());
                        return;
                    }
                    SseLine::Event | SseLine::Ignored => {}
                }
            }
        }

        match decoder.finish() {
            Some(SseLine::Content(content)) => {
                yield Ok(StreamChunk::content(content));
            }
            Some(SseLine::Error(message)) => {
                yield Ok(StreamChunk::error(message));
                return;
            }
            _ => {}
        }

        if let Some(body) = decoder.fallback_body() {
            match parse_full_response(&body) {
                Ok(content) => {
                    if !content.is_empty() {
                        yield Ok(StreamChunk::content(content));
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        yield Ok(StreamChunk::done());
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn stream_complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
    ) -> Result<ChunkStream, LLMError> {
        let request = self.build_request(&messages, temperature);

        let mut builder = self
            .client
            .post(self.config.endpoint())
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&request);

        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LLMError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError(format!("{}: {}", status, body)));
        }

        Ok(Box::pin(parse_stream(response)))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

pub fn create_llm_client(provider: &str, config: ClientConfig) -> Result<Box<dyn LLMClient>, LLMError> {
    match provider {
        "openai" | "OpenAI" | "openai-compatible" => Ok(Box::new(OpenAIClient::new(config)?)),
        _ => Err(LLMError::ConfigError(format!("Unknown provider: {}", provider))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::new();
        for fragment in fragments {
            let event = serde_json::json!({
                "choices": [{ "index": 0, "delta": { "content": fragment } }]
            });
            body.push_str(&format!("data: {}\n\n", event));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn client_for(server: &MockServer) -> OpenAIClient {
        let config = ClientConfig::new("gpt-test")
            .with_api_key(Some("test_key".to_string()))
            .with_base_url(Some(server.uri()));
        OpenAIClient::new(config).unwrap()
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_endpoint_defaults_and_trailing_slash() {
        let config = ClientConfig::new("m");
        assert_eq!(config.endpoint(), "https://api.openai.com/v1/chat/completions");

        let config = config.with_base_url(Some("http://localhost:4000/v1/".to_string()));
        assert_eq!(config.endpoint(), "http://localhost:4000/v1/chat/completions");
    }

    #[test]
    fn test_config_defaults_timeout() {
        let config = ClientConfig::new("m").with_api_key(Some(String::new()));
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_empty_model_rejected() {
        let result = OpenAIClient::new(ClientConfig::new("  "));
        assert!(matches!(result, Err(LLMError::ConfigError(_))));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = create_llm_client("bedrock", ClientConfig::new("m"));
        assert!(matches!(result, Err(LLMError::ConfigError(_))));
    }

    #[test]
    fn test_build_request() {
        let client = OpenAIClient::new(ClientConfig::new("gpt-4")).unwrap();
        let request = client.build_request(&[Message::user("question")], 0.0);

        assert_eq!(request["model"], "gpt-4");
        assert_eq!(request["stream"], true);
        assert_eq!(request["messages"][0]["role"], "user");
        assert_eq!(request["messages"][0]["content"], "question");
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: [DONE]\n"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive\n"), SseLine::Ignored);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseLine::Content("Hel".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Event
        );
        assert_eq!(
            parse_sse_line(r#"data: {"error":{"message":"rate limited"}}"#),
            SseLine::Error("rate limited".to_string())
        );
    }

    #[test]
    fn test_decoder_joins_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":").is_empty());
        assert_eq!(
            decoder.push(b"{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n"),
            vec![SseLine::Content("Hi".to_string()), SseLine::Ignored, SseLine::Done]
        );
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_drops_raw_body_once_streaming() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n");
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n");

        assert!(decoder.raw_body.is_empty());
        assert_eq!(decoder.fallback_body(), None);
    }

    #[test]
    fn test_decoder_keeps_body_without_events() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"{\"choices\":[");
        decoder.push(b"{\"message\":{\"content\":\"ok\"}}]}");

        assert_eq!(decoder.finish(), Some(SseLine::Ignored));
        assert_eq!(
            decoder.fallback_body().as_deref(),
            Some(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
        );
    }

    #[test]
    fn test_parse_full_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Thought: ok"}}]}"#;
        assert_eq!(parse_full_response(body).unwrap(), "Thought: ok");
        assert!(matches!(parse_full_response("not json"), Err(LLMError::ParseError(_))));
        assert!(matches!(
            parse_full_response(r#"{"error":{"message":"bad key"}}"#),
            Err(LLMError::ApiError(_))
        ));
    }

    #[tokio::test]
    async fn test_think_concatenates_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test_key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-test", "stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_body(&["Thought: ", "look it up\n", "Action: Finish[42]"]), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client.think(&[Message::user("q")], 0.0).await;

        assert_eq!(text.as_deref(), Some("Thought: look it up\nAction: Finish[42]"));
    }

    #[tokio::test]
    async fn test_think_falls_back_to_plain_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Action: Finish[done]" } }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client.think(&[Message::user("q")], 0.0).await;

        assert_eq!(text.as_deref(), Some("Action: Finish[done]"));
    }

    #[tokio::test]
    async fn test_think_returns_none_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.think(&[Message::user("q")], 0.0).await, None);
    }

    #[tokio::test]
    async fn test_think_returns_none_on_stream_error_event() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\ndata: {\"error\":{\"message\":\"overloaded\"}}\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.think(&[Message::user("q")], 0.0).await, None);
    }

    #[tokio::test]
    async fn test_think_returns_none_when_unreachable() {
        let config = ClientConfig::new("m")
            .with_base_url(Some("http://127.0.0.1:1".to_string()))
            .with_timeout_secs(2);
        let client = OpenAIClient::new(config).unwrap();
        assert_eq!(client.think(&[Message::user("q")], 0.0).await, None);
    }
}
