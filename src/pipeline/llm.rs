//! Model interaction: the [`InsightGenerator`] seam, its two backends, and
//! the retry loop that turns a prompt into an [`InsightSection`].
//!
//! ## Backends
//!
//! * [`HttpGenerator`] — POSTs an OpenAI-style chat-completions body to a
//!   configured endpoint and reads `choices[0].message.content`.
//! * [`ProviderGenerator`] — wraps an edgequake-llm [`LLMProvider`], used
//!   when no endpoint is configured.
//!
//! ## Retry Strategy
//!
//! Every attempt is bounded by `api_timeout_secs`. Transient failures
//! (network, timeout, 429, 5xx) are retried up to `max_retries` times with
//! exponential backoff (`retry_backoff_ms * 2^attempt`); auth and
//! malformed-response errors fail immediately.

use crate::config::AnalysisConfig;
use crate::error::{ApiError, SectionError};
use crate::output::{InsightSection, SectionKind};
use crate::pipeline::postprocess::{clean_insight_text, split_bullets};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Produces free text for a prompt.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, ApiError>;
}

// ── HTTP backend ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<RequestMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Build the JSON request body.
pub fn build_chat_request(
    model: Option<&str>,
    system_prompt: &str,
    prompt: &str,
    max_tokens: usize,
    temperature: f32,
) -> serde_json::Value {
    let body = ChatRequest {
        model,
        messages: vec![
            RequestMessage {
                role: "system",
                content: system_prompt,
            },
            RequestMessage {
                role: "user",
                content: prompt,
            },
        ],
        max_tokens,
        temperature,
    };
    // Serialising plain structs of strings and numbers cannot fail.
    serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
}

/// Read `choices[0].message.content`; any other shape is an error.
pub fn parse_chat_response(body: &str) -> Result<String, ApiError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::MalformedResponse("response has no choices".into()))?;
    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ApiError::MalformedResponse(
            "choices[0].message.content is empty".into(),
        )),
    }
}

/// OpenAI-style chat-completions client.
#[derive(Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
    system_prompt: String,
    temperature: f32,
    timeout_secs: u64,
}

impl std::fmt::Debug for HttpGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpGenerator {
    pub fn new(config: &AnalysisConfig, endpoint: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            timeout_secs: config.api_timeout_secs,
        })
    }
}

#[async_trait]
impl InsightGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, ApiError> {
        let body = build_chat_request(
            self.model.as_deref(),
            &self.system_prompt,
            prompt,
            max_tokens,
            self.temperature,
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ApiError::Auth {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Http {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }
        parse_chat_response(&text)
    }
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// Adapter from an edgequake-llm provider to [`InsightGenerator`].
pub struct ProviderGenerator {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
}

impl ProviderGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl InsightGenerator for ProviderGenerator {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, ApiError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        };
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ApiError::Provider(e.to_string()))?;
        debug!(
            "Provider call: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        if response.content.trim().is_empty() {
            return Err(ApiError::MalformedResponse("provider returned empty content".into()));
        }
        Ok(response.content)
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ApiError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| ApiError::NotConfigured {
        provider: name.to_string(),
        hint: format!("{e}"),
    })
}

/// Resolve the generator, from most-specific to least-specific:
///
/// 1. `config.generator` — used as-is
/// 2. `config.endpoint` — [`HttpGenerator`]
/// 3. `config.provider` — pre-built edgequake-llm provider
/// 4. `config.provider_name` (+ `config.model`) — built via the factory
/// 5. `ProviderFactory::from_env` — auto-detected from API key variables
pub fn resolve_generator(config: &AnalysisConfig) -> Result<Arc<dyn InsightGenerator>, ApiError> {
    if let Some(ref generator) = config.generator {
        return Ok(Arc::clone(generator));
    }

    if let Some(ref endpoint) = config.endpoint {
        return Ok(Arc::new(HttpGenerator::new(config, endpoint)?));
    }

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderGenerator::new(Arc::clone(provider), config)));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-mini");
        let provider = create_provider(name, model)?;
        return Ok(Arc::new(ProviderGenerator::new(provider, config)));
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ApiError::NotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No endpoint configured and no LLM provider could be auto-detected.\n\
                Set --endpoint/--api-key, or OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(ProviderGenerator::new(provider, config)))
}

// ── Section generation ───────────────────────────────────────────────────

/// Run one section's prompt with timeout and bounded retry.
///
/// Always returns an `InsightSection`; a failure is recorded on it rather
/// than propagated, so one failed section never aborts the analysis.
pub async fn generate_section(
    generator: &Arc<dyn InsightGenerator>,
    kind: SectionKind,
    prompt: &str,
    config: &AnalysisConfig,
) -> InsightSection {
    let start = Instant::now();
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<ApiError> = None;
    let mut attempts = 0u32;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms.saturating_mul(1u64 << (attempt - 1).min(16));
            warn!(
                "{}: retry {}/{} after {}ms",
                kind.name(),
                attempt,
                config.max_retries,
                backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        attempts += 1;

        let result = match timeout(limit, generator.generate(prompt, config.max_tokens)).await {
            Ok(r) => r,
            Err(_) => Err(ApiError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        match result {
            Ok(raw) => {
                let text = clean_insight_text(&raw);
                let bullets = split_bullets(&text);
                info!(
                    "{}: {} lines in {}ms",
                    kind.name(),
                    bullets.len(),
                    start.elapsed().as_millis()
                );
                return InsightSection {
                    kind,
                    text,
                    bullets,
                    attempts,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: None,
                };
            }
            Err(e) => {
                warn!("{}: attempt {} failed: {}", kind.name(), attempt + 1, e);
                let transient = e.is_transient();
                last_err = Some(e);
                if !transient {
                    break;
                }
            }
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    let error = match last_err {
        Some(ApiError::Timeout { .. }) => SectionError::Timeout {
            section: kind.name().to_string(),
            secs: config.api_timeout_secs,
        },
        Some(e) => SectionError::LlmFailed {
            section: kind.name().to_string(),
            retries: attempts.saturating_sub(1),
            detail: e.to_string(),
        },
        None => SectionError::LlmFailed {
            section: kind.name().to_string(),
            retries: 0,
            detail: "Unknown error".to_string(),
        },
    };
    InsightSection::failed(kind, error, attempts, duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct Scripted {
        calls: AtomicU32,
        fail_first: u32,
        error: ApiError,
    }

    #[async_trait]
    impl InsightGenerator for Scripted {
        async fn generate(&self, prompt: &str, _max_tokens: usize) -> Result<String, ApiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.error.clone())
            } else {
                Ok(format!("- insight about {}\n- second line", prompt.len()))
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl InsightGenerator for Hangs {
        async fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<String, ApiError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn fast_config(retries: u32) -> AnalysisConfig {
        AnalysisConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(1)
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    /// Local chat endpoint answering every request with one canned reply.
    struct StubEndpoint {
        url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubEndpoint {
        async fn start(status: &'static str, body: &'static str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let request = read_request(&mut socket).await;
                    seen.lock().unwrap().push(request);
                    let reply = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
            Self { url, requests }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Read one request: headers, then `Content-Length` bytes of body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let len = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn http_config(retries: u32) -> AnalysisConfig {
        AnalysisConfig::builder()
            .api_key("sk-test")
            .model("gpt-4.1-mini")
            .max_retries(retries)
            .retry_backoff_ms(1)
            .api_timeout_secs(5)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn http_generator_posts_chat_request() {
        let server = StubEndpoint::start(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"- ok"}}]}"#,
        )
        .await;
        let gen = HttpGenerator::new(&http_config(0), &server.url).unwrap();

        assert_eq!(gen.generate("Summarise", 64).await.unwrap(), "- ok");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let request = requests[0].to_lowercase();
        assert!(request.starts_with("post /v1/chat/completions"));
        assert!(request.contains("authorization: bearer sk-test"));
        assert!(requests[0].contains(r#""model":"gpt-4.1-mini""#));
        assert!(requests[0].contains(r#""content":"Summarise""#));
    }

    #[tokio::test]
    async fn http_auth_failure_is_not_retried() {
        let server = StubEndpoint::start("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let config = http_config(2);
        let gen = HttpGenerator::new(&config, &server.url).unwrap();

        assert!(matches!(
            gen.generate("p", 64).await,
            Err(ApiError::Auth { status: 401, .. })
        ));

        let dyn_gen: Arc<dyn InsightGenerator> = Arc::new(gen);
        let section = generate_section(&dyn_gen, SectionKind::Insights, "p", &config).await;
        assert!(matches!(section.error, Some(SectionError::LlmFailed { retries: 0, .. })));
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn http_server_error_is_retried() {
        let server = StubEndpoint::start("503 Service Unavailable", "overloaded").await;
        let config = http_config(2);
        let gen = HttpGenerator::new(&config, &server.url).unwrap();

        match gen.generate("p", 64).await {
            Err(ApiError::Http { status, body, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let dyn_gen: Arc<dyn InsightGenerator> = Arc::new(gen);
        let section = generate_section(&dyn_gen, SectionKind::Analytics, "p", &config).await;
        assert!(matches!(section.error, Some(SectionError::LlmFailed { retries: 2, .. })));
        assert_eq!(server.requests().len(), 4);
    }

    #[tokio::test]
    async fn http_unexpected_body_is_malformed() {
        let server = StubEndpoint::start("200 OK", r#"{"result":"text"}"#).await;
        let gen = HttpGenerator::new(&http_config(0), &server.url).unwrap();
        assert!(matches!(
            gen.generate("p", 64).await,
            Err(ApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn request_body_shape() {
        let body = build_chat_request(Some("gpt-4.1-mini"), "sys", "hello", 256, 0.2);
        assert_eq!(body["model"], "gpt-4.1-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 256);

        let no_model = build_chat_request(None, "sys", "hello", 256, 0.2);
        assert!(no_model.get("model").is_none());
    }

    #[test]
    fn parse_reads_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Revenue up"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Revenue up");
    }

    #[test]
    fn parse_rejects_other_shapes() {
        for body in [
            "not json",
            r#"{"choices":[]}"#,
            r#"{"output":"text"}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
        ] {
            assert!(
                matches!(parse_chat_response(body), Err(ApiError::MalformedResponse(_))),
                "accepted: {body}"
            );
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let gen = Arc::new(Scripted {
            calls: AtomicU32::new(0),
            fail_first: 1,
            error: ApiError::Network("reset".into()),
        });
        let dyn_gen: Arc<dyn InsightGenerator> = gen.clone();
        let section = generate_section(&dyn_gen, SectionKind::Insights, "p", &fast_config(2)).await;
        assert!(section.is_ok());
        assert_eq!(section.attempts, 2);
        assert_eq!(section.bullets, vec!["insight about 1", "second line"]);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let gen = Arc::new(Scripted {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: ApiError::MalformedResponse("no choices".into()),
        });
        let dyn_gen: Arc<dyn InsightGenerator> = gen.clone();
        let section = generate_section(&dyn_gen, SectionKind::Analytics, "p", &fast_config(3)).await;
        assert!(!section.is_ok());
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
        assert!(section.text.is_empty());
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let gen = Arc::new(Scripted {
            calls: AtomicU32::new(0),
            fail_first: 100,
            error: ApiError::Http {
                endpoint: "e".into(),
                status: 503,
                body: String::new(),
            },
        });
        let dyn_gen: Arc<dyn InsightGenerator> = gen.clone();
        let section = generate_section(&dyn_gen, SectionKind::Insights, "p", &fast_config(2)).await;
        assert_eq!(gen.calls.load(Ordering::SeqCst), 3);
        match section.error {
            Some(SectionError::LlmFailed { retries, .. }) => assert_eq!(retries, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let gen: Arc<dyn InsightGenerator> = Arc::new(Hangs);
        let section = generate_section(&gen, SectionKind::Insights, "p", &fast_config(0)).await;
        assert!(matches!(section.error, Some(SectionError::Timeout { secs: 1, .. })));
    }

    #[test]
    fn explicit_generator_wins() {
        let gen: Arc<dyn InsightGenerator> = Arc::new(Hangs);
        let config = AnalysisConfig::builder()
            .generator(Arc::clone(&gen))
            .endpoint("https://example.invalid/v1/chat/completions")
            .build()
            .unwrap();
        let resolved = resolve_generator(&config).unwrap();
        assert!(Arc::ptr_eq(&resolved, &gen));
    }

    #[test]
    fn endpoint_builds_http_generator() {
        let config = AnalysisConfig::builder()
            .endpoint("https://example.invalid/v1/chat/completions")
            .api_key("sk-test")
            .build()
            .unwrap();
        assert!(resolve_generator(&config).is_ok());
    }
}
