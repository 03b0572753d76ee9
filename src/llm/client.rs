use super::models::{Model, Usage};
use crate::util::truncate_str;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// OpenRouter direct API URL (BYOK mode)
pub(crate) const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Boxed future returned by [`CompletionOracle::generate`].
pub type OracleFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Generation>> + Send + 'a>>;

/// What the oracle produced for a single prompt.
///
/// An `Err` from the oracle is a transport-level failure (network, timeout,
/// upstream 5xx) and is retried by the gateway. `Blocked` means the model ran
/// but declined to produce content, which is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text(String),
    Blocked(String),
}

/// A transport failure that retrying cannot fix, such as a rejected API key.
/// The gateway gives up on the first one instead of spending its attempts.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PermanentOracleError(pub String);

/// The external text-completion service, treated as an untrusted black box.
pub trait CompletionOracle: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> OracleFuture<'a>;
}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-", // OpenAI/OpenRouter key prefix
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Content can be null in some API responses (e.g., when refusal or error occurs)
    #[serde(default)]
    content: Option<String>,
    /// Refusal reason - set when content is blocked by content moderation
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenRouter error response (can come with 200 status for upstream errors)
#[derive(Deserialize)]
struct OpenRouterError {
    error: OpenRouterApiError,
}

#[derive(Deserialize)]
struct OpenRouterApiError {
    message: String,
    #[serde(default)]
    code: Option<i32>,
}

/// Turn a successful chat-completions body into a [`Generation`].
fn interpret_chat_response(text: &str) -> anyhow::Result<(Generation, Option<Usage>)> {
    // OpenRouter sometimes returns errors with 200 status (upstream provider issues)
    if let Ok(err_resp) = serde_json::from_str::<OpenRouterError>(text) {
        return Err(anyhow::anyhow!(
            "OpenRouter error{}: {}",
            err_resp
                .error
                .code
                .map(|c| format!(" {}", c))
                .unwrap_or_default(),
            truncate_str(&err_resp.error.message, MAX_ERROR_CONTENT_LEN)
        ));
    }

    let parsed: ChatResponse = serde_json::from_str(text).map_err(|e| {
        anyhow::anyhow!(
            "Failed to parse OpenRouter response: {}\n{}",
            e,
            sanitize_api_response(text)
        )
    })?;

    let Some(choice) = parsed.choices.first() else {
        return Err(anyhow::anyhow!("OpenRouter response contained no choices"));
    };

    if let Some(refusal) = choice.message.refusal.as_deref() {
        return Ok((
            Generation::Blocked(truncate_str(refusal, MAX_ERROR_CONTENT_LEN).to_string()),
            parsed.usage,
        ));
    }

    let content = choice.message.content.clone().unwrap_or_default();
    if content.trim().is_empty() {
        let reason = match choice.finish_reason.as_deref() {
            Some("content_filter") => "content_filter".to_string(),
            Some(other) => format!("empty response (finish_reason: {})", other),
            None => "empty response".to_string(),
        };
        return Ok((Generation::Blocked(reason), parsed.usage));
    }

    Ok((Generation::Text(content), parsed.usage))
}

/// Map a non-success HTTP status to an error. A rejected key is permanent;
/// everything else is left for the gateway to retry.
fn status_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    let message = match status.as_u16() {
        401 => {
            return PermanentOracleError(
                "Invalid API key. Run 'doclens setup' to update it.".to_string(),
            )
            .into();
        }
        429 => "Rate limited by OpenRouter.".to_string(),
        500..=599 => format!(
            "OpenRouter server error ({}). The service may be temporarily unavailable.",
            status
        ),
        _ => format!("API error {}: {}", status, sanitize_api_response(body)),
    };
    anyhow::anyhow!("{}", message)
}

/// Oracle backed by OpenRouter's chat-completions endpoint.
///
/// Performs exactly one HTTP attempt per call; retry policy belongs to the
/// gateway.
pub struct OpenRouterOracle {
    client: reqwest::Client,
    api_key: String,
    model: Model,
    url: String,
}

impl OpenRouterOracle {
    pub fn new(api_key: impl Into<String>, model: Model, timeout: Duration) -> anyhow::Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("OpenRouter API key is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            api_key,
            model,
            url: OPENROUTER_URL.to_string(),
        })
    }

    /// Point the oracle at a different OpenAI-compatible endpoint.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn send(&self, prompt: &str) -> anyhow::Result<Generation> {
        let request = ChatRequest {
            model: self.model.id().to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.model.max_tokens(),
            stream: false,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Title", "doclens")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow::anyhow!("OpenRouter request timed out: {}", err)
                } else {
                    anyhow::anyhow!("OpenRouter request failed: {}", err)
                }
            })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let (generation, usage) = interpret_chat_response(&text)?;
        if let Some(usage) = usage {
            tracing::debug!(
                model = self.model.id(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost = usage.cost(),
                "OpenRouter usage"
            );
        }
        Ok(generation)
    }
}

impl CompletionOracle for OpenRouterOracle {
    fn generate<'a>(&'a self, prompt: &'a str) -> OracleFuture<'a> {
        Box::pin(self.send(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_plain_content() {
        let body = r#"{"choices":[{"message":{"content":"hello"}}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#;
        let (generation, usage) = interpret_chat_response(body).unwrap();
        assert_eq!(generation, Generation::Text("hello".to_string()));
        assert_eq!(usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_interpret_refusal_is_blocked() {
        let body = r#"{"choices":[{"message":{"content":null,"refusal":"unsafe request"}}]}"#;
        let (generation, _) = interpret_chat_response(body).unwrap();
        assert_eq!(generation, Generation::Blocked("unsafe request".to_string()));
    }

    #[test]
    fn test_interpret_content_filter_is_blocked() {
        let body = r#"{"choices":[{"message":{"content":""},"finish_reason":"content_filter"}]}"#;
        let (generation, _) = interpret_chat_response(body).unwrap();
        assert_eq!(generation, Generation::Blocked("content_filter".to_string()));
    }

    #[test]
    fn test_interpret_error_envelope_is_transient_error() {
        let body = r#"{"error":{"message":"upstream overloaded","code":502}}"#;
        let err = interpret_chat_response(body).unwrap_err();
        assert!(err.to_string().contains("upstream overloaded"));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_interpret_garbage_is_error() {
        assert!(interpret_chat_response("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn test_status_errors_classify_bad_key_as_permanent() {
        let unauthorized = status_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(unauthorized.downcast_ref::<PermanentOracleError>().is_some());
        assert!(unauthorized.to_string().contains("doclens setup"));

        for status in [
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            reqwest::StatusCode::BAD_GATEWAY,
            reqwest::StatusCode::BAD_REQUEST,
        ] {
            let err = status_error(status, "nope");
            assert!(err.downcast_ref::<PermanentOracleError>().is_none(), "{}", status);
        }
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        let redacted = sanitize_api_response("invalid api_key sk-abc");
        assert!(redacted.contains("redacted"));
        assert_eq!(sanitize_api_response("plain failure"), "plain failure");
    }

    #[test]
    fn test_new_rejects_empty_key() {
        assert!(OpenRouterOracle::new("  ", Model::Speed, Duration::from_secs(5)).is_err());
        assert!(OpenRouterOracle::new("sk-test", Model::Speed, Duration::from_secs(5)).is_ok());
    }
}
