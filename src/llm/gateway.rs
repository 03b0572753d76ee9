//! Completion gateway: the single door through which every prompt reaches the oracle.
//!
//! Owns retry/backoff and failure classification. Nothing escapes this boundary
//! as an error; every failure mode is a [`CompletionOutcome`] variant.

use super::client::{CompletionOracle, Generation, PermanentOracleError};
use std::sync::Arc;
use std::time::Duration;

/// Default number of oracle attempts per completion
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default fixed delay between attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// How many times to try the oracle and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// At least one attempt is always made.
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Result of a single gateway completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The oracle returned non-empty text.
    Success(String),
    /// The oracle ran but declined to produce content. Never retried.
    Blocked(String),
    /// Transient failures exhausted every attempt, a permanent failure ended
    /// the first one, or the gateway is unavailable.
    Failure(String),
}

impl CompletionOutcome {
    /// Human-readable description of a non-success outcome.
    pub fn describe(&self) -> String {
        match self {
            CompletionOutcome::Success(_) => "success".to_string(),
            CompletionOutcome::Blocked(reason) => {
                format!("Analysis blocked by API. Reason: {}", reason)
            }
            CompletionOutcome::Failure(reason) => reason.clone(),
        }
    }
}

enum Backend {
    Ready(Arc<dyn CompletionOracle>),
    /// The oracle could not be initialised; holds the reason.
    Unavailable(String),
}

/// Constructor-injected gateway around a [`CompletionOracle`].
pub struct CompletionGateway {
    backend: Backend,
    retry: RetryPolicy,
}

impl CompletionGateway {
    pub fn new(oracle: Arc<dyn CompletionOracle>, retry: RetryPolicy) -> Self {
        Self {
            backend: Backend::Ready(oracle),
            retry,
        }
    }

    /// A gateway whose oracle failed to initialise. Every call fails fast.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: Backend::Unavailable(reason.into()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, Backend::Ready(_))
    }

    /// Why the gateway is unavailable, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.backend {
            Backend::Ready(_) => None,
            Backend::Unavailable(reason) => Some(reason),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Complete with the gateway's configured retry policy.
    pub async fn complete(&self, prompt: &str, document: Option<&str>) -> CompletionOutcome {
        self.complete_with(prompt, document, self.retry.max_attempts, self.retry.backoff)
            .await
    }

    /// Complete with an explicit attempt budget and fixed backoff.
    pub async fn complete_with(
        &self,
        prompt: &str,
        document: Option<&str>,
        max_attempts: u32,
        backoff: Duration,
    ) -> CompletionOutcome {
        let oracle = match &self.backend {
            Backend::Ready(oracle) => oracle,
            Backend::Unavailable(reason) => {
                tracing::error!(reason = %reason, "Oracle is not initialized; skipping request");
                return CompletionOutcome::Failure(format!(
                    "Oracle not initialized: {}",
                    reason
                ));
            }
        };

        let full_prompt = build_full_prompt(prompt, document);
        let policy = RetryPolicy::new(max_attempts, backoff);
        let attempts = policy.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            tracing::info!(attempt, max_attempts = attempts, "Sending request to oracle");
            match oracle.generate(&full_prompt).await {
                Ok(Generation::Text(text)) if !text.trim().is_empty() => {
                    tracing::info!(attempt, "Received completion from oracle");
                    return CompletionOutcome::Success(text);
                }
                Ok(Generation::Text(_)) => {
                    tracing::warn!(attempt, "Oracle returned an empty completion");
                    return CompletionOutcome::Blocked("empty response".to_string());
                }
                Ok(Generation::Blocked(reason)) => {
                    tracing::warn!(attempt, reason = %reason, "Oracle declined to produce content");
                    return CompletionOutcome::Blocked(reason);
                }
                Err(err) if err.downcast_ref::<PermanentOracleError>().is_some() => {
                    tracing::error!(attempt, error = %err, "Oracle call failed permanently; not retrying");
                    return CompletionOutcome::Failure(format!(
                        "Failed to analyze text: {}",
                        err
                    ));
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < attempts {
                        tracing::warn!(
                            attempt,
                            max_attempts = attempts,
                            error = %last_error,
                            backoff_ms = policy.backoff.as_millis() as u64,
                            "Oracle call failed; retrying"
                        );
                        if !policy.backoff.is_zero() {
                            tokio::time::sleep(policy.backoff).await;
                        }
                    } else {
                        tracing::error!(
                            attempts,
                            error = %last_error,
                            "Max attempts reached; giving up on oracle call"
                        );
                    }
                }
            }
        }

        CompletionOutcome::Failure(format!(
            "Failed to analyze text after {} attempts. Last error: {}",
            attempts, last_error
        ))
    }
}

/// Join a prompt with the article body. An absent or empty document means the
/// prompt already carries all context.
fn build_full_prompt(prompt: &str, document: Option<&str>) -> String {
    match document {
        Some(doc) if !doc.is_empty() => {
            format!("{}\n\n---\nArticle Content:\n{}\n---", prompt, doc)
        }
        _ => prompt.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracles shared by tests across the crate.

    use super::super::client::{CompletionOracle, Generation, OracleFuture, PermanentOracleError};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A reply the scripted oracle will hand out.
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Text(String),
        Blocked(String),
        Error(String),
        /// Fails with [`PermanentOracleError`].
        Permanent(String),
    }

    fn reply(next: Scripted) -> anyhow::Result<Generation> {
        match next {
            Scripted::Text(text) => Ok(Generation::Text(text)),
            Scripted::Blocked(reason) => Ok(Generation::Blocked(reason)),
            Scripted::Error(message) => Err(anyhow::anyhow!(message)),
            Scripted::Permanent(message) => Err(PermanentOracleError(message).into()),
        }
    }

    /// Oracle that replays a script and records every prompt it was sent.
    /// When the script runs out, the fallback reply is repeated.
    pub struct ScriptedOracle {
        script: Mutex<VecDeque<Scripted>>,
        fallback: Scripted,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        pub fn new(script: Vec<Scripted>, fallback: Scripted) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn always(reply: Scripted) -> Self {
            Self::new(Vec::new(), reply)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl CompletionOracle for ScriptedOracle {
        fn generate<'a>(&'a self, prompt: &'a str) -> OracleFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Box::pin(async move { reply(next) })
        }
    }

    /// Oracle that answers based on which prompt it received.
    pub struct RoutingOracle<F>
    where
        F: Fn(&str) -> Scripted + Send + Sync,
    {
        route: F,
        calls: AtomicUsize,
    }

    impl<F> RoutingOracle<F>
    where
        F: Fn(&str) -> Scripted + Send + Sync,
    {
        pub fn new(route: F) -> Self {
            Self {
                route,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl<F> CompletionOracle for RoutingOracle<F>
    where
        F: Fn(&str) -> Scripted + Send + Sync,
    {
        fn generate<'a>(&'a self, prompt: &'a str) -> OracleFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let scripted = (self.route)(prompt);
            Box::pin(async move { reply(scripted) })
        }
    }
}
