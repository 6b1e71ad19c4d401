//! Language-model interaction: send the extraction prompt, get raw text back.
//!
//! This stage returns the model's answer verbatim. Whether that answer is
//! usable JSON is decided by [`crate::pipeline::parse`].
//!
//! The model sits behind the [`CompletionClient`] trait so that callers and
//! tests can inject their own client; the default wraps an
//! `edgequake_llm::LLMProvider` resolved from configuration and environment.
//!
//! ## Retry Strategy
//!
//! Transport failures (timeouts, 429, 5xx) are retried up to
//! `max_retries` times with exponential backoff
//! (`retry_backoff_ms * 2^attempt`, capped at one minute). The default is
//! zero retries: one request per document.

use crate::config::ExtractionConfig;
use crate::error::{DocumentError, Pdf2TableError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Boxed error returned by completion clients.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Decoding parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionSettings {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A model answer plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    /// A completion with no token accounting, handy for test doubles.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A text-completion service: one prompt in, one answer out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ClientError>;
}

/// [`CompletionClient`] backed by an edgequake-llm provider.
///
/// The prompt is sent as a single user message.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CompletionClient for ProviderClient {
    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ClientError> {
        let messages = vec![ChatMessage::user(prompt)];
        let options = CompletionOptions {
            temperature: Some(settings.temperature),
            max_tokens: Some(settings.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| e.to_string())?;

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
        .min(MAX_BACKOFF_MS)
}

/// Send one prompt, retrying transport failures per the config.
///
/// Returns the completion and the number of retries it took.
pub async fn request_completion(
    client: &dyn CompletionClient,
    document: &str,
    prompt: &str,
    config: &ExtractionConfig,
) -> Result<(Completion, u32), DocumentError> {
    let settings = CompletionSettings::from_config(config);
    let limit = Duration::from_secs(config.api_timeout_secs);
    let start = Instant::now();
    let mut last_err = String::new();

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                document, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(limit, client.complete(prompt, &settings)).await {
            Ok(Ok(completion)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    document,
                    completion.input_tokens,
                    completion.output_tokens,
                    start.elapsed()
                );
                return Ok((completion, attempt));
            }
            Ok(Err(e)) => {
                warn!("{}: model attempt {} failed: {}", document, attempt + 1, e);
                last_err = e.to_string();
            }
            Err(_) => {
                warn!(
                    "{}: model attempt {} timed out after {}s",
                    document,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = format!("timed out after {}s", config.api_timeout_secs);
            }
        }
    }

    Err(DocumentError::ModelService {
        attempts: config.max_retries + 1,
        detail: last_err,
    })
}

/// Resolve the completion client, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.client`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), created through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_client(config: &ExtractionConfig) -> Result<Arc<dyn CompletionClient>, Pdf2TableError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2TableError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(ProviderClient::new(llm_provider)))
}

fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn CompletionClient>, Pdf2TableError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2TableError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(ProviderClient::new(provider)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then answers.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CompletionClient for Flaky {
        async fn complete(
            &self,
            _prompt: &str,
            settings: &CompletionSettings,
        ) -> Result<Completion, ClientError> {
            assert_eq!(settings.temperature, 0.0);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err("HTTP 429 rate limited".into())
            } else {
                Ok(Completion::text("[]"))
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl CompletionClient for Stalled {
        async fn complete(
            &self,
            _prompt: &str,
            _settings: &CompletionSettings,
        ) -> Result<Completion, ClientError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(Completion::text("[]"))
        }
    }

    #[tokio::test]
    async fn single_attempt_by_default() {
        let client = Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
        };
        let config = ExtractionConfig::default();
        let err = request_completion(&client, "a.pdf", "p", &config)
            .await
            .unwrap_err();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            err,
            DocumentError::ModelService {
                attempts: 1,
                detail: "HTTP 429 rate limited".into()
            }
        );
    }

    #[tokio::test]
    async fn retries_with_backoff_until_success() {
        let client = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let config = ExtractionConfig::builder()
            .max_retries(3)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let (completion, retries) = request_completion(&client, "a.pdf", "p", &config)
            .await
            .unwrap();
        assert_eq!(completion.content, "[]");
        assert_eq!(retries, 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out() {
        let config = ExtractionConfig::builder().api_timeout_secs(5).build().unwrap();
        let err = request_completion(&Stalled, "a.pdf", "p", &config)
            .await
            .unwrap_err();
        match err {
            DocumentError::ModelService { detail, .. } => assert!(detail.contains("timed out")),
            other => panic!("expected ModelService, got {other:?}"),
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1_000);
        assert_eq!(backoff_ms(500, 4), 4_000);
        assert_eq!(backoff_ms(500, 30), MAX_BACKOFF_MS);
        // 2^64 does not fit a u64; must not panic or wrap.
        assert_eq!(backoff_ms(500, 65), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, 2), MAX_BACKOFF_MS);
    }

    #[test]
    fn settings_follow_config() {
        let config = ExtractionConfig::builder().max_tokens(1000).build().unwrap();
        let s = CompletionSettings::from_config(&config);
        assert_eq!(s.temperature, 0.0);
        assert_eq!(s.max_tokens, 1000);
    }

    #[test]
    fn injected_client_takes_priority() {
        let client: Arc<dyn CompletionClient> = Arc::new(Stalled);
        let config = ExtractionConfig::builder()
            .client(Arc::clone(&client))
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let resolved = resolve_client(&config).unwrap();
        assert!(Arc::ptr_eq(&resolved, &client));
    }
}
