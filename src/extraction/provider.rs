//! LLM provider trait and environment-driven provider selection
//!
//! Selection is env-var gated and first-match-wins, the same shape as
//! `dashflow-factories::create_llm`'s provider priority list, but with no
//! runtime fallback between providers once one is selected — a failed call
//! is a failed call, not a cue to try a different backend mid-document.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(
        "no LLM provider configured: set OPENROUTER_API_KEY, or AWS_ACCESS_KEY_ID and AWS_REGION"
    )]
    NotConfigured,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("response parse error: {0}")]
    ResponseParse(String),
}

/// A completed call's text and, when the provider reports them, token counts.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn model_id(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<ProviderResponse, ProviderError>;
}

/// Pick a provider from environment variables. OpenRouter is tried first;
/// AWS Bedrock second; neither present is a configuration error, not a
/// silent no-op.
pub fn provider_from_env() -> Result<Box<dyn LlmProvider>, ProviderError> {
    if let Ok(api_key) = std::env::var("OPENROUTER_API_KEY") {
        let model = std::env::var("OPENROUTER_MODEL_NAME")
            .unwrap_or_else(|_| "openrouter/auto".to_string());
        return Ok(Box::new(super::openrouter::OpenRouterProvider::new(
            api_key, model,
        )));
    }

    if std::env::var("AWS_ACCESS_KEY_ID").is_ok() {
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let model = std::env::var("BEDROCK_MODEL_NAME")
            .unwrap_or_else(|_| "anthropic.claude-3-sonnet-20240229-v1:0".to_string());
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();
        return Ok(Box::new(super::bedrock::BedrockProvider::new(
            region,
            model,
            access_key,
            secret_key,
            session_token,
        )));
    }

    Err(ProviderError::NotConfigured)
}

#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic provider for tests: returns a queued response per call,
    /// or the last one repeated once the queue is drained.
    pub struct MockProvider {
        responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
        model: String,
    }

    impl MockProvider {
        pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                model: "mock-model".to_string(),
            }
        }

        pub fn text(text: impl Into<String>) -> Self {
            Self::new(vec![Ok(ProviderResponse {
                text: text.into(),
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
            })])
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn model_id(&self) -> &str {
            &self.model
        }

        async fn complete(&self, _prompt: &str) -> Result<ProviderResponse, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else if let Some(last) = responses.first() {
                match last {
                    Ok(r) => Ok(r.clone()),
                    Err(_) => Err(ProviderError::RequestFailed("mocked failure".to_string())),
                }
            } else {
                Err(ProviderError::RequestFailed("mock exhausted".to_string()))
            }
        }
    }
}
