//! Per-document extraction: prompt → provider call → parsed result
//!
//! One automatic retry on parse failure, provider timeout, or transient
//! provider error. The consecutive-failure counter across documents lives
//! in the orchestrator, not here — this type only knows about one call.

use super::parser::{ParseError, ResponseParser};
use super::provider::{LlmProvider, ProviderError};
use super::types::{CallOutcome, ExtractionCallRecord, ExtractionResult};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("response parse error: {0}")]
    Parse(#[from] ParseError),
}

pub struct LlmExtractor {
    provider: Box<dyn LlmProvider>,
    timeout: Duration,
}

/// Truncation policy: documents longer than the provider's context
/// budget are cut deterministically from the tail, never skipped. Returns
/// the (possibly unchanged) text and whether truncation happened; the
/// caller is responsible for logging the warning with the document id,
/// since only it knows which document this is.
pub fn truncate_for_context(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let truncated: String = text.chars().take(max_chars).collect();
    (truncated, true)
}

/// Everything one `extract` call produced: the parsed result (if any
/// attempt succeeded), the call-by-call observability trail, and any
/// non-fatal parser warnings from the attempt that succeeded.
pub struct ExtractionOutcome {
    pub result: Result<ExtractionResult, ExtractionError>,
    pub calls: Vec<ExtractionCallRecord>,
    pub warnings: Vec<String>,
}

impl LlmExtractor {
    pub fn new(provider: Box<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn extract(&self, prompt: &str) -> ExtractionOutcome {
        match self.attempt(prompt).await {
            Ok((result, record, warnings)) => ExtractionOutcome {
                result: Ok(result),
                calls: vec![record],
                warnings,
            },
            Err((_err, record)) => {
                // One retry on any failure (timeout, transient provider error, bad JSON).
                match self.attempt(prompt).await {
                    Ok((result, record2, warnings)) => ExtractionOutcome {
                        result: Ok(result),
                        calls: vec![record, record2],
                        warnings,
                    },
                    Err((err2, record2)) => ExtractionOutcome {
                        result: Err(err2),
                        calls: vec![record, record2],
                        warnings: Vec::new(),
                    },
                }
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
    ) -> Result<(ExtractionResult, ExtractionCallRecord, Vec<String>), (ExtractionError, ExtractionCallRecord)> {
        let prompt_chars = prompt.chars().count();
        let started = Instant::now();
        let call = tokio::time::timeout(self.timeout, self.provider.complete(prompt)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let base_record = |outcome: CallOutcome, prompt_tokens: Option<u32>, completion_tokens: Option<u32>| {
            ExtractionCallRecord {
                provider: self.provider.name().to_string(),
                model_id: self.provider.model_id().to_string(),
                prompt_chars,
                elapsed_ms,
                prompt_tokens,
                completion_tokens,
                outcome,
            }
        };

        let response = match call {
            Err(_elapsed) => {
                let record = base_record(
                    CallOutcome::Failure("timed out".to_string()),
                    None,
                    None,
                );
                return Err((ExtractionError::Timeout(self.timeout), record));
            }
            Ok(Err(provider_err)) => {
                let record = base_record(CallOutcome::Failure(provider_err.to_string()), None, None);
                return Err((ExtractionError::Provider(provider_err), record));
            }
            Ok(Ok(response)) => response,
        };

        match ResponseParser::parse(&response.text) {
            Ok((result, warnings)) => {
                let record = base_record(
                    CallOutcome::Success,
                    response.prompt_tokens,
                    response.completion_tokens,
                );
                Ok((result, record, warnings))
            }
            Err(parse_err) => {
                let record = base_record(
                    CallOutcome::Failure(parse_err.to_string()),
                    response.prompt_tokens,
                    response.completion_tokens,
                );
                Err((ExtractionError::Parse(parse_err), record))
            }
        }
    }
}
