//! AWS Bedrock (Anthropic models) provider, SigV4-signed over `reqwest`

use super::provider::{LlmProvider, ProviderError, ProviderResponse};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use serde::Deserialize;
use serde_json::json;
use std::time::SystemTime;

pub struct BedrockProvider {
    client: reqwest::Client,
    region: String,
    model: String,
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
}

impl BedrockProvider {
    pub fn new(
        region: String,
        model: String,
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            region,
            model,
            access_key,
            secret_key,
            session_token,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
            self.region, self.model
        )
    }
}

#[derive(Deserialize)]
struct InvokeResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<BedrockUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct BedrockUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let body = json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 4096,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let payload = serde_json::to_vec(&body)
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let endpoint = self.endpoint();
        let credentials = Credentials::new(
            &self.access_key,
            &self.secret_key,
            self.session_token.clone(),
            None,
            "corpus-forge",
        );
        let identity = credentials.into();
        let signing_params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name("bedrock")
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?
            .into();

        let signable = SignableRequest::new(
            "POST",
            &endpoint,
            std::iter::once(("content-type", "application/json")),
            SignableBody::Bytes(&payload),
        )
        .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let (signing_instructions, _signature) = sign(signable, &signing_params)
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?
            .into_parts();

        let mut request = self
            .client
            .post(&endpoint)
            .header("content-type", "application/json")
            .body(payload);

        for (name, value) in signing_instructions.headers() {
            request = request.header(name, value);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "bedrock returned {}: {}",
                status, text
            )));
        }

        let parsed: InvokeResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::ResponseParse(e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| ProviderError::ResponseParse("no content blocks in response".to_string()))?;

        Ok(ProviderResponse {
            text,
            prompt_tokens: parsed.usage.as_ref().and_then(|u| u.input_tokens),
            completion_tokens: parsed.usage.as_ref().and_then(|u| u.output_tokens),
        })
    }
}
