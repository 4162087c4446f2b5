//! OpenAI-compatible chat completions backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use siteadvisor_shared::{GenerationConfig, Result, SiteAdvisorError, read_secret};

use crate::{GenerationRequest, TextGeneration};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// [`TextGeneration`] over `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("SiteAdvisor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| SiteAdvisorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from config; `Ok(None)` when the API key env var is unset.
    pub fn from_config(config: &GenerationConfig) -> Result<Option<Self>> {
        let Some(api_key) = read_secret(&config.api_key_env) else {
            return Ok(None);
        };
        Self::new(
            &config.base_url,
            api_key,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    fn system_prompt(request: &GenerationRequest) -> String {
        match &request.schema {
            Some(schema) => format!(
                "{}\n\nRespond with a single JSON object that conforms to this JSON schema:\n{schema}",
                request.system
            ),
            None => request.system.clone(),
        }
    }
}

#[async_trait]
impl TextGeneration for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let system = Self::system_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            response_format: request
                .schema
                .as_ref()
                .map(|_| json!({"type": "json_object"})),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SiteAdvisorError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SiteAdvisorError::RateLimited(format!("{}: HTTP {status}", self.endpoint)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SiteAdvisorError::Generation(format!("HTTP {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SiteAdvisorError::parse(format!("chat completion response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SiteAdvisorError::Generation("empty completion".into()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatCompletionsClient {
        ChatCompletionsClient::new(
            &format!("{}/v1/", server.uri()),
            "sk-test",
            "test-model",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn completion(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[tokio::test]
    async fn sends_json_mode_request_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"items": []}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest::new("plan terms", "bearing")
            .with_schema(json!({"type": "object"}));
        let answer = client(&server).generate(&request).await.unwrap();

        assert_eq!(answer, r#"{"items": []}"#);
    }

    #[tokio::test]
    async fn plain_request_omits_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
            .mount(&server)
            .await;

        let answer = client(&server)
            .generate(&GenerationRequest::new("sys", "hi"))
            .await
            .unwrap();
        assert_eq!(answer, "hello");

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn error_status_is_a_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let result = client(&server).generate(&GenerationRequest::new("s", "u")).await;
        assert!(matches!(result, Err(SiteAdvisorError::Generation(msg)) if msg.contains("upstream down")));
    }

    #[tokio::test]
    async fn empty_choices_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let result = client(&server).generate(&GenerationRequest::new("s", "u")).await;
        assert!(matches!(result, Err(SiteAdvisorError::Generation(_))));
    }

    #[tokio::test]
    async fn rate_limit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = client(&server).generate(&GenerationRequest::new("s", "u")).await;
        assert!(matches!(result, Err(SiteAdvisorError::RateLimited(_))));
    }
}
