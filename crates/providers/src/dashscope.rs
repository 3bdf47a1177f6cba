//! DashScope provider implementation.
//!
//! Talks to the hosted text-generation and text-embedding services:
//! - `POST {base}/services/aigc/text-generation/generation`
//! - `POST {base}/services/embeddings/text-embedding/text-embedding`
//!
//! The generation endpoint answers in one of two shapes: a flat
//! `output.text`, or OpenAI-style `output.choices[]` (used when tools are
//! attached). The flat text wins when both are present.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shopdesk_core::error::ProviderError;
use shopdesk_core::message::{Message, MessageToolCall, Role};
use shopdesk_core::provider::*;
use std::time::Duration;
use tracing::{debug, warn};

const GENERATION_PATH: &str = "services/aigc/text-generation/generation";
const EMBEDDING_PATH: &str = "services/embeddings/text-embedding/text-embedding";

/// A DashScope-compatible completion and embedding provider.
pub struct DashScopeProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl DashScopeProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build a provider from the `[provider]` config section.
    pub fn from_config(
        api_key: impl Into<String>,
        config: &shopdesk_config::ProviderConfig,
    ) -> Result<Self, ProviderError> {
        Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        kind: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                kind: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn generation_body(request: &ProviderRequest) -> serde_json::Value {
        let mut parameters = serde_json::json!({ "temperature": request.temperature });
        if let Some(top_p) = request.top_p {
            parameters["top_p"] = serde_json::json!(top_p);
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "input": { "messages": Self::to_api_messages(&request.messages) },
        });

        if !request.tools.is_empty() {
            parameters["result_format"] = serde_json::json!("message");
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body["parameters"] = parameters;
        body
    }

    /// POST a JSON body and decode the response, mapping transport, status
    /// and in-body error codes to [`ProviderError`].
    async fn post<T>(&self, path: &str, body: &serde_json::Value) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + HasErrorCode,
    {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let success = response.status().is_success();
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if status == 429 {
            return Err(ProviderError::RateLimited(text));
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !success {
            warn!(status, body = %text, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: text,
            });
        }

        let decoded: T = serde_json::from_str(&text)
            .map_err(|e| ProviderError::MalformedResponse(format!("{e}: {text}")))?;

        if let Some((code, message)) = decoded.error_code() {
            warn!(%code, %message, "Provider returned error code");
            return Err(ProviderError::Upstream { code, message });
        }

        Ok(decoded)
    }
}

#[async_trait]
impl shopdesk_core::Provider for DashScopeProvider {
    fn name(&self) -> &str {
        "dashscope"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::generation_body(&request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let api_response: GenerationResponse = self.post(GENERATION_PATH, &body).await?;
        let response = api_response.into_provider_response(&request.model)?;

        debug!(
            request_id = response.request_id.as_deref().unwrap_or("-"),
            finish_reason = response.finish_reason.as_deref().unwrap_or("-"),
            "Completion received"
        );
        Ok(response)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let body = serde_json::json!({
            "model": request.model,
            "input": { "texts": request.inputs },
        });

        debug!(
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let api_response: EmbeddingApiResponse = self.post(EMBEDDING_PATH, &body).await?;
        let embeddings = order_embeddings(api_response.output.embeddings, request.inputs.len())?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.total_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: request.model,
            usage,
        })
    }
}

/// Place each returned vector at its `text_index`. Every input slot must be
/// filled exactly once.
fn order_embeddings(
    items: Vec<ApiEmbedding>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let slot = slots.get_mut(item.text_index).ok_or_else(|| {
            ProviderError::MalformedResponse(format!(
                "embedding text_index {} out of range for {expected} inputs",
                item.text_index
            ))
        })?;
        *slot = Some(item.embedding);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| {
                ProviderError::MalformedResponse(format!("no embedding returned for input {i}"))
            })
        })
        .collect()
}

// --- DashScope API types (internal) ---

trait HasErrorCode {
    /// A non-empty code other than "Success" in an HTTP 200 body.
    fn error_code(&self) -> Option<(String, String)>;
}

fn body_error(code: &Option<String>, message: &Option<String>) -> Option<(String, String)> {
    match code.as_deref() {
        Some(code) if !code.is_empty() && code != "Success" => {
            Some((code.to_string(), message.clone().unwrap_or_default()))
        }
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunction,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    #[serde(rename = "type")]
    kind: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    output: Option<GenerationOutput>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl HasErrorCode for GenerationResponse {
    fn error_code(&self) -> Option<(String, String)> {
        body_error(&self.code, &self.message)
    }
}

impl GenerationResponse {
    fn into_provider_response(self, model: &str) -> Result<ProviderResponse, ProviderError> {
        let output = self
            .output
            .ok_or_else(|| ProviderError::MalformedResponse("response has no output".into()))?;

        let flat_text = output.text.filter(|text| !text.is_empty());
        let first_choice = output.choices.into_iter().next();

        if flat_text.is_none() && first_choice.is_none() {
            return Err(ProviderError::MalformedResponse(
                "response has neither output.text nor choices".into(),
            ));
        }

        let (choice_content, tool_calls, choice_finish) = match first_choice {
            Some(choice) => (
                choice.message.content,
                choice
                    .message
                    .tool_calls
                    .into_iter()
                    .map(|tc| MessageToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    })
                    .collect(),
                choice.finish_reason,
            ),
            None => (None, Vec::new(), None),
        };

        let message = Message {
            role: Role::Assistant,
            content: flat_text.or(choice_content).unwrap_or_default(),
            tool_calls,
            tool_call_id: None,
        };

        let usage = self.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.total_tokens.unwrap_or(u.input_tokens + u.output_tokens),
        });

        Ok(ProviderResponse {
            message,
            finish_reason: choice_finish.or(output.finish_reason),
            usage,
            model: model.to_string(),
            request_id: self.request_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    #[serde(default)]
    output: EmbeddingOutput,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingOutput {
    #[serde(default)]
    embeddings: Vec<ApiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    embedding: Vec<f32>,
    text_index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    total_tokens: u32,
}

impl HasErrorCode for EmbeddingApiResponse {
    fn error_code(&self) -> Option<(String, String)> {
        body_error(&self.code, &self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use shopdesk_core::Provider;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Option<serde_json::Value>>>;

    /// Serve a single canned response on both endpoints, recording the last body.
    async fn mock_endpoint(status: StatusCode, reply: serde_json::Value) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(None));
        let handler = {
            move |State(captured): State<Captured>, Json(body): Json<serde_json::Value>| {
                let reply = reply.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    (status, Json(reply))
                }
            }
        };
        let router = Router::new()
            .route(&format!("/{GENERATION_PATH}"), post(handler.clone()))
            .route(&format!("/{EMBEDDING_PATH}"), post(handler))
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    fn provider(base_url: &str) -> DashScopeProvider {
        DashScopeProvider::new(base_url, "sk-test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn generation_body_plain() {
        let mut request = ProviderRequest::new(
            "qwen-max",
            vec![Message::system("rules"), Message::user("你好")],
        );
        request.top_p = Some(0.8);
        let body = DashScopeProvider::generation_body(&request);

        assert_eq!(body["model"], "qwen-max");
        assert_eq!(body["input"]["messages"][0]["role"], "system");
        assert_eq!(body["input"]["messages"][1]["content"], "你好");
        assert!((body["parameters"]["top_p"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!(body.get("tools").is_none());
        assert!(body["parameters"].get("result_format").is_none());
    }

    #[test]
    fn generation_body_with_tools_requests_message_format() {
        let mut request = ProviderRequest::new("qwen-max", vec![Message::user("查订单")]);
        request.tools.push(ToolDefinition {
            name: "query_order".into(),
            description: "Look up an order".into(),
            parameters: serde_json::json!({"type": "object"}),
        });
        let body = DashScopeProvider::generation_body(&request);

        assert_eq!(body["parameters"]["result_format"], "message");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "query_order");
    }

    #[test]
    fn flat_text_is_authoritative() {
        let api: GenerationResponse = serde_json::from_value(serde_json::json!({
            "request_id": "req-1",
            "output": {
                "text": "flat reply",
                "finish_reason": "stop",
                "choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": "choice reply"}}]
            },
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();
        let response = api.into_provider_response("qwen-max").unwrap();

        assert_eq!(response.message.content, "flat reply");
        assert_eq!(response.request_id.as_deref(), Some("req-1"));
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn choice_shape_carries_tool_calls() {
        let api: GenerationResponse = serde_json::from_value(serde_json::json!({
            "output": {
                "choices": [{
                    "finish_reason": "tool_calls",
                    "message": {
                        "role": "assistant",
                        "content": "",
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "query_order", "arguments": "{\"orderNumber\":\"ORD-1\"}"}
                        }]
                    }
                }]
            }
        }))
        .unwrap();
        let response = api.into_provider_response("qwen-max").unwrap();

        assert!(response.wants_tool_calls());
        assert_eq!(response.message.tool_calls[0].name, "query_order");
        assert!(response.message.tool_calls[0].arguments.contains("ORD-1"));
    }

    #[test]
    fn empty_output_is_malformed() {
        let api: GenerationResponse =
            serde_json::from_value(serde_json::json!({"output": {"choices": []}})).unwrap();
        let err = api.into_provider_response("qwen-max").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn embeddings_are_reordered_by_text_index() {
        let items = vec![
            ApiEmbedding { embedding: vec![2.0], text_index: 1 },
            ApiEmbedding { embedding: vec![1.0], text_index: 0 },
        ];
        let ordered = order_embeddings(items, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn embedding_gaps_are_rejected() {
        let missing = vec![ApiEmbedding { embedding: vec![1.0], text_index: 0 }];
        assert!(order_embeddings(missing, 2).is_err());

        let out_of_range = vec![ApiEmbedding { embedding: vec![1.0], text_index: 5 }];
        assert!(order_embeddings(out_of_range, 1).is_err());
    }

    #[tokio::test]
    async fn complete_over_http() {
        let (url, captured) = mock_endpoint(
            StatusCode::OK,
            serde_json::json!({"output": {"text": "您好！", "finish_reason": "stop"}, "request_id": "r"}),
        )
        .await;

        let response = provider(&url)
            .complete(ProviderRequest::new("qwen-max", vec![Message::user("你好")]))
            .await
            .unwrap();

        assert_eq!(response.message.content, "您好！");
        let sent = captured.lock().unwrap().clone().unwrap();
        assert_eq!(sent["input"]["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn non_200_is_api_error() {
        let (url, _) = mock_endpoint(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"code": "InternalError", "message": "boom"}),
        )
        .await;

        let err = provider(&url)
            .complete(ProviderRequest::new("qwen-max", vec![Message::user("hi")]))
            .await
            .unwrap_err();

        match err {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 500);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn any_2xx_status_is_success() {
        let (url, _) = mock_endpoint(
            StatusCode::ACCEPTED,
            serde_json::json!({"output": {"text": "好的", "finish_reason": "stop"}}),
        )
        .await;

        let response = provider(&url)
            .complete(ProviderRequest::new("qwen-max", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.message.content, "好的");
    }

    #[tokio::test]
    async fn error_code_in_200_body_is_upstream_error() {
        let (url, _) = mock_endpoint(
            StatusCode::OK,
            serde_json::json!({"code": "DataInspectionFailed", "message": "blocked"}),
        )
        .await;

        let err = provider(&url)
            .complete(ProviderRequest::new("qwen-max", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { ref code, .. } if code == "DataInspectionFailed"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failed() {
        let (url, _) = mock_endpoint(StatusCode::UNAUTHORIZED, serde_json::json!({})).await;
        let err = provider(&url)
            .complete(ProviderRequest::new("qwen-max", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn embed_over_http() {
        let (url, captured) = mock_endpoint(
            StatusCode::OK,
            serde_json::json!({
                "output": {"embeddings": [
                    {"embedding": [0.5, 0.5], "text_index": 1},
                    {"embedding": [0.1, 0.2], "text_index": 0}
                ]},
                "usage": {"total_tokens": 4}
            }),
        )
        .await;

        let response = provider(&url)
            .embed(EmbeddingRequest {
                model: "text-embedding-v2".into(),
                inputs: vec!["退货".into(), "运费".into()],
            })
            .await
            .unwrap();

        assert_eq!(response.embeddings, vec![vec![0.1, 0.2], vec![0.5, 0.5]]);
        let sent = captured.lock().unwrap().clone().unwrap();
        assert_eq!(sent["input"]["texts"][1], "运费");
    }
}
