//! Route handlers and their wire types.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use shopdesk_agent::ChatTurn;
use shopdesk_agent::prompt::{COMPLETION_FAILURE_REPLY, INVALID_REQUEST_REPLY};
use shopdesk_core::message::Message;

use crate::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Prior turns as `{role, content}`, oldest first.
    #[serde(default)]
    pub history: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

pub async fn chat(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection, "Rejected chat request");
        api_error(StatusCode::BAD_REQUEST, INVALID_REQUEST_REPLY)
    })?;
    if request.message.trim().is_empty() {
        warn!("Rejected chat request with blank message");
        return Err(api_error(StatusCode::BAD_REQUEST, INVALID_REQUEST_REPLY));
    }

    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(
        session = %session_id,
        user = request.user_id.as_deref().unwrap_or("-"),
        history = request.history.len(),
        "Chat request"
    );

    let turn = ChatTurn::new(request.message).with_history(request.history);
    match state.orchestrator.respond(&turn).await {
        Ok(reply) => Ok(Json(ChatResponse { reply, session_id })),
        Err(e) => {
            error!(session = %session_id, error = %e, "Chat turn failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, COMPLETION_FAILURE_REPLY))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<String>,
    pub count: usize,
}

/// Names of the tools the sidecar currently offers.
pub async fn tools(State(state): State<SharedState>) -> Result<Json<ToolListResponse>, ApiError> {
    match state.tools.list_tools().await {
        Ok(definitions) => {
            let tools: Vec<String> = definitions.into_iter().map(|d| d.name).collect();
            Ok(Json(ToolListResponse {
                count: tools.len(),
                tools,
            }))
        }
        Err(e) => {
            warn!(error = %e, "Listing tools failed");
            Err(api_error(StatusCode::BAD_GATEWAY, &e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Map, Value, json};
    use tower::ServiceExt;

    use shopdesk_agent::{Orchestrator, TurnSettings};
    use shopdesk_core::error::{ProviderError, ToolError};
    use shopdesk_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
    use shopdesk_core::tool::ToolGateway;

    use crate::{AppState, build_router};

    struct FixedProvider {
        reply: Result<String, ProviderError>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait::async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let text = self.reply.clone()?;
            Ok(ProviderResponse {
                message: shopdesk_core::Message::assistant(text),
                finish_reason: Some("stop".into()),
                usage: None,
                model: "fixed".into(),
                request_id: None,
            })
        }
    }

    struct FixedTools {
        result: Result<String, ToolError>,
    }

    #[async_trait::async_trait]
    impl ToolGateway for FixedTools {
        async fn call_tool(&self, _name: &str, _arguments: &Map<String, Value>) -> Result<String, ToolError> {
            self.result.clone()
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
            Ok(["search_product", "create_order"]
                .into_iter()
                .map(|name| ToolDefinition {
                    name: name.into(),
                    description: String::new(),
                    parameters: json!({"type": "object"}),
                })
                .collect())
        }
    }

    fn app(reply: Result<&str, ProviderError>, tool: Result<&str, ToolError>) -> (axum::Router, Arc<FixedProvider>) {
        let provider = Arc::new(FixedProvider {
            reply: reply.map(String::from),
            requests: Mutex::new(Vec::new()),
        });
        let tools: Arc<dyn ToolGateway> = Arc::new(FixedTools {
            result: tool.map(String::from),
        });
        let state = Arc::new(AppState {
            orchestrator: Orchestrator::new(provider.clone(), tools.clone(), TurnSettings::default()),
            tools,
        });
        (build_router(state, 1024 * 1024), provider)
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (app, _) = app(Ok("unused"), Ok("unused"));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn chat_echoes_session_id() {
        let (app, provider) = app(Ok("您好，有什么可以帮您？"), Ok("unused"));
        let body = json!({
            "message": "你好",
            "userId": "u-1",
            "sessionId": "s-42",
            "history": [{"role": "assistant", "content": "欢迎光临"}, {"role": "user", "content": "你好"}]
        });

        let response = app.oneshot(post_chat(&body.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"reply": "您好，有什么可以帮您？", "sessionId": "s-42"})
        );

        let sent = &provider.requests.lock().unwrap()[0].messages;
        let contents: Vec<&str> = sent.iter().skip(1).map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["欢迎光临", "你好"]);
    }

    #[tokio::test]
    async fn missing_session_id_is_generated() {
        let (app, _) = app(Ok("hi"), Ok("unused"));
        let response = app.oneshot(post_chat(r#"{"message": "hello"}"#)).await.unwrap();

        let body = body_json(response).await;
        let session = body["sessionId"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(session).is_ok());
    }

    #[tokio::test]
    async fn invalid_requests_are_400() {
        for body in [
            "not json",
            r#"{"userId": "u-1"}"#,
            r#"{"message": "   "}"#,
            r#"{"message": "hi", "history": [{"role": "robot", "content": "x"}]}"#,
        ] {
            let (app, _) = app(Ok("unused"), Ok("unused"));
            let response = app.oneshot(post_chat(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(body_json(response).await, json!({"error": "无效的请求"}));
        }
    }

    #[tokio::test]
    async fn completion_failure_is_500() {
        let (app, _) = app(Err(ProviderError::Network("connection refused".into())), Ok("unused"));
        let response = app.oneshot(post_chat(r#"{"message": "hello"}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"error": "处理失败,请稍后再试"}));
    }

    #[tokio::test]
    async fn tool_failure_is_still_200() {
        let directive = "<func_call><tool_name>query_order</tool_name><arguments><orderNumber>ORD-1</orderNumber></arguments></func_call>";
        let (app, _) = app(
            Ok(directive),
            Err(ToolError::CallFailed {
                code: -32000,
                message: "订单不存在".into(),
            }),
        );
        let response = app
            .oneshot(post_chat(r#"{"message": "查询订单 ORD-1", "sessionId": "s"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["reply"], "抱歉，订单处理失败: tool call failed (-32000): 订单不存在");
    }

    #[tokio::test]
    async fn tools_lists_names() {
        let (app, _) = app(Ok("unused"), Ok("unused"));
        let req = Request::builder().uri("/tools").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            body_json(response).await,
            json!({"tools": ["search_product", "create_order"], "count": 2})
        );
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let (app, _) = app(Ok("unused"), Ok("unused"));
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://shop.example")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
