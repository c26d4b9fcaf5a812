//! HTTP 接口
//!
//! | 方法 | 路径 | 说明 |
//! |------|------|------|
//! | POST | `/tick`、`/api/autonomous/tick` | 执行一次 tick（需共享密钥） |
//! | GET  | `/status`、`/api/autonomous/status` | 队列与运行状态（只读） |
//! | GET  | `/learnings` | learnings 与效果统计（只读） |
//! | POST | `/api/autonomy` | 打开或关闭自主模式（需共享密钥） |
//! | GET  | `/api/health` | 存活检查 |
//! | GET  | `/api/llm/status`、`/api/groq/status` | LLM 配置情况 |
//! | POST | `/api/chat`、`/api/groq` | 直通 LLM 对话（需共享密钥） |
//!
//! 所有错误（包括请求体解析失败）都以 `{"error": ...}` JSON 返回。

use crate::error::{AutopilotError, ConfigError, Result};
use crate::llm::CompletionOptions;
use crate::llm::types::Message;
use crate::tick::{LearningsReport, StatusReport, TickEngine, TickReport};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const CHAT_SYSTEM_PROMPT: &str = "You are the assistant of an autonomous task service. Answer concisely.";
const CHAT_DEFAULT_PROMPT: &str = "Hello";

pub struct AppState {
    pub engine: TickEngine,
    /// 未配置时写接口不做校验
    pub api_secret: Option<String>,
}

impl AppState {
    pub fn new(engine: TickEngine, api_secret: Option<String>) -> Self {
        Self {
            engine,
            api_secret: api_secret.filter(|s| !s.is_empty()),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> std::result::Result<(), AppError> {
        let Some(secret) = self.api_secret.as_deref() else {
            return Ok(());
        };
        let from_authorization = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim());
        let from_api_key = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim());

        if from_authorization == Some(secret) || from_api_key == Some(secret) {
            Ok(())
        } else {
            warn!("🔒 拒绝未授权的请求");
            Err(AppError::new(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tick", post(run_tick))
        .route("/api/autonomous/tick", post(run_tick))
        .route("/status", get(status))
        .route("/api/autonomous/status", get(status))
        .route("/learnings", get(learnings))
        .route("/api/autonomy", post(set_autonomy))
        .route("/api/health", get(health))
        .route("/api/llm/status", get(llm_status))
        .route("/api/groq/status", get(llm_status))
        .route("/api/chat", post(chat))
        .route("/api/groq", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, bind_addr: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "🚀 HTTP 服务已启动");
    axum::serve(listener, app).await?;
    Ok(())
}

// ─── 错误 ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<AutopilotError> for AppError {
    fn from(err: AutopilotError) -> Self {
        let status = match &err {
            AutopilotError::Config(ConfigError::MissingCredential(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AutopilotError::Llm(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

type ApiResult<T> = std::result::Result<Json<T>, AppError>;

/// 请求体提取结果；先校验密钥再展开，解析失败同样返回 JSON 错误
type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

// ─── Tick ────────────────────────────────────────────────────────────────

async fn run_tick(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<TickReport> {
    state.authorize(&headers)?;
    let report = state.engine.tick().await?;
    if let Some(summary) = report.summary().filter(|s| !s.memory_written) {
        warn!(tick = %summary.tick_id, error = ?summary.write_error, "⚠️ tick 结果未写回记忆");
    }
    Ok(Json(report))
}

async fn status(State(state): State<Arc<AppState>>) -> ApiResult<StatusReport> {
    Ok(Json(state.engine.status().await?))
}

async fn learnings(State(state): State<Arc<AppState>>) -> ApiResult<LearningsReport> {
    Ok(Json(state.engine.learnings().await?))
}

#[derive(Deserialize)]
struct AutonomyRequest {
    enabled: bool,
}

async fn set_autonomy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: JsonBody<AutonomyRequest>,
) -> ApiResult<StatusReport> {
    state.authorize(&headers)?;
    let Json(req) = body?;
    Ok(Json(state.engine.set_autonomous_mode(req.enabled).await?))
}

// ─── Health & LLM ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
struct LlmStatusResponse {
    configured: bool,
    model: Option<String>,
}

async fn llm_status(State(state): State<Arc<AppState>>) -> Json<LlmStatusResponse> {
    let llm = state.engine.llm();
    Json(LlmStatusResponse {
        configured: llm.is_some(),
        model: llm.map(|l| l.model_name().to_string()),
    })
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    model: String,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: JsonBody<ChatRequest>,
) -> ApiResult<ChatResponse> {
    state.authorize(&headers)?;
    let Json(req) = body?;
    let llm = state.engine.llm().ok_or_else(|| {
        AppError::from(AutopilotError::from(ConfigError::MissingCredential(
            "no LLM model configured".to_string(),
        )))
    })?;

    // 显式 messages 优先，否则使用 prompt（缺省为 "Hello"）
    let messages = if req.messages.is_empty() {
        vec![Message::user(
            req.prompt.unwrap_or_else(|| CHAT_DEFAULT_PROMPT.to_string()),
        )]
    } else {
        req.messages
    };

    let model = req
        .model
        .clone()
        .unwrap_or_else(|| llm.model_name().to_string());
    let options = CompletionOptions {
        model: req.model,
        max_tokens: req.max_tokens,
    };
    let system = req.system.as_deref().unwrap_or(CHAT_SYSTEM_PROMPT);
    let response = llm.complete_with(system, messages, options).await?;
    Ok(Json(ChatResponse { response, model }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TickConfig;
    use crate::error::StoreError;
    use crate::handlers::HandlerRegistry;
    use crate::memory::{DocumentStore, InMemoryDocumentStore, MemoryDocument, Revision};
    use crate::testing::MockLlmClient;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    struct UnreachableStore;

    #[async_trait]
    impl DocumentStore for UnreachableStore {
        async fn load(&self) -> Result<(MemoryDocument, Revision)> {
            Err(StoreError::Transient("503 from upstream".to_string()).into())
        }

        async fn save(&self, _: &MemoryDocument, _: Option<&Revision>) -> Result<Revision> {
            Err(StoreError::Transient("503 from upstream".to_string()).into())
        }

        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    fn engine(store: Arc<dyn DocumentStore>) -> TickEngine {
        TickEngine::new(
            store,
            Arc::new(HandlerRegistry::with_builtin()),
            TickConfig::default(),
        )
    }

    fn app_with(engine: TickEngine, secret: Option<&str>) -> Router {
        router(Arc::new(AppState::new(engine, secret.map(String::from))))
    }

    fn app(secret: Option<&str>) -> Router {
        app_with(engine(Arc::new(InMemoryDocumentStore::new())), secret)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_to(uri: &str) -> axum::http::request::Builder {
        Request::builder().method("POST").uri(uri)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let response = app(None)
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "alive");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn tick_then_status() {
        let app = app(None);

        let response = app
            .clone()
            .oneshot(post_to("/tick").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["taskSource"], "fallback");
        assert_eq!(json["memoryWritten"], true);
        assert_eq!(json["tasksSpawned"], 3);

        let response = app
            .oneshot(Request::builder().uri("/api/autonomous/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["pendingCount"], 3);
        assert_eq!(json["totalTicks"], 1);
        assert_eq!(json["nextTask"]["type"], "health_check");
    }

    #[tokio::test]
    async fn tick_requires_secret_when_configured() {
        let app = app(Some("s3cret"));

        let response = app
            .clone()
            .oneshot(post_to("/tick").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Unauthorized");

        let response = app
            .clone()
            .oneshot(
                post_to("/tick")
                    .header("authorization", "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                post_to("/api/autonomous/tick")
                    .header("authorization", "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                post_to("/tick")
                    .header("x-api-key", "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_is_open_even_with_secret() {
        let response = app(Some("s3cret"))
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["autonomousMode"], true);
        assert_eq!(json["pendingCount"], 0);
    }

    #[tokio::test]
    async fn store_failure_returns_json_error() {
        let app = app_with(engine(Arc::new(UnreachableStore)), None);

        let response = app
            .clone()
            .oneshot(post_to("/tick").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("Store unavailable"));

        let response = app
            .oneshot(Request::builder().uri("/learnings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn learnings_after_tick() {
        let app = app(None);
        app.clone()
            .oneshot(post_to("/tick").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/learnings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(!json["learnings"].as_array().unwrap().is_empty());
        assert_eq!(
            json["structuredLearnings"][0]["taskType"],
            "self_reflection"
        );
        assert_eq!(json["taskEffectiveness"]["self_reflection"]["totalRuns"], 1);
    }

    #[tokio::test]
    async fn autonomy_toggle_skips_ticks() {
        let app = app(None);

        let response = app
            .clone()
            .oneshot(
                post_to("/api/autonomy")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"enabled": false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["autonomousMode"], false);

        let response = app
            .oneshot(post_to("/tick").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "skipped");
    }

    #[tokio::test]
    async fn llm_status_unconfigured() {
        let response = app(None)
            .oneshot(Request::builder().uri("/api/llm/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["configured"], false);
        assert!(json["model"].is_null());
    }

    #[tokio::test]
    async fn chat_without_llm_is_unavailable() {
        let response = app(None)
            .oneshot(
                post_to("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"prompt": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn chat_passes_through_to_llm() {
        let llm = Arc::new(MockLlmClient::new().with_response("hello there"));
        let engine = engine(Arc::new(InMemoryDocumentStore::new())).with_llm(llm.clone());
        let app = app_with(engine, None);

        let response = app
            .clone()
            .oneshot(
                post_to("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"prompt": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["response"], "hello there");
        assert_eq!(json["model"], "mock-model");
        assert_eq!(llm.last_system_prompt().as_deref(), Some(CHAT_SYSTEM_PROMPT));

        let response = app
            .oneshot(
                post_to("/api/groq")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"messages": [{"role": "user", "content": "ping"}], "model": "llama-3.1-8b-instant", "max_tokens": 64}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(
            llm.last_options().unwrap(),
            CompletionOptions {
                model: Some("llama-3.1-8b-instant".to_string()),
                max_tokens: Some(64),
            }
        );
        let messages = llm.last_messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn chat_defaults_to_hello() {
        let llm = Arc::new(MockLlmClient::new().with_response("hi!"));
        let engine = engine(Arc::new(InMemoryDocumentStore::new())).with_llm(llm.clone());

        let response = app_with(engine, None)
            .oneshot(
                post_to("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let messages = llm.last_messages().unwrap();
        assert_eq!(messages, vec![Message::user("Hello".to_string())]);
        assert_eq!(llm.last_options().unwrap(), CompletionOptions::default());
    }

    #[tokio::test]
    async fn groq_status_alias() {
        let llm = Arc::new(MockLlmClient::new());
        let engine = engine(Arc::new(InMemoryDocumentStore::new())).with_llm(llm);

        let response = app_with(engine, None)
            .oneshot(Request::builder().uri("/api/groq/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["configured"], true);
        assert_eq!(json["model"], "mock-model");
    }

    #[tokio::test]
    async fn malformed_bodies_return_json_errors() {
        let app = app(None);

        // 缺少 content-type
        let response = app
            .clone()
            .oneshot(post_to("/api/autonomy").body(Body::from(r#"{"enabled": false}"#)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body_json(response).await["error"].is_string());

        // 不是 JSON
        let response = app
            .clone()
            .oneshot(
                post_to("/api/autonomy")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());

        // 字段类型错误
        let response = app
            .clone()
            .oneshot(
                post_to("/api/autonomy")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"enabled": "yes"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["error"].is_string());

        let response = app
            .oneshot(
                post_to("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from("{broken"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn secret_checked_before_body() {
        let response = app(Some("s3cret"))
            .oneshot(post_to("/api/autonomy").body(Body::from("not json")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Unauthorized");
    }
}
