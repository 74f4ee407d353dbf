//! Web 服务器模块
//!
//! 提供页面和 JSON API：配置读写、模型列表、对话、文件扫描、内置测试和调用历史

use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::application::orchestrator::Orchestrator;
use crate::core::config::ConfigUpdate;
use crate::core::types::{ChatMessage, ChatTurn};
use crate::errors::{ErrorDescription, GatewayError};
use crate::infrastructure::logger::RequestContext;

const INDEX_HTML: &str = include_str!("index.html");

/// 上传文件大小上限
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

// ==================== 错误响应 ====================

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDescription,
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation(_) | GatewayError::UnsupportedRegion(_) => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Connection(_) | GatewayError::Auth(_) | GatewayError::Protocol(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(kind = %self.kind(), "request failed: {}", self.message());
        } else {
            warn!(kind = %self.kind(), "request rejected: {}", self.message());
        }
        (
            status,
            Json(ErrorResponse {
                error: self.describe(),
            }),
        )
            .into_response()
    }
}

// 请求体、查询串解析失败统一按校验错误返回

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        GatewayError::Validation(format!("invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for GatewayError {
    fn from(rejection: MultipartRejection) -> Self {
        GatewayError::Validation(format!("invalid upload: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for GatewayError {
    fn from(rejection: QueryRejection) -> Self {
        GatewayError::Validation(format!("invalid query: {}", rejection.body_text()))
    }
}

// ==================== 状态 ====================

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

// ==================== 请求类型 ====================

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
pub struct ModelsQuery {
    pub base_url: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

// ==================== API 响应类型 ====================

#[derive(Serialize)]
pub struct ChatResponse {
    /// 交付给用户的助手消息
    pub message: ChatMessage,
    pub turn: ChatTurn,
}

// ==================== 处理器 ====================

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// 存活检查
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.health().await)
}

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.config().get().await.view())
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConfigUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(update) = payload?;
    let config = state.orchestrator.config().update(update).await;
    Ok(Json(config.view()))
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ModelsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Query(query) = query?;
    let ctx = RequestContext::new();
    let models = state
        .orchestrator
        .list_models(&ctx, query.base_url.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "models": models })))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(req) = payload?;
    let ctx = RequestContext::new();
    info!(request_id = %ctx.request_id, messages = req.messages.len(), "chat request");
    let turn = state.orchestrator.chat(&ctx, req.messages).await?;
    info!(
        request_id = %ctx.request_id,
        outcome = ?turn.outcome,
        elapsed_ms = ctx.elapsed().as_millis() as u64,
        "chat completed"
    );
    Ok(Json(ChatResponse {
        message: ChatMessage::assistant(turn.delivered.clone()),
        turn,
    }))
}

/// 读取 multipart 中名为 `file` 的字段
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), GatewayError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Validation(format!("invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| GatewayError::Validation(format!("invalid upload: {}", e)))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(GatewayError::Validation(
        "multipart field 'file' is required".to_string(),
    ))
}

async fn scan_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let (filename, bytes) = read_upload(multipart?).await?;
    let ctx = RequestContext::new();
    info!(request_id = %ctx.request_id, filename = %filename, size = bytes.len(), "file scan request");
    let report = state.orchestrator.scan_file(&ctx, bytes, &filename).await?;
    Ok(Json(report))
}

async fn test_eicar(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, GatewayError> {
    let report = state.orchestrator.test_eicar(&RequestContext::new()).await?;
    Ok(Json(report))
}

async fn test_hello(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, GatewayError> {
    let report = state.orchestrator.test_hello(&RequestContext::new()).await?;
    Ok(Json(report))
}

async fn test_injection(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, GatewayError> {
    let report = state
        .orchestrator
        .test_injection(&RequestContext::new())
        .await?;
    Ok(Json(report))
}

async fn list_history(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Query(query) = query?;
    let entries = state.orchestrator.history().list(query.limit).await;
    Ok(Json(serde_json::json!({ "entries": entries })))
}

// ==================== 路由 ====================

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/", get(index))
        .route("/healthz", get(health_check))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/llm/models", get(list_models))
        .route("/api/chat", post(chat))
        .route("/api/scan/file", post(scan_file))
        .route("/api/test/eicar", post(test_eicar))
        .route("/api/test/hello", post(test_hello))
        .route("/api/test/injection", post(test_injection))
        .route("/api/history", get(list_history))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

// ==================== 服务器启动 ====================

pub async fn start_web_server(bind_addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Web server started on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::Timeouts;
    use crate::core::config::ConfigStore;
    use crate::core::history::HistoryLog;
    use crate::infrastructure::file_scan::FileSecurityClient;
    use crate::infrastructure::guard::GuardClient;
    use crate::infrastructure::http::HttpExchange;
    use crate::infrastructure::llm::OllamaClient;

    fn test_state() -> Arc<AppState> {
        let http = HttpExchange::new();
        let timeouts = Timeouts::default();
        let orchestrator = Orchestrator::new(
            Arc::new(ConfigStore::default()),
            Arc::new(HistoryLog::new(10)),
            Arc::new(OllamaClient::new(http.clone(), &timeouts)),
            Arc::new(GuardClient::new(http.clone(), timeouts.guard)),
            Arc::new(FileSecurityClient::new(http, timeouts.file_scan)),
        );
        Arc::new(AppState {
            orchestrator: Arc::new(orchestrator),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&GatewayError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&GatewayError::Timeout("x".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&GatewayError::Auth("x".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_index_returns_html() {
        let response = create_router(test_state())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[test]
    fn test_index_sets_model_names_as_text() {
        // 模型名来自外部服务，只能以文本插入页面
        assert!(!INDEX_HTML.contains("innerHTML"));
        assert!(INDEX_HTML.contains("option.textContent = name"));
    }

    #[tokio::test]
    async fn test_chat_requires_config() {
        let request = Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"messages":[{"role":"user","content":"Hi"}]}"#))
            .unwrap();
        let response = create_router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "ValidationError");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Configure"));
    }

    #[tokio::test]
    async fn test_scan_requires_file_field() {
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::post("/api/scan/file")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let response = create_router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let request = Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"messages":"oops"}"#))
            .unwrap();
        let response = create_router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "ValidationError");
    }

    #[tokio::test]
    async fn test_upload_without_multipart_is_validation_error() {
        let request = Request::post("/api/scan/file")
            .header("content-type", "text/plain")
            .body(Body::from("not a form"))
            .unwrap();
        let response = create_router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "ValidationError");
    }

    #[tokio::test]
    async fn test_bad_history_limit_is_validation_error() {
        let response = create_router(test_state())
            .oneshot(Request::get("/api/history?limit=many").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_starts_empty() {
        let response = create_router(test_state())
            .oneshot(Request::get("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["entries"], serde_json::json!([]));
    }
}
