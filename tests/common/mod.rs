//! 测试通用工具
//!
//! 提供假的 Ollama、AI Guard 和 File Security 服务，以及指向它们的网关状态

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::{
    extract::{Json, Multipart},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use aiguard_gateway::{
    AppState, ConfigStore, ConfigUpdate, FileSecurityClient, GuardClient, HistoryLog,
    HttpExchange, OllamaClient, Orchestrator, SecurityConfig, Timeouts,
};

static INIT: Once = Once::new();

pub const GUARD_KEY: &str = "guard-key-123456";
pub const SCAN_KEY: &str = "scan-key-123456";
pub const MODEL: &str = "llama3.2";

/// 假 AI Guard 会拦截包含这些片段的文本
pub const GUARD_BLOCK_MARKERS: &[&str] = &["Ignore all previous", "</system>", "attack", "hunter2"];

/// 初始化测试环境
pub fn setup() {
    INIT.call_once(|| {
        // 设置测试日志
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    });
}

/// 测试超时包装器（用于异步测试）
pub async fn with_timeout<F, T>(duration: Duration, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, f)
        .await
        .expect("Test timed out")
}

/// 常用的测试超时时间
pub const TEST_TIMEOUT_SHORT: Duration = Duration::from_secs(5);
pub const TEST_TIMEOUT_MEDIUM: Duration = Duration::from_secs(30);

/// 在随机端口上启动一个 axum 服务
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ==================== 假 Ollama ====================

/// 假 Ollama：回显最后一条用户消息；消息里含 `secret` 时泄露一段口令
pub async fn fake_ollama(delay: Duration) -> SocketAddr {
    let app = Router::new()
        .route(
            "/api/tags",
            get(|| async {
                Json(json!({
                    "models": [
                        {"name": MODEL, "details": {"family": "llama"}},
                        {"name": "qwen2.5"}
                    ]
                }))
            }),
        )
        .route(
            "/api/chat",
            post(move |Json(body): Json<Value>| async move {
                tokio::time::sleep(delay).await;
                if body["model"] != MODEL {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(json!({"error": format!("model '{}' not found", body["model"])})),
                    );
                }
                let last = body["messages"]
                    .as_array()
                    .and_then(|m| m.last())
                    .and_then(|m| m["content"].as_str())
                    .unwrap_or_default()
                    .to_string();
                let reply = if last.contains("secret") {
                    "The admin password is hunter2".to_string()
                } else {
                    format!("echo: {}", last)
                };
                (
                    StatusCode::OK,
                    Json(json!({
                        "model": MODEL,
                        "message": {"role": "assistant", "content": reply},
                        "done": true
                    })),
                )
            }),
        );
    spawn(app).await
}

// ==================== 假 AI Guard ====================

fn bearer_matches(headers: &HeaderMap, key: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", key))
}

pub async fn fake_guard() -> SocketAddr {
    let app = Router::new().route(
        "/guard",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            if !bearer_matches(&headers, GUARD_KEY) {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"message": "invalid token"})),
                );
            }
            let text = body["guard"].as_str().unwrap_or_default();
            let blocked = GUARD_BLOCK_MARKERS.iter().any(|m| text.contains(m));
            let (action, reasons) = if blocked {
                ("Block", json!(["prompt_attack"]))
            } else {
                ("Allow", json!([]))
            };
            (
                StatusCode::OK,
                Json(json!({
                    "id": "guard-test",
                    "action": action,
                    "role": body["role"],
                    "reasons": reasons
                })),
            )
        }),
    );
    spawn(app).await
}

// ==================== 假 File Security ====================

async fn scan_upload(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("ApiKey {}", SCAN_KEY));
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "invalid api key"})),
        );
    }

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap_or_default();
        let infected = bytes
            .windows(34)
            .any(|w| w == b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE");
        let body = if infected {
            json!({
                "scanResult": 1,
                "fileName": filename,
                "foundMalwares": [{"fileName": filename, "malwareName": "Eicar_test_file"}]
            })
        } else {
            json!({"scanResult": 0, "fileName": filename, "foundMalwares": []})
        };
        return (StatusCode::OK, Json(body));
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"message": "missing file"})),
    )
}

pub async fn fake_file_security() -> SocketAddr {
    spawn(Router::new().route("/api/v1/scan", post(scan_upload))).await
}

// ==================== 网关 ====================

/// 三个假服务的地址
pub struct FakeServices {
    pub ollama: SocketAddr,
    pub guard: SocketAddr,
    pub file_security: SocketAddr,
}

impl FakeServices {
    pub async fn start() -> Self {
        Self::start_with_llm_delay(Duration::ZERO).await
    }

    pub async fn start_with_llm_delay(delay: Duration) -> Self {
        Self {
            ollama: fake_ollama(delay).await,
            guard: fake_guard().await,
            file_security: fake_file_security().await,
        }
    }

    /// 指向假服务的完整配置
    pub fn security_config(&self) -> SecurityConfig {
        SecurityConfig {
            llm_base_url: format!("http://{}", self.ollama),
            llm_model: MODEL.to_string(),
            guard_api_key: GUARD_KEY.to_string(),
            guard_url: format!("http://{}/guard", self.guard),
            file_scan_api_key: SCAN_KEY.to_string(),
            file_scan_endpoint: Some(format!("http://{}", self.file_security)),
            ..Default::default()
        }
    }
}

pub fn short_timeouts() -> Timeouts {
    Timeouts {
        llm_models: Duration::from_secs(5),
        llm_chat: Duration::from_secs(5),
        guard: Duration::from_secs(5),
        file_scan: Duration::from_secs(5),
    }
}

/// 用真实客户端组装网关
pub fn gateway(config: SecurityConfig, timeouts: Timeouts) -> Arc<AppState> {
    let http = HttpExchange::new();
    let orchestrator = Orchestrator::new(
        Arc::new(ConfigStore::new(config)),
        Arc::new(HistoryLog::new(100)),
        Arc::new(OllamaClient::new(http.clone(), &timeouts)),
        Arc::new(GuardClient::new(http.clone(), timeouts.guard)),
        Arc::new(FileSecurityClient::new(http, timeouts.file_scan)),
    );
    Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
    })
}

/// 启动网关本身，返回基础地址
pub async fn spawn_gateway(state: Arc<AppState>) -> String {
    let addr = spawn(aiguard_gateway::create_router(state)).await;
    format!("http://{}", addr)
}

/// 通过 API 局部更新配置
pub async fn post_config(base: &str, update: Value) -> Value {
    reqwest::Client::new()
        .post(format!("{}/api/config", base))
        .json(&update)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// 直接修改网关配置（不经过 HTTP）
pub async fn update_config(state: &AppState, update: ConfigUpdate) {
    state.orchestrator.config().update(update).await;
}
