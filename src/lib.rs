//! AI 安全演示网关
//!
//! 在三个外部服务前提供一个小型 Web 网关：
//! - Ollama 兼容的 LLM（模型列表、对话）
//! - AI Guard 提示词安全检测（检查用户输入和/或模型输出）
//! - File Security 恶意软件扫描
//!
//! 每次外部调用的请求、响应或错误都写入内存中的历史记录。
//!
//! # 架构分层
//!
//! - `core`: 核心层，运行时配置、历史记录和领域类型
//! - `infrastructure`: 基础设施层，外部服务客户端、日志和 Web 服务
//! - `application`: 应用层，请求编排和内置测试样本

// 启动配置
pub mod config;

// 错误类型
pub mod errors;

// 核心层
pub mod core;

// 基础设施层
pub mod infrastructure;

// 应用层
pub mod application;

pub use application::orchestrator::{
    FileScanReport, HealthReport, InjectionReport, Orchestrator, SampleOutcome,
};
pub use config::{AppConfig, Timeouts};
pub use core::config::{ConfigStore, ConfigUpdate, ConfigView, EnforceSide, SecurityConfig};
pub use core::history::{CallOutcome, CallRecord, HistoryEntry, HistoryLog, ServiceKind};
pub use core::types::{
    ChatMessage, ChatTurn, Inspection, MessageRole, ModelInfo, SafetyVerdict, ScanResult,
    ScanVerdict, TurnOutcome,
};
pub use errors::{ErrorKind, GatewayError, Result};
pub use infrastructure::file_scan::{FileScanSettings, FileScanner, FileSecurityClient};
pub use infrastructure::guard::{GuardClient, GuardSettings, SafetyInspector};
pub use infrastructure::http::{AdapterCall, HttpExchange};
pub use infrastructure::llm::{LlmBackend, OllamaClient};
pub use infrastructure::logger;
pub use infrastructure::web::{create_router, start_web_server, AppState};

/// 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
