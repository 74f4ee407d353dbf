//! 请求编排
//!
//! 负责对外部服务调用排序：对话时按检测侧先检查提示词、再调用模型、
//! 再检查模型输出。每一次适配器调用（无论成败）都写入历史。
//! 任何一次调用失败都会让整个操作失败，不做重试。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn, Instrument};

use crate::application::samples::{
    combined_injection_prompt, EICAR_BYTES, EICAR_FILENAME, HELLO_BYTES, HELLO_FILENAME,
    INJECTION_SAMPLES,
};
use crate::core::config::{normalize_llm_url, ConfigStore, SecurityConfig};
use crate::core::history::{HistoryEntry, HistoryLog};
use crate::core::types::{
    ChatMessage, ChatTurn, Inspection, MessageRole, ModelInfo, ScanResult, ScanVerdict,
    TurnOutcome,
};
use crate::errors::{ErrorDescription, GatewayError, Result};
use crate::infrastructure::file_scan::{FileScanSettings, FileScanner};
use crate::infrastructure::guard::{GuardSettings, SafetyInspector};
use crate::infrastructure::http::AdapterCall;
use crate::infrastructure::llm::LlmBackend;
use crate::infrastructure::logger::{RequestContext, Timer};
use crate::request_span;

pub const BLOCKED_PROMPT_NOTICE: &str = "[Blocked by AI Guard] Your prompt was flagged as unsafe.";
pub const BLOCKED_RESPONSE_NOTICE: &str =
    "[Blocked by AI Guard] The model response was flagged as unsafe.";

/// 上传文件的扫描报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileScanReport {
    pub filename: String,
    /// 扫描被禁用时为空
    pub scan: Option<ScanResult>,
    pub malicious: bool,
}

/// 单条注入样本的检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleOutcome {
    pub name: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection: Option<Inspection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescription>,
}

impl SampleOutcome {
    pub fn is_blocked(&self) -> bool {
        self.inspection.as_ref().is_some_and(Inspection::is_blocked)
    }
}

/// 提示词注入测试报告
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InjectionReport {
    /// AI Guard 已启用：逐条送检
    Inspected {
        samples: Vec<SampleOutcome>,
        malicious: bool,
    },
    /// AI Guard 未启用：合并后直接发给模型
    Chat { turn: ChatTurn },
}

/// 存活检查，不访问任何外部服务
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub llm_configured: bool,
    pub guard_configured: bool,
    pub file_scan_configured: bool,
    pub history_entries: usize,
    pub history_capacity: usize,
}

/// 编排器
pub struct Orchestrator {
    config: Arc<ConfigStore>,
    history: Arc<HistoryLog>,
    llm: Arc<dyn LlmBackend>,
    guard: Arc<dyn SafetyInspector>,
    scanner: Arc<dyn FileScanner>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        history: Arc<HistoryLog>,
        llm: Arc<dyn LlmBackend>,
        guard: Arc<dyn SafetyInspector>,
        scanner: Arc<dyn FileScanner>,
    ) -> Self {
        Self {
            config,
            history,
            llm,
            guard,
            scanner,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// 把调用写入历史并取出结果
    async fn record<T>(&self, ctx: &RequestContext, call: AdapterCall<T>) -> Result<T> {
        self.history
            .append(HistoryEntry::new(ctx.request_id.clone(), call.record))
            .await;
        call.result
    }

    async fn inspect(
        &self,
        ctx: &RequestContext,
        settings: &GuardSettings,
        text: &str,
        role: MessageRole,
    ) -> Result<Inspection> {
        let _timer = Timer::start("safety.inspect", ctx);
        let call = self.guard.inspect(settings, text, role).await;
        self.record(ctx, call).await
    }

    /// 列出模型；未指定地址时使用已配置的地址
    pub async fn list_models(
        &self,
        ctx: &RequestContext,
        base_url: Option<&str>,
    ) -> Result<Vec<ModelInfo>> {
        let configured = self.config.get().await.llm_base_url;
        let url = base_url
            .map(normalize_llm_url)
            .filter(|u| !u.is_empty())
            .unwrap_or(configured);
        if url.is_empty() {
            return Err(GatewayError::Validation(
                "LLM base URL is required".to_string(),
            ));
        }

        let _timer = Timer::start("llm.list_models", ctx);
        let call = self.llm.list_models(&url).await;
        self.record(ctx, call).await
    }

    /// 一轮对话
    pub async fn chat(&self, ctx: &RequestContext, messages: Vec<ChatMessage>) -> Result<ChatTurn> {
        let config = self.config.get().await;
        self.chat_with(ctx, &config, messages)
            .instrument(request_span!(ctx, "chat"))
            .await
    }

    async fn chat_with(
        &self,
        ctx: &RequestContext,
        config: &SecurityConfig,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatTurn> {
        if !config.llm_configured() {
            return Err(GatewayError::Validation(
                "Configure LLM URL and model in Settings first.".to_string(),
            ));
        }
        if messages.is_empty() {
            return Err(GatewayError::Validation("messages is required".to_string()));
        }
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if prompt.trim().is_empty() {
            return Err(GatewayError::Validation("prompt must not be empty".to_string()));
        }

        let guard_active = config.guard_active();
        if config.guard_enabled && !guard_active {
            warn!("AI Guard enabled without an API key, skipping inspection");
        }
        let settings = GuardSettings::from(config);

        let mut prompt_inspection = None;
        if guard_active && config.enforce_side.covers_user() {
            let inspection = self.inspect(ctx, &settings, &prompt, MessageRole::User).await?;
            if inspection.is_blocked() {
                info!("prompt blocked by AI Guard");
                return Ok(ChatTurn {
                    prompt,
                    prompt_inspection: Some(inspection),
                    generated: None,
                    response_inspection: None,
                    outcome: TurnOutcome::BlockedPrompt,
                    delivered: BLOCKED_PROMPT_NOTICE.to_string(),
                });
            }
            prompt_inspection = Some(inspection);
        }

        let generated = {
            let _timer = Timer::start("llm.chat", ctx);
            let call = self
                .llm
                .chat(&config.llm_base_url, &config.llm_model, &messages)
                .await;
            self.record(ctx, call).await?
        };

        let mut response_inspection = None;
        if guard_active && config.enforce_side.covers_assistant() && !generated.is_empty() {
            let inspection = self
                .inspect(ctx, &settings, &generated, MessageRole::Assistant)
                .await?;
            if inspection.is_blocked() {
                info!("model response blocked by AI Guard");
                return Ok(ChatTurn {
                    prompt,
                    prompt_inspection,
                    generated: Some(generated),
                    response_inspection: Some(inspection),
                    outcome: TurnOutcome::BlockedResponse,
                    delivered: BLOCKED_RESPONSE_NOTICE.to_string(),
                });
            }
            response_inspection = Some(inspection);
        }

        Ok(ChatTurn {
            prompt,
            prompt_inspection,
            delivered: generated.clone(),
            generated: Some(generated),
            response_inspection,
            outcome: TurnOutcome::Delivered,
        })
    }

    /// 扫描上传的文件
    pub async fn scan_file(
        &self,
        ctx: &RequestContext,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<FileScanReport> {
        let filename = if filename.trim().is_empty() {
            "upload.bin"
        } else {
            filename.trim()
        };
        let config = self.config.get().await;
        if !config.file_scan_enabled {
            info!(filename, "file scanning disabled, skipping");
            return Ok(FileScanReport {
                filename: filename.to_string(),
                scan: None,
                malicious: false,
            });
        }

        let settings = FileScanSettings::from(&config);
        let result = {
            let _timer = Timer::start("file_scan.scan", ctx);
            let call = self.scanner.scan(&settings, bytes, filename).await;
            self.record(ctx, call).await?
        };
        info!(filename, verdict = ?result.verdict, "file scanned");
        Ok(FileScanReport {
            filename: filename.to_string(),
            malicious: result.verdict == ScanVerdict::Malicious,
            scan: Some(result),
        })
    }

    /// 扫描 EICAR 测试文件
    pub async fn test_eicar(&self, ctx: &RequestContext) -> Result<FileScanReport> {
        self.scan_file(ctx, EICAR_BYTES.to_vec(), EICAR_FILENAME)
            .instrument(request_span!(ctx, "test_eicar"))
            .await
    }

    /// 扫描无害文件
    pub async fn test_hello(&self, ctx: &RequestContext) -> Result<FileScanReport> {
        self.scan_file(ctx, HELLO_BYTES.to_vec(), HELLO_FILENAME)
            .instrument(request_span!(ctx, "test_hello"))
            .await
    }

    /// 提示词注入测试
    ///
    /// AI Guard 可用时七条样本逐条以用户身份送检，单条失败只记录在该样本上；
    /// 否则把样本合并后走一轮普通对话。
    pub async fn test_injection(&self, ctx: &RequestContext) -> Result<InjectionReport> {
        let config = self.config.get().await;
        if !config.guard_active() {
            let turn = self
                .chat_with(ctx, &config, vec![ChatMessage::user(combined_injection_prompt())])
                .instrument(request_span!(ctx, "test_injection"))
                .await?;
            return Ok(InjectionReport::Chat { turn });
        }

        let settings = GuardSettings::from(&config);
        let mut samples = Vec::with_capacity(INJECTION_SAMPLES.len());
        for sample in INJECTION_SAMPLES {
            let outcome = match self
                .inspect(ctx, &settings, sample.prompt, MessageRole::User)
                .await
            {
                Ok(inspection) => SampleOutcome {
                    name: sample.name.to_string(),
                    prompt: sample.prompt.to_string(),
                    inspection: Some(inspection),
                    error: None,
                },
                Err(err) => SampleOutcome {
                    name: sample.name.to_string(),
                    prompt: sample.prompt.to_string(),
                    inspection: None,
                    error: Some(err.describe()),
                },
            };
            samples.push(outcome);
        }
        let malicious = samples.iter().any(SampleOutcome::is_blocked);
        info!(malicious, "prompt injection battery finished");
        Ok(InjectionReport::Inspected { samples, malicious })
    }

    pub async fn health(&self) -> HealthReport {
        let config = self.config.get().await;
        HealthReport {
            status: "ok",
            timestamp: Utc::now(),
            llm_configured: config.llm_configured(),
            guard_configured: config.guard_configured(),
            file_scan_configured: config.file_scan_configured(),
            history_entries: self.history.len().await,
            history_capacity: self.history.capacity(),
        }
    }
}
