//! 领域类型：对话消息、检测结论、扫描结果

use serde::{Deserialize, Serialize};

/// 对话消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// 送检文本的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// 安全检测结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyVerdict {
    Allow,
    Block,
}

/// 一次安全检测的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    pub role: MessageRole,
    pub verdict: SafetyVerdict,
    /// AI Guard 返回的原始内容
    pub detail: serde_json::Value,
}

impl Inspection {
    pub fn is_blocked(&self) -> bool {
        self.verdict == SafetyVerdict::Block
    }
}

/// 文件扫描结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanVerdict {
    Clean,
    Malicious,
    Error,
}

/// 文件扫描结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub verdict: ScanVerdict,
    pub filename: String,
    /// 扫描服务的原始响应
    pub raw: serde_json::Value,
}

/// LLM 模型信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// 对话轮次的终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Delivered,
    BlockedPrompt,
    BlockedResponse,
}

/// 一轮对话
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub prompt: String,
    pub prompt_inspection: Option<Inspection>,
    /// 模型原始输出，只在进程内可见，不会发给前端
    #[serde(skip)]
    pub generated: Option<String>,
    pub response_inspection: Option<Inspection>,
    pub outcome: TurnOutcome,
    /// 最终交付给用户的文本
    pub delivered: String,
}
