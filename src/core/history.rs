//! 外部调用历史
//!
//! 记录每一次适配器调用的请求与响应（或错误），数据仅保存在内存中。
//! 只有编排层写入，前端只读。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ErrorDescription;

/// 外部服务标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Llm,
    Safety,
    FileScan,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Llm => write!(f, "llm"),
            ServiceKind::Safety => write!(f, "safety"),
            ServiceKind::FileScan => write!(f, "file_scan"),
        }
    }
}

/// 发出的请求（密钥已脱敏）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// 收到的响应
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// 调用结果：响应或错误
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallOutcome {
    Response(ResponseRecord),
    Error {
        #[serde(flatten)]
        error: ErrorDescription,
        /// 错误发生前已经收到的响应（例如 401）
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseRecord>,
    },
}

impl CallOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, CallOutcome::Error { .. })
    }
}

/// 一次适配器调用的完整记录，由适配器产生
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub service: ServiceKind,
    pub operation: String,
    pub request: RequestRecord,
    pub outcome: CallOutcome,
    pub duration_ms: u64,
}

/// 历史条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// 触发该调用的用户操作
    pub request_id: String,
    #[serde(flatten)]
    pub call: CallRecord,
}

impl HistoryEntry {
    pub fn new(request_id: impl Into<String>, call: CallRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_id: request_id.into(),
            call,
        }
    }
}

/// 有界的内存历史，满了以后丢弃最旧的条目
pub struct HistoryLog {
    entries: RwLock<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// 最新的在前
    pub async fn list(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let entries = self.entries.read().await;
        let limit = limit.unwrap_or(entries.len());
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(500)
    }
}
