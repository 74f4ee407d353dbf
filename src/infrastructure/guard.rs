//! AI Guard 客户端
//!
//! 把一段文本（标注来源为用户或模型）送去做提示词安全检测

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::config::SecurityConfig;
use crate::core::history::ServiceKind;
use crate::core::types::{Inspection, MessageRole, SafetyVerdict};
use crate::errors::{GatewayError, Result};
use crate::infrastructure::http::{AdapterCall, HttpExchange, OutboundRequest, RawResponse};

/// 调用 AI Guard 所需的连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSettings {
    pub api_key: String,
    pub url: String,
    pub detailed: bool,
}

impl From<&SecurityConfig> for GuardSettings {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            api_key: config.guard_api_key.clone(),
            url: config.guard_url.clone(),
            detailed: config.guard_detailed,
        }
    }
}

/// 提示词安全检测能力
#[async_trait]
pub trait SafetyInspector: Send + Sync {
    async fn inspect(
        &self,
        settings: &GuardSettings,
        text: &str,
        role: MessageRole,
    ) -> AdapterCall<Inspection>;
}

/// AI Guard HTTP 客户端
#[derive(Clone)]
pub struct GuardClient {
    http: HttpExchange,
    timeout: Duration,
}

impl GuardClient {
    pub fn new(http: HttpExchange, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

/// 从 `decision`、`action`、`recommendation` 中取第一个非空的字段
fn parse_verdict(body: &Value) -> SafetyVerdict {
    let decision = ["decision", "action", "recommendation"]
        .iter()
        .find_map(|key| {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("allow");
    if decision.eq_ignore_ascii_case("block") {
        SafetyVerdict::Block
    } else {
        SafetyVerdict::Allow
    }
}

fn parse_inspection(raw: &RawResponse, role: MessageRole) -> Result<Inspection> {
    raw.ensure_success("AI Guard")?;
    if !raw.body.is_object() {
        return Err(GatewayError::Protocol(
            "AI Guard returned a non-JSON response".to_string(),
        ));
    }
    Ok(Inspection {
        role,
        verdict: parse_verdict(&raw.body),
        detail: raw.body.clone(),
    })
}

#[async_trait]
impl SafetyInspector for GuardClient {
    async fn inspect(
        &self,
        settings: &GuardSettings,
        text: &str,
        role: MessageRole,
    ) -> AdapterCall<Inspection> {
        let request = OutboundRequest::post_json(
            settings.url.clone(),
            json!({ "guard": text, "role": role.as_str() }),
        )
        .query("detailedResponse", settings.detailed.to_string())
        .header("Authorization", format!("Bearer {}", settings.api_key));

        if settings.api_key.is_empty() {
            return AdapterCall::rejected(
                ServiceKind::Safety,
                "inspect",
                request.record(),
                GatewayError::Auth("AI Guard API key is not configured".to_string()),
            );
        }

        self.http
            .exchange(ServiceKind::Safety, "inspect", request, self.timeout, |raw| {
                parse_inspection(raw, role)
            })
            .await
    }
}
