//! LLM 客户端
//!
//! 通过 Ollama 原生接口列出模型和进行非流式对话

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Timeouts;
use crate::core::history::ServiceKind;
use crate::core::types::{ChatMessage, ModelInfo};
use crate::errors::{GatewayError, Result};
use crate::infrastructure::http::{AdapterCall, HttpExchange, OutboundRequest, RawResponse};

/// LLM 服务能力
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// 列出服务上可用的模型
    async fn list_models(&self, base_url: &str) -> AdapterCall<Vec<ModelInfo>>;

    /// 发送对话（单轮或累积的多轮）并返回生成的文本
    async fn chat(
        &self,
        base_url: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> AdapterCall<String>;
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Ollama 客户端
#[derive(Clone)]
pub struct OllamaClient {
    http: HttpExchange,
    models_timeout: Duration,
    chat_timeout: Duration,
}

impl OllamaClient {
    pub fn new(http: HttpExchange, timeouts: &Timeouts) -> Self {
        Self {
            http,
            models_timeout: timeouts.llm_models,
            chat_timeout: timeouts.llm_chat,
        }
    }
}

fn parse_tags(raw: &RawResponse) -> Result<Vec<ModelInfo>> {
    raw.ensure_success("LLM server")?;
    if !raw.body.is_object() {
        return Err(GatewayError::Protocol(
            "LLM server returned a non-JSON model list".to_string(),
        ));
    }
    let tags: TagsResponse = serde_json::from_value(raw.body.clone())?;
    Ok(tags.models)
}

fn parse_chat(raw: &RawResponse) -> Result<String> {
    raw.ensure_success("LLM server")?;
    let Value::Object(map) = &raw.body else {
        return Err(GatewayError::Protocol(
            "LLM server returned invalid JSON. Check configuration.".to_string(),
        ));
    };
    if let Some(error) = map.get("error").and_then(Value::as_str) {
        return Err(GatewayError::Protocol(format!("LLM server error: {}", error)));
    }
    let response: ChatResponse = serde_json::from_value(raw.body.clone())?;
    Ok(response
        .message
        .and_then(|m| m.content)
        .unwrap_or_default())
}

#[async_trait]
impl LlmBackend for OllamaClient {
    async fn list_models(&self, base_url: &str) -> AdapterCall<Vec<ModelInfo>> {
        let request = OutboundRequest::get(format!("{}/api/tags", base_url));
        self.http
            .exchange(
                ServiceKind::Llm,
                "list_models",
                request,
                self.models_timeout,
                parse_tags,
            )
            .await
    }

    async fn chat(
        &self,
        base_url: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> AdapterCall<String> {
        let payload = json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });
        let request = OutboundRequest::post_json(format!("{}/api/chat", base_url), payload);
        self.http
            .exchange(ServiceKind::Llm, "chat", request, self.chat_timeout, parse_chat)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn raw(status: StatusCode, body: Value) -> RawResponse {
        RawResponse { status, body }
    }

    #[test]
    fn test_parse_tags() {
        let models = parse_tags(&raw(
            StatusCode::OK,
            json!({"models": [{"name": "llama3.2", "details": {"family": "llama"}}]}),
        ))
        .unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "llama3.2");

        let empty = parse_tags(&raw(StatusCode::OK, json!({}))).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_tags_malformed() {
        let err = parse_tags(&raw(StatusCode::OK, Value::String("<html>".into()))).unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));

        let err = parse_tags(&raw(StatusCode::OK, json!({"models": "nope"}))).unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[test]
    fn test_parse_chat() {
        let text = parse_chat(&raw(
            StatusCode::OK,
            json!({"message": {"role": "assistant", "content": "Hello!"}, "done": true}),
        ))
        .unwrap();
        assert_eq!(text, "Hello!");

        let empty = parse_chat(&raw(StatusCode::OK, json!({"done": true}))).unwrap();
        assert_eq!(empty, "");
    }

    #[test]
    fn test_parse_chat_errors() {
        let err = parse_chat(&raw(
            StatusCode::NOT_FOUND,
            json!({"error": "model 'x' not found"}),
        ))
        .unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
        assert!(err.message().contains("not found"));

        let err = parse_chat(&raw(StatusCode::OK, Value::String("oops".into()))).unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }
}
