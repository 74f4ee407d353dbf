//! HTTP 调用封装
//!
//! 三个适配器共用的部分：有界超时、reqwest 错误分类、请求/响应留档。
//! 请求和响应的具体格式由各适配器自行决定。

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::history::{CallOutcome, CallRecord, RequestRecord, ResponseRecord, ServiceKind};
use crate::errors::{GatewayError, Result};
use crate::infrastructure::logger::Sanitizer;

/// 请求体
#[derive(Debug, Clone)]
pub enum OutboundBody {
    Empty,
    Json(Value),
    /// 单文件的 multipart 上传
    File {
        field: String,
        filename: String,
        bytes: Vec<u8>,
    },
}

/// 待发送的请求
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: OutboundBody,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: OutboundBody::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: OutboundBody::Json(body),
        }
    }

    pub fn post_file(url: impl Into<String>, field: &str, filename: &str, bytes: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: OutboundBody::File {
                field: field.to_string(),
                filename: filename.to_string(),
                bytes,
            },
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    /// 留档形式：带查询串的 URL，脱敏的头部，文件只记录名称和大小
    pub fn record(&self) -> RequestRecord {
        let url = if self.query.is_empty() {
            self.url.clone()
        } else {
            let query: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{}?{}", self.url, query.join("&"))
        };

        let headers = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                    (k.clone(), Sanitizer::authorization(v))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect();

        let body = match &self.body {
            OutboundBody::Empty => Value::Null,
            OutboundBody::Json(value) => value.clone(),
            OutboundBody::File {
                field,
                filename,
                bytes,
            } => json!({
                "multipart": {
                    "field": field,
                    "filename": filename,
                    "size": bytes.len(),
                }
            }),
        };

        RequestRecord {
            method: self.method.to_string(),
            url,
            headers,
            body,
        }
    }
}

/// 收到的原始响应
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl RawResponse {
    /// 401/403 视为认证失败，其余非 2xx 视为协议错误
    pub fn ensure_success(&self, service: &str) -> Result<()> {
        if self.status.is_success() {
            return Ok(());
        }
        let snippet = body_snippet(&self.body);
        if self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth(format!(
                "{} rejected the API key ({}): {}",
                service, self.status, snippet
            )));
        }
        Err(GatewayError::Protocol(format!(
            "{} returned {}: {}",
            service, self.status, snippet
        )))
    }
}

fn body_snippet(body: &Value) -> String {
    let text = match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(500).collect()
}

/// 一次适配器调用：结果加上留档
#[derive(Debug)]
pub struct AdapterCall<T> {
    pub record: CallRecord,
    pub result: Result<T>,
}

impl<T> AdapterCall<T> {
    /// 未发出网络请求就失败的调用（缺少密钥、区域不支持等）
    pub fn rejected(
        service: ServiceKind,
        operation: &str,
        request: RequestRecord,
        error: GatewayError,
    ) -> Self {
        Self {
            record: CallRecord {
                service,
                operation: operation.to_string(),
                request,
                outcome: CallOutcome::Error {
                    error: error.describe(),
                    response: None,
                },
                duration_ms: 0,
            },
            result: Err(error),
        }
    }
}

/// 共享的 HTTP 客户端
#[derive(Clone, Default)]
pub struct HttpExchange {
    http: reqwest::Client,
}

impl HttpExchange {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// 发送请求并用 `interpret` 解析响应；任何一步失败都会体现在留档里
    pub async fn exchange<T, F>(
        &self,
        service: ServiceKind,
        operation: &str,
        request: OutboundRequest,
        timeout: Duration,
        interpret: F,
    ) -> AdapterCall<T>
    where
        F: FnOnce(&RawResponse) -> Result<T>,
    {
        // 留档里的头部取自实际构建出的请求，包含 reqwest 补上的 Content-Type
        let mut request_record = request.record();
        let started = Instant::now();
        let sent = match build_request(&self.http, &request, timeout) {
            Ok(built) => {
                request_record.headers = sent_headers(built.headers());
                self.send(built, &request.url, timeout).await
            }
            Err(err) => Err(err),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (outcome, result) = match sent {
            Ok((raw, response_record)) => match interpret(&raw) {
                Ok(value) => (CallOutcome::Response(response_record), Ok(value)),
                Err(err) => (
                    CallOutcome::Error {
                        error: err.describe(),
                        response: Some(response_record),
                    },
                    Err(err),
                ),
            },
            Err(err) => (
                CallOutcome::Error {
                    error: err.describe(),
                    response: None,
                },
                Err(err),
            ),
        };

        if let Err(err) = &result {
            warn!(
                service = %service,
                operation,
                kind = %err.kind(),
                duration_ms,
                "external call failed: {}",
                err.message()
            );
        } else {
            debug!(service = %service, operation, duration_ms, "external call succeeded");
        }

        AdapterCall {
            record: CallRecord {
                service,
                operation: operation.to_string(),
                request: request_record,
                outcome,
                duration_ms,
            },
            result,
        }
    }

    async fn send(
        &self,
        request: reqwest::Request,
        url: &str,
        timeout: Duration,
    ) -> Result<(RawResponse, ResponseRecord)> {
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| classify(e, url, timeout))?;

        let status = response.status();
        let headers = header_pairs(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| classify(e, url, timeout))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        let record = ResponseRecord {
            status: status.as_u16(),
            headers,
            body: body.clone(),
        };
        Ok((RawResponse { status, body }, record))
    }
}

fn build_request(
    http: &reqwest::Client,
    request: &OutboundRequest,
    timeout: Duration,
) -> Result<reqwest::Request> {
    let mut builder = http
        .request(request.method.clone(), &request.url)
        .timeout(timeout);
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    for (key, value) in &request.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder = match &request.body {
        OutboundBody::Empty => builder,
        OutboundBody::Json(value) => builder.json(value),
        OutboundBody::File {
            field,
            filename,
            bytes,
        } => {
            let part = reqwest::multipart::Part::bytes(bytes.clone()).file_name(filename.clone());
            builder.multipart(reqwest::multipart::Form::new().part(field.clone(), part))
        }
    };
    builder
        .build()
        .map_err(|e| classify(e, &request.url, timeout))
}

fn sent_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    header_pairs(headers)
        .into_iter()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                let masked = Sanitizer::authorization(&v);
                (k, masked)
            } else {
                (k, v)
            }
        })
        .collect()
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// reqwest 错误到网关错误类别的映射
fn classify(err: reqwest::Error, url: &str, timeout: Duration) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(format!(
            "no response from {} within {}s",
            url,
            timeout.as_secs_f64()
        ))
    } else if err.is_decode() || err.is_body() {
        GatewayError::Protocol(format!("unreadable response from {}: {}", url, err))
    } else if err.is_builder() {
        // URL 合法时，构建失败只可能来自头部（通常是密钥里带了换行或非 ASCII 字符）
        if reqwest::Url::parse(url).is_err() {
            GatewayError::Connection(format!("invalid URL {}: {}", url, err))
        } else {
            GatewayError::Validation(format!(
                "invalid API key or header value for {}: {}",
                url, err
            ))
        }
    } else {
        GatewayError::Connection(format!("cannot connect to {}: {}", url, err))
    }
}
