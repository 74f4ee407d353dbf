//! File Security 客户端
//!
//! 以 multipart 方式上传文件内容，按区域选择扫描服务

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::SecurityConfig;
use crate::core::history::ServiceKind;
use crate::core::types::{ScanResult, ScanVerdict};
use crate::errors::{GatewayError, Result};
use crate::infrastructure::http::{AdapterCall, HttpExchange, OutboundRequest, RawResponse};

/// 区域（含简称）到服务主机前缀的映射
const REGIONS: &[(&[&str], &str)] = &[
    (&["us-east-1", "us"], "us-1"),
    (&["eu-central-1", "eu"], "de-1"),
    (&["ap-northeast-1", "jp"], "jp-1"),
    (&["ap-southeast-1", "sg"], "sg-1"),
    (&["ap-southeast-2", "au"], "au-1"),
    (&["ap-south-1", "in"], "in-1"),
    (&["me-central-1", "mea"], "ae-1"),
];

/// 区域对应的扫描服务地址，未知区域返回 `None`
pub fn region_endpoint(region: &str) -> Option<String> {
    let region = region.trim().to_ascii_lowercase();
    REGIONS
        .iter()
        .find(|(names, _)| names.contains(&region.as_str()))
        .map(|(_, host)| format!("https://antimalware.{}.cloudone.trendmicro.com", host))
}

/// 调用 File Security 所需的连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileScanSettings {
    pub api_key: String,
    pub region: String,
    /// 设置后不再按区域推导地址
    pub endpoint: Option<String>,
}

impl From<&SecurityConfig> for FileScanSettings {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            api_key: config.file_scan_api_key.clone(),
            region: config.file_scan_region.clone(),
            endpoint: config.file_scan_endpoint.clone(),
        }
    }
}

/// 文件恶意软件扫描能力
#[async_trait]
pub trait FileScanner: Send + Sync {
    async fn scan(
        &self,
        settings: &FileScanSettings,
        bytes: Vec<u8>,
        filename: &str,
    ) -> AdapterCall<ScanResult>;
}

/// File Security HTTP 客户端
#[derive(Clone)]
pub struct FileSecurityClient {
    http: HttpExchange,
    timeout: Duration,
}

impl FileSecurityClient {
    pub fn new(http: HttpExchange, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

/// `foundMalwares` 非空或 `scanResult > 0` 为恶意，`scanResult == 0` 为干净
fn parse_verdict(body: &Value) -> ScanVerdict {
    let found = body
        .get("foundMalwares")
        .and_then(Value::as_array)
        .is_some_and(|list| !list.is_empty());
    if found {
        return ScanVerdict::Malicious;
    }
    match body.get("scanResult").and_then(Value::as_i64) {
        Some(0) => ScanVerdict::Clean,
        Some(n) if n > 0 => ScanVerdict::Malicious,
        _ => ScanVerdict::Error,
    }
}

fn parse_scan(raw: &RawResponse, filename: &str) -> Result<ScanResult> {
    raw.ensure_success("File Security")?;
    if !raw.body.is_object() {
        return Err(GatewayError::Protocol(
            "File Security returned a non-JSON response".to_string(),
        ));
    }
    Ok(ScanResult {
        verdict: parse_verdict(&raw.body),
        filename: filename.to_string(),
        raw: raw.body.clone(),
    })
}

#[async_trait]
impl FileScanner for FileSecurityClient {
    async fn scan(
        &self,
        settings: &FileScanSettings,
        bytes: Vec<u8>,
        filename: &str,
    ) -> AdapterCall<ScanResult> {
        let endpoint = settings
            .endpoint
            .clone()
            .or_else(|| region_endpoint(&settings.region));
        let url = format!("{}/api/v1/scan", endpoint.as_deref().unwrap_or_default());
        let request = OutboundRequest::post_file(url, "file", filename, bytes)
            .header("Authorization", format!("ApiKey {}", settings.api_key))
            .header("X-Scan-Region", settings.region.clone());

        if settings.api_key.is_empty() {
            return AdapterCall::rejected(
                ServiceKind::FileScan,
                "scan",
                request.record(),
                GatewayError::Auth(
                    "File Security not configured (missing API key)".to_string(),
                ),
            );
        }
        if endpoint.is_none() {
            return AdapterCall::rejected(
                ServiceKind::FileScan,
                "scan",
                request.record(),
                GatewayError::UnsupportedRegion(format!(
                    "File Security region '{}' is not supported",
                    settings.region
                )),
            );
        }

        self.http
            .exchange(ServiceKind::FileScan, "scan", request, self.timeout, |raw| {
                parse_scan(raw, filename)
            })
            .await
    }
}
