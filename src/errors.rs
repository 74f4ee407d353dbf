//! 标准化错误处理
//!
//! 定义网关专用的错误类型。适配器的所有失败都归入这里的六种类别，
//! 由编排层记录到历史并以 `{kind, message}` 结构返回给前端。

use serde::Serialize;
use thiserror::Error;

/// 错误类别（序列化给前端和历史记录）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ConnectionError,
    AuthError,
    ProtocolError,
    TimeoutError,
    UnsupportedRegionError,
    ValidationError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::AuthError => "AuthError",
            ErrorKind::ProtocolError => "ProtocolError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::UnsupportedRegionError => "UnsupportedRegionError",
            ErrorKind::ValidationError => "ValidationError",
        };
        write!(f, "{}", name)
    }
}

/// 网关主要错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// 外部服务不可达
    #[error("Connection error: {0}")]
    Connection(String),

    /// API 密钥缺失或无效
    #[error("Authentication error: {0}")]
    Auth(String),

    /// 外部服务返回了无法解析的响应
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 超过调用时限
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 文件扫描区域不受支持
    #[error("Unsupported region: {0}")]
    UnsupportedRegion(String),

    /// 用户输入不合法
    #[error("Validation error: {0}")]
    Validation(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Connection(_) => ErrorKind::ConnectionError,
            GatewayError::Auth(_) => ErrorKind::AuthError,
            GatewayError::Protocol(_) => ErrorKind::ProtocolError,
            GatewayError::Timeout(_) => ErrorKind::TimeoutError,
            GatewayError::UnsupportedRegion(_) => ErrorKind::UnsupportedRegionError,
            GatewayError::Validation(_) => ErrorKind::ValidationError,
        }
    }

    /// 不带类别前缀的错误描述
    pub fn message(&self) -> &str {
        match self {
            GatewayError::Connection(m)
            | GatewayError::Auth(m)
            | GatewayError::Protocol(m)
            | GatewayError::Timeout(m)
            | GatewayError::UnsupportedRegion(m)
            | GatewayError::Validation(m) => m,
        }
    }

    /// 结构化失败描述
    pub fn describe(&self) -> ErrorDescription {
        ErrorDescription {
            kind: self.kind(),
            message: self.message().to_string(),
        }
    }
}

/// 返回给前端、写入历史的失败结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescription {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Protocol(err.to_string())
    }
}

/// 项目结果类型别名
pub type Result<T> = std::result::Result<T, GatewayError>;
