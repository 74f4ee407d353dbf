//! 启动配置
//!
//! 命令行参数与环境变量。外部服务的设置只作为运行时配置的初始值，
//! 启动后通过 `/api/config` 修改。

use std::time::Duration;

use clap::Parser;

use crate::core::config::{
    parse_flag, EnforceSide, SecurityConfig, DEFAULT_FILE_SCAN_REGION, DEFAULT_GUARD_URL,
};
use crate::infrastructure::logger::LogFormat;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "AI security demo gateway: LLM chat guarded by AI Guard, file scanning by File Security"
)]
pub struct AppConfig {
    /// 监听地址
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// 监听端口
    #[arg(long, env = "EXT_PORT", default_value_t = 8000)]
    pub port: u16,

    /// 日志格式: pretty, compact, json
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// 历史记录容量，超出后丢弃最旧的条目
    #[arg(long, env = "HISTORY_CAPACITY", default_value_t = 500)]
    pub history_capacity: usize,

    // 超时配置（秒）
    #[arg(long, env = "LLM_MODELS_TIMEOUT_SECS", default_value_t = 10)]
    pub llm_models_timeout_secs: u64,

    #[arg(long, env = "LLM_CHAT_TIMEOUT_SECS", default_value_t = 120)]
    pub llm_chat_timeout_secs: u64,

    #[arg(long, env = "GUARD_TIMEOUT_SECS", default_value_t = 30)]
    pub guard_timeout_secs: u64,

    #[arg(long, env = "FILE_SCAN_TIMEOUT_SECS", default_value_t = 60)]
    pub file_scan_timeout_secs: u64,

    // LLM 配置
    #[arg(long, env = "OLLAMA_BASE_URL")]
    pub ollama_base_url: Option<String>,

    #[arg(long, env = "OLLAMA_MODEL")]
    pub ollama_model: Option<String>,

    // AI Guard 配置
    #[arg(long, env = "V1_GUARD_API_KEY")]
    pub guard_api_key: Option<String>,

    #[arg(long, env = "V1_GUARD_URL_BASE", default_value = DEFAULT_GUARD_URL)]
    pub guard_url: String,

    #[arg(long, env = "V1_GUARD_ENABLED", default_value = "true", action = clap::ArgAction::Set, value_parser = parse_flag)]
    pub guard_enabled: bool,

    #[arg(long, env = "V1_GUARD_DETAILED", default_value = "false", action = clap::ArgAction::Set, value_parser = parse_flag)]
    pub guard_detailed: bool,

    /// 检测哪一侧的消息: user, assistant, both
    #[arg(long, env = "ENFORCE_SIDE", default_value = "both")]
    pub enforce_side: EnforceSide,

    // File Security 配置
    #[arg(long, env = "V1FS_API_KEY")]
    pub file_scan_api_key: Option<String>,

    #[arg(long, env = "V1FS_REGION", default_value = DEFAULT_FILE_SCAN_REGION)]
    pub file_scan_region: String,

    #[arg(long, env = "V1FS_ENABLED", default_value = "true", action = clap::ArgAction::Set, value_parser = parse_flag)]
    pub file_scan_enabled: bool,

    /// 覆盖按区域推导的扫描服务地址
    #[arg(long, env = "V1FS_ENDPOINT")]
    pub file_scan_endpoint: Option<String>,
}

/// 各外部调用的超时上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub llm_models: Duration,
    pub llm_chat: Duration,
    pub guard: Duration,
    pub file_scan: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            llm_models: Duration::from_secs(10),
            llm_chat: Duration::from_secs(120),
            guard: Duration::from_secs(30),
            file_scan: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.history_capacity == 0 {
            anyhow::bail!("HISTORY_CAPACITY must be greater than zero");
        }
        let timeouts = [
            self.llm_models_timeout_secs,
            self.llm_chat_timeout_secs,
            self.guard_timeout_secs,
            self.file_scan_timeout_secs,
        ];
        if timeouts.contains(&0) {
            anyhow::bail!("timeouts must be at least one second");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            llm_models: Duration::from_secs(self.llm_models_timeout_secs),
            llm_chat: Duration::from_secs(self.llm_chat_timeout_secs),
            guard: Duration::from_secs(self.guard_timeout_secs),
            file_scan: Duration::from_secs(self.file_scan_timeout_secs),
        }
    }

    /// 由环境默认值构造运行时配置
    pub fn initial_security_config(&self) -> SecurityConfig {
        let mut config = SecurityConfig {
            llm_base_url: self.ollama_base_url.clone().unwrap_or_default(),
            llm_model: self.ollama_model.clone().unwrap_or_default(),
            guard_api_key: self.guard_api_key.clone().unwrap_or_default(),
            guard_url: self.guard_url.clone(),
            guard_enabled: self.guard_enabled,
            guard_detailed: self.guard_detailed,
            enforce_side: self.enforce_side,
            file_scan_api_key: self.file_scan_api_key.clone().unwrap_or_default(),
            file_scan_region: self.file_scan_region.clone(),
            file_scan_enabled: self.file_scan_enabled,
            file_scan_endpoint: self.file_scan_endpoint.clone(),
        };
        config.normalize();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::parse_from(["test"]);

        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.history_capacity, 500);
        assert_eq!(config.guard_url, DEFAULT_GUARD_URL);
        assert!(config.guard_enabled);
        assert!(!config.guard_detailed);
        assert_eq!(config.enforce_side, EnforceSide::Both);
        assert_eq!(config.file_scan_region, "us-east-1");
        assert_eq!(config.timeouts(), Timeouts::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_custom_values() {
        let config = AppConfig::parse_from([
            "test",
            "--port",
            "9001",
            "--ollama-base-url",
            "http://ollama:11434/api/",
            "--ollama-model",
            "llama3.2",
            "--guard-enabled",
            "no",
            "--enforce-side",
            "user",
            "--llm-chat-timeout-secs",
            "5",
        ]);

        assert_eq!(config.bind_addr(), "0.0.0.0:9001");
        assert!(!config.guard_enabled);
        assert_eq!(config.enforce_side, EnforceSide::User);
        assert_eq!(config.timeouts().llm_chat, Duration::from_secs(5));

        let security = config.initial_security_config();
        assert_eq!(security.llm_base_url, "http://ollama:11434");
        assert_eq!(security.llm_model, "llama3.2");
        assert!(security.guard_api_key.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::parse_from(["test", "--history-capacity", "0"]);
        assert!(config.validate().is_err());

        let config = AppConfig::parse_from(["test", "--guard-timeout-secs", "0"]);
        assert!(config.validate().is_err());
    }
}
