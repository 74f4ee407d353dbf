//! 运行时配置管理
//!
//! 进程内唯一的一份外部服务配置。启动时由环境默认值初始化，
//! 之后由前端按字段局部更新，所有请求立即看到新值。

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::infrastructure::logger::Sanitizer;

/// AI Guard 默认接口地址
pub const DEFAULT_GUARD_URL: &str = "https://api.xdr.trendmicro.com/beta/aiSecurity/guard";

/// File Security 默认区域
pub const DEFAULT_FILE_SCAN_REGION: &str = "us-east-1";

/// 解析 `true/1/yes/on` 形式的开关
pub fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(format!("invalid boolean flag: {}", other)),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// 开关字段接受布尔、数字或字符串
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FlagValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FlagValue::Bool(value)) => Ok(Some(value)),
        Some(FlagValue::Int(value)) => Ok(Some(value != 0)),
        Some(FlagValue::Text(value)) => parse_flag(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// 安全检测作用的消息侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforceSide {
    User,
    Assistant,
    #[default]
    Both,
}

impl EnforceSide {
    /// 是否检测用户输入
    pub fn covers_user(self) -> bool {
        matches!(self, EnforceSide::User | EnforceSide::Both)
    }

    /// 是否检测模型输出
    pub fn covers_assistant(self) -> bool {
        matches!(self, EnforceSide::Assistant | EnforceSide::Both)
    }
}

impl std::str::FromStr for EnforceSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(EnforceSide::User),
            "assistant" => Ok(EnforceSide::Assistant),
            "both" => Ok(EnforceSide::Both),
            _ => Err(format!("Unknown enforce side: {}", s)),
        }
    }
}

impl std::fmt::Display for EnforceSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnforceSide::User => write!(f, "user"),
            EnforceSide::Assistant => write!(f, "assistant"),
            EnforceSide::Both => write!(f, "both"),
        }
    }
}

/// 外部服务配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub llm_base_url: String,
    pub llm_model: String,
    pub guard_api_key: String,
    pub guard_url: String,
    pub guard_enabled: bool,
    /// 请求 AI Guard 返回详细结果
    pub guard_detailed: bool,
    pub enforce_side: EnforceSide,
    pub file_scan_api_key: String,
    pub file_scan_region: String,
    pub file_scan_enabled: bool,
    pub file_scan_endpoint: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            llm_base_url: String::new(),
            llm_model: String::new(),
            guard_api_key: String::new(),
            guard_url: DEFAULT_GUARD_URL.to_string(),
            guard_enabled: true,
            guard_detailed: false,
            enforce_side: EnforceSide::Both,
            file_scan_api_key: String::new(),
            file_scan_region: DEFAULT_FILE_SCAN_REGION.to_string(),
            file_scan_enabled: true,
            file_scan_endpoint: None,
        }
    }
}

/// 规范化 LLM 地址：去掉结尾的 `/` 和 `/api`
pub fn normalize_llm_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/api")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

impl SecurityConfig {
    /// 只做类型层面的整理，不校验地址和密钥是否可用
    pub fn normalize(&mut self) {
        self.llm_base_url = normalize_llm_url(&self.llm_base_url);
        self.llm_model = self.llm_model.trim().to_string();
        self.guard_api_key = self.guard_api_key.trim().to_string();
        self.guard_url = self.guard_url.trim().trim_end_matches('/').to_string();
        if self.guard_url.is_empty() {
            self.guard_url = DEFAULT_GUARD_URL.to_string();
        }
        self.file_scan_api_key = self.file_scan_api_key.trim().to_string();
        self.file_scan_region = self.file_scan_region.trim().to_string();
        if self.file_scan_region.is_empty() {
            self.file_scan_region = DEFAULT_FILE_SCAN_REGION.to_string();
        }
        self.file_scan_endpoint = self
            .file_scan_endpoint
            .take()
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty());
    }

    pub fn llm_configured(&self) -> bool {
        !self.llm_base_url.is_empty() && !self.llm_model.is_empty()
    }

    pub fn guard_configured(&self) -> bool {
        !self.guard_api_key.is_empty() && !self.guard_url.is_empty()
    }

    /// AI Guard 已启用且已配置密钥
    pub fn guard_active(&self) -> bool {
        self.guard_enabled && self.guard_configured()
    }

    pub fn file_scan_configured(&self) -> bool {
        !self.file_scan_api_key.is_empty() && !self.file_scan_region.is_empty()
    }

    /// 对前端展示的视图，密钥只暴露掩码
    pub fn view(&self) -> ConfigView {
        ConfigView {
            llm_base_url: self.llm_base_url.clone(),
            llm_model: self.llm_model.clone(),
            guard_api_key_set: !self.guard_api_key.is_empty(),
            guard_api_key_masked: masked_or_empty(&self.guard_api_key),
            guard_url: self.guard_url.clone(),
            guard_enabled: self.guard_enabled,
            guard_detailed: self.guard_detailed,
            enforce_side: self.enforce_side,
            file_scan_api_key_set: !self.file_scan_api_key.is_empty(),
            file_scan_api_key_masked: masked_or_empty(&self.file_scan_api_key),
            file_scan_region: self.file_scan_region.clone(),
            file_scan_enabled: self.file_scan_enabled,
            file_scan_endpoint: self.file_scan_endpoint.clone(),
        }
    }
}

fn masked_or_empty(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        Sanitizer::api_key(key)
    }
}

/// 配置的只读视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigView {
    pub llm_base_url: String,
    pub llm_model: String,
    pub guard_api_key_set: bool,
    pub guard_api_key_masked: String,
    pub guard_url: String,
    pub guard_enabled: bool,
    pub guard_detailed: bool,
    pub enforce_side: EnforceSide,
    pub file_scan_api_key_set: bool,
    pub file_scan_api_key_masked: String,
    pub file_scan_region: String,
    pub file_scan_enabled: bool,
    pub file_scan_endpoint: Option<String>,
}

/// 局部更新：只有出现的字段会被替换
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub guard_api_key: Option<String>,
    pub guard_url: Option<String>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub guard_enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub guard_detailed: Option<bool>,
    /// 无法识别的取值按 `both` 处理
    pub enforce_side: Option<String>,
    pub file_scan_api_key: Option<String>,
    pub file_scan_region: Option<String>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub file_scan_enabled: Option<bool>,
    pub file_scan_endpoint: Option<String>,
}

impl ConfigUpdate {
    /// 更新涉及的字段名，用于日志
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        macro_rules! touched {
            ($($name:ident),*) => {
                $(if self.$name.is_some() { fields.push(stringify!($name)); })*
            };
        }
        touched!(
            llm_base_url,
            llm_model,
            guard_api_key,
            guard_url,
            guard_enabled,
            guard_detailed,
            enforce_side,
            file_scan_api_key,
            file_scan_region,
            file_scan_enabled,
            file_scan_endpoint
        );
        fields
    }

    fn apply_to(self, config: &mut SecurityConfig) {
        if let Some(v) = self.llm_base_url {
            config.llm_base_url = v;
        }
        if let Some(v) = self.llm_model {
            config.llm_model = v;
        }
        if let Some(v) = self.guard_api_key {
            config.guard_api_key = v;
        }
        if let Some(v) = self.guard_url {
            config.guard_url = v;
        }
        if let Some(v) = self.guard_enabled {
            config.guard_enabled = v;
        }
        if let Some(v) = self.guard_detailed {
            config.guard_detailed = v;
        }
        if let Some(v) = self.enforce_side {
            config.enforce_side = v.parse().unwrap_or_else(|_| {
                warn!(value = %v, "unknown enforce side, falling back to both");
                EnforceSide::Both
            });
        }
        if let Some(v) = self.file_scan_api_key {
            config.file_scan_api_key = v;
        }
        if let Some(v) = self.file_scan_region {
            config.file_scan_region = v;
        }
        if let Some(v) = self.file_scan_enabled {
            config.file_scan_enabled = v;
        }
        if let Some(v) = self.file_scan_endpoint {
            config.file_scan_endpoint = Some(v);
        }
    }
}

/// 配置存储
///
/// 每个进程只有一份，由 `Arc` 共享给所有请求
pub struct ConfigStore {
    current: RwLock<SecurityConfig>,
}

impl ConfigStore {
    pub fn new(initial: SecurityConfig) -> Self {
        let mut initial = initial;
        initial.normalize();
        Self {
            current: RwLock::new(initial),
        }
    }

    /// 当前配置的快照
    pub async fn get(&self) -> SecurityConfig {
        self.current.read().await.clone()
    }

    /// 合并局部更新并返回合并后的完整配置
    pub async fn update(&self, update: ConfigUpdate) -> SecurityConfig {
        let fields = update.touched_fields();
        let mut current = self.current.write().await;
        update.apply_to(&mut current);
        current.normalize();
        info!(fields = ?fields, "configuration updated");
        current.clone()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}
