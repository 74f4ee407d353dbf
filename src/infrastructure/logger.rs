//! 日志
//!
//! - 三种输出格式：pretty（终端）、compact、json（日志收集）
//! - 每个用户操作一个 `request_id`，同时作为历史记录的关联 ID
//! - 外部调用耗时写到 `metrics` target
//! - 密钥在记录和输出前脱敏

use std::time::{Duration, Instant};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, FormattedFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};
use uuid::Uuid;

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Pretty,
    Compact,
    /// 每行一个 JSON 对象，带当前 span
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub enable_color: bool,
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            enable_color: true,
            show_target: true,
        }
    }
}

impl LogConfig {
    pub fn with_format(format: LogFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }
}

/// 初始化日志系统
///
/// 级别由 `RUST_LOG` 控制，默认 `info`
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer().event_format(GatewayFormatter::new(config));
            registry.with(layer).init();
        }
        LogFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(config.show_target)
                .with_ansi(config.enable_color);
            registry.with(layer).init();
        }
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(config.show_target)
                .with_current_span(true)
                .with_span_list(false);
            registry.with(layer).init();
        }
    }
}

/// 请求追踪上下文
///
/// 每个用户操作（一次对话、一次扫描）创建一个，
/// 该操作触发的所有外部调用在历史中共享同一个 `request_id`
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub start_time: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 创建带有请求 ID 的 span
#[macro_export]
macro_rules! request_span {
    ($ctx:expr, $operation:expr) => {
        tracing::info_span!(
            "request",
            request_id = %$ctx.request_id,
            operation = %$operation,
        )
    };
}

/// 外部调用计时，drop 时写一条 `metrics` 事件
pub struct Timer {
    operation: &'static str,
    request_id: String,
    start: Instant,
}

impl Timer {
    pub fn start(operation: &'static str, ctx: &RequestContext) -> Self {
        Self {
            operation,
            request_id: ctx.request_id.clone(),
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            target: "metrics",
            request_id = %self.request_id,
            operation = self.operation,
            elapsed_ms,
            "external call timed"
        );
    }
}

/// 密钥脱敏
pub struct Sanitizer;

impl Sanitizer {
    /// 保留前 4 位和后 2 位；不足 8 位的密钥整体隐藏
    pub fn api_key(key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        if chars.len() < 8 {
            return "***".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 6), tail)
    }

    /// `Authorization` 头只脱敏凭据部分，认证方案原样保留
    pub fn authorization(value: &str) -> String {
        match value.split_once(' ') {
            Some((scheme, credential)) => format!("{} {}", scheme, Self::api_key(credential)),
            None => Self::api_key(value),
        }
    }
}

/// 终端格式：`时间 级别 target [span 字段] 消息`
pub struct GatewayFormatter {
    config: LogConfig,
}

impl GatewayFormatter {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }

    fn level_label(&self, level: Level) -> String {
        let label = format!("{:>5}", level.to_string());
        if !self.config.enable_color {
            return label;
        }
        let color = match level {
            Level::ERROR => 31,
            Level::WARN => 33,
            Level::INFO => 32,
            Level::DEBUG => 34,
            _ => 35,
        };
        format!("\x1b[{}m{}\x1b[0m", color, label)
    }
}

impl<S, N> FormatEvent<S, N> for GatewayFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} {} ",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.level_label(*meta.level())
        )?;
        if self.config.show_target {
            write!(writer, "{}: ", meta.target())?;
        }

        // 外层 span 的字段，通常是 request_id 和 operation
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "[{}] ", fields)?;
                    }
                }
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
