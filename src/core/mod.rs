//! 核心层：领域模型和共享状态
//!
//! 包含运行时配置、调用历史和对话/扫描的领域类型

pub mod config;
pub mod history;
pub mod types;
