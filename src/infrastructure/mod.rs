//! 基础设施层：外部系统交互
//!
//! 提供与外部服务（LLM、AI Guard、File Security）的交互能力、日志和 Web 服务

pub mod file_scan;
pub mod guard;
pub mod http;
pub mod llm;
pub mod logger;
pub mod web;
