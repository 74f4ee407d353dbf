//! 应用层：业务编排
//!
//! 对话、文件扫描和内置安全测试的调用顺序

pub mod orchestrator;
pub mod samples;
