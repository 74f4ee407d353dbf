//! AI 安全演示网关入口

use std::sync::Arc;

use aiguard_gateway::{
    logger::{self, LogConfig},
    AppConfig, AppState, ConfigStore, FileSecurityClient, GuardClient, HistoryLog, HttpExchange,
    OllamaClient, Orchestrator, VERSION,
};
use anyhow::Result;
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cfg = AppConfig::parse();
    cfg.validate()?;

    logger::init(LogConfig::with_format(cfg.log_format));
    info!(version = VERSION, "starting AI security demo gateway");

    let security = cfg.initial_security_config();
    info!(
        llm_configured = security.llm_configured(),
        guard_configured = security.guard_configured(),
        guard_enabled = security.guard_enabled,
        enforce_side = %security.enforce_side,
        file_scan_configured = security.file_scan_configured(),
        file_scan_region = %security.file_scan_region,
        "initial configuration loaded"
    );

    let timeouts = cfg.timeouts();
    let http = HttpExchange::new();
    let orchestrator = Orchestrator::new(
        Arc::new(ConfigStore::new(security)),
        Arc::new(HistoryLog::new(cfg.history_capacity)),
        Arc::new(OllamaClient::new(http.clone(), &timeouts)),
        Arc::new(GuardClient::new(http.clone(), timeouts.guard)),
        Arc::new(FileSecurityClient::new(http, timeouts.file_scan)),
    );

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
    });

    aiguard_gateway::start_web_server(&cfg.bind_addr(), state).await
}
