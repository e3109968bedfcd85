//! Bitwarden sidecar（子进程模式）
//!
//! 网关、健康检查、周期同步与 `bw serve` 在同一个进程树中运行。

use std::process::ExitCode;

use bootstrap::{init_runtime, report_fatal};
use bw_gateway::Sidecar;
use config::SidecarConfig;
use errors::{AppError, AppResult};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_fatal(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AppResult<()> {
    // tracing 尚未初始化，配置错误只会出现在 stderr
    let config = SidecarConfig::from_env().map_err(|e| AppError::config(e.to_string()))?;

    init_runtime(&config);

    Sidecar::new(config)?.run().await
}
