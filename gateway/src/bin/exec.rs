//! Bitwarden sidecar（进程镜像替换模式）
//!
//! 完成认证握手后用 `bw serve` 替换当前进程镜像，不提供网关和周期同步。
//! 会话密钥只出现在新进程的环境里。

use std::process::ExitCode;

use bootstrap::{init_runtime, report_fatal};
use bw_gateway::{bw_cli, setup_coordinator, CredentialStore};
use config::SidecarConfig;
use errors::AppError;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match SidecarConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            report_fatal(&AppError::config(e.to_string()));
            return ExitCode::FAILURE;
        }
    };

    init_runtime(&config);

    let cli = bw_cli(&config);
    let coordinator = setup_coordinator(&config, &cli, CredentialStore::new());

    let credential = match coordinator.perform_setup().await {
        Ok(credential) => credential,
        Err(e) => {
            report_fatal(&AppError::from(e));
            return ExitCode::FAILURE;
        }
    };

    info!(
        hostname = %config.server.backend_host,
        port = config.server.backend_port,
        "Replacing process with 'bw serve'"
    );

    let command = cli.serve_std_command(
        credential.as_secret(),
        &config.server.backend_host,
        config.server.backend_port,
    );

    let e = replace_process(command);
    report_fatal(&AppError::internal(format!("failed to exec {}: {}", cli.binary(), e)));
    ExitCode::FAILURE
}

/// 只在失败时返回
#[cfg(unix)]
fn replace_process(mut command: std::process::Command) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    command.exec()
}

#[cfg(not(unix))]
fn replace_process(_command: std::process::Command) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process image replacement requires a Unix platform",
    )
}
