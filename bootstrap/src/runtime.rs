//! 服务运行时

use std::fmt::Display;

use config::{LogFormat, SidecarConfig};
use telemetry::{init_tracing, init_tracing_json};
use tracing::{error, info};

/// 初始化服务运行时
pub fn init_runtime(config: &SidecarConfig) {
    // 初始化 tracing
    match config.telemetry.log_format {
        LogFormat::Json => init_tracing_json(config.effective_log_level()),
        LogFormat::Text => init_tracing(config.effective_log_level()),
    }

    info!(
        listen_addr = %config.server.listen_addr,
        backend = %config.server.backend_url(),
        debug = config.debug,
        "Runtime initialized"
    );
}

/// 等待关闭信号
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// 报告致命错误：一条 error 日志加一行 stderr 诊断
///
/// tracing 尚未初始化时日志被丢弃，stderr 这一行始终输出。
pub fn report_fatal(err: &dyn Display) {
    let line = fatal_line(err);
    error!(error = %line, "Fatal error, exiting");
    eprintln!("{}", line);
}

/// `FATAL: <error>`，外部命令输出中的换行折叠为空格
fn fatal_line(err: &dyn Display) -> String {
    let message = err
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!("FATAL: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_line_is_single_line() {
        let err = "Setup failed at step 'unlock': bw unlock failed: ? Master password: [hidden]\r\n\nInvalid master password. - exit status: 1";
        let line = fatal_line(&err);
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
        assert_eq!(
            line,
            "FATAL: Setup failed at step 'unlock': bw unlock failed: ? Master password: [hidden] Invalid master password. - exit status: 1"
        );
    }

    #[test]
    fn test_fatal_line_plain_message() {
        assert_eq!(fatal_line(&"Backend process exited: exit status: 3"), "FATAL: Backend process exited: exit status: 3");
    }
}
