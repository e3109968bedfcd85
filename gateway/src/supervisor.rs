//! 后端进程监督
//!
//! `bw serve` 作为子进程运行，凭据只注入子进程环境。没有重启策略：
//! 后端退出即为致命错误，由外部编排器重启整个 sidecar。

use std::convert::Infallible;

use adapter_bitwarden::BwCli;
use errors::{AppError, AppResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{error, info};

use crate::state::{Credential, CredentialStore};

/// 后端进程监督器
pub struct BackendSupervisor {
    cli: BwCli,
    store: CredentialStore,
    hostname: String,
    port: u16,
}

impl BackendSupervisor {
    pub fn new(cli: BwCli, store: CredentialStore, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            cli,
            store,
            hostname: hostname.into(),
            port,
        }
    }

    /// 启动 `bw serve` 并阻塞到其退出
    ///
    /// 只会以错误返回。退出时先把认证状态标记为失败，健康检查立即反映故障。
    /// future 被丢弃时子进程随之被杀掉。
    pub async fn run(&self, credential: &Credential) -> AppResult<Infallible> {
        info!(
            hostname = %self.hostname,
            port = self.port,
            "Starting 'bw serve' on internal port"
        );

        let mut child = match self
            .cli
            .serve_command(credential.as_secret(), &self.hostname, self.port)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return Err(self.backend_down(format!("failed to start 'bw serve': {}", e))),
        };

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, "stderr"));
        }

        let reason = match child.wait().await {
            Ok(status) => format!("'bw serve' exited with {}", status),
            Err(e) => format!("failed to wait for 'bw serve': {}", e),
        };

        Err(self.backend_down(reason))
    }

    fn backend_down(&self, reason: String) -> AppError {
        self.store.mark_backend_down(reason.clone());
        error!(reason = %reason, "Backend process is gone");
        AppError::backend_crash(reason)
    }
}

/// 把子进程输出逐行转发到 tracing
async fn forward_output<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: "bw_serve", stream, "{}", line),
            Ok(None) => break,
            Err(e) => {
                error!(target: "bw_serve", stream, error = %e, "Failed to read backend output");
                break;
            }
        }
    }
}
