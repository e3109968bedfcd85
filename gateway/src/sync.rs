//! 同步操作
//!
//! `/sync` 端点和周期调度器共用同一个入口。每次调用都启动独立的
//! `bw sync` 进程并拥有自己的输出缓冲，并发调用互不干扰。

use std::sync::Arc;
use std::time::Instant;

use adapter_bitwarden::VaultCli;
use errors::{AppError, AppResult};
use tracing::{info, warn};

use crate::health::SETUP_INCOMPLETE;
use crate::state::CredentialStore;

/// 同步触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Manual,
    Periodic,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Periodic => "periodic",
        }
    }
}

/// 同步服务
pub struct SyncService {
    cli: Arc<dyn VaultCli>,
    store: CredentialStore,
}

impl SyncService {
    pub fn new(cli: Arc<dyn VaultCli>, store: CredentialStore) -> Self {
        Self { cli, store }
    }

    /// 执行 `bw sync`，成功时返回命令输出
    ///
    /// 失败只体现在返回值里，从不升级为致命错误。
    pub async fn run(&self, trigger: SyncTrigger) -> AppResult<String> {
        let credential = self
            .store
            .credential()
            .ok_or_else(|| AppError::unhealthy(SETUP_INCOMPLETE))?;

        info!(trigger = trigger.as_str(), "Executing 'bw sync'");
        let start = Instant::now();
        let result = self.cli.sync(credential.as_secret()).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        telemetry::record_sync(trigger.as_str(), result.is_ok(), duration_ms);

        match result {
            Ok(output) => {
                info!(trigger = trigger.as_str(), duration_ms, "Sync successful");
                Ok(output)
            }
            Err(e) => {
                warn!(trigger = trigger.as_str(), error = %e, "Sync failed");
                Err(AppError::sync_failed(e.output()))
            }
        }
    }
}
