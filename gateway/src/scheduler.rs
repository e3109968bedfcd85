//! 周期同步调度器

use std::sync::Arc;
use std::time::Duration;

use bootstrap::{run_with_shutdown, ShutdownController};
use config::{parse_sync_interval, DEFAULT_SYNC_INTERVAL};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::state::CredentialStore;
use crate::sync::{SyncService, SyncTrigger};

/// 解析同步间隔，无法解析时回退到默认值（2 分钟）并记录警告
pub fn resolve_interval(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return DEFAULT_SYNC_INTERVAL;
    };

    match parse_sync_interval(raw) {
        Ok(interval) => interval,
        Err(e) => {
            warn!(
                value = raw,
                error = %e,
                "Invalid format for BW_SYNC_INTERVAL, using default of 2 minutes"
            );
            DEFAULT_SYNC_INTERVAL
        }
    }
}

/// 周期同步
///
/// 每次同步都在循环内等待完成，tick 之间不会重叠；同步耗时超过间隔时
/// 错过的 tick 直接跳过。
pub struct PeriodicSync {
    sync: Arc<SyncService>,
    store: CredentialStore,
    interval: Duration,
}

impl PeriodicSync {
    pub fn new(sync: Arc<SyncService>, store: CredentialStore, interval: Duration) -> Self {
        Self {
            sync,
            store,
            interval,
        }
    }

    /// 运行调度循环，直到收到关闭信号
    pub async fn run(self, shutdown: ShutdownController) {
        // 认证成功后才开始计时
        match run_with_shutdown(&shutdown, self.store.wait_for_credential()).await {
            Some(Some(_)) => {}
            Some(None) => {
                warn!("Setup failed, periodic sync not started");
                return;
            }
            None => return,
        }

        info!(interval = ?self.interval, "Starting periodic sync");

        // 第一次同步在一个间隔之后
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.shutdown_signal() => {
                    info!("Periodic sync stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            info!("Periodic sync triggered");
            if let Err(e) = self.sync.run(SyncTrigger::Periodic).await {
                warn!(error = %e, "Periodic sync failed");
            }
        }
    }
}
