//! 健康检查
//!
//! 健康与否由认证状态和一次实时的后端往返共同决定。

use std::sync::Arc;
use std::time::Duration;

use adapter_bitwarden::{BackendProbe, BackendStatus};
use tracing::{debug, warn};

use crate::state::CredentialStore;

pub const SETUP_INCOMPLETE: &str = "setup incomplete";
pub const BACKEND_UNREACHABLE: &str = "backend unreachable";
pub const VAULT_LOCKED: &str = "vault locked";

/// 健康检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReport {
    Healthy,
    Unhealthy(String),
}

impl HealthReport {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::Unhealthy(reason.into())
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// 健康检查器
pub struct HealthEvaluator {
    store: CredentialStore,
    probe: Arc<dyn BackendProbe>,
    timeout: Duration,
}

impl HealthEvaluator {
    pub fn new(store: CredentialStore, probe: Arc<dyn BackendProbe>, timeout: Duration) -> Self {
        Self {
            store,
            probe,
            timeout,
        }
    }

    /// 执行健康检查
    ///
    /// 没有有效凭据时不发起任何外部调用。后端探测有超时上限，
    /// 后端挂起不会拖住健康检查端点。
    pub async fn evaluate(&self) -> HealthReport {
        let report = self.check().await;
        telemetry::record_health_check(report.is_healthy());
        report
    }

    async fn check(&self) -> HealthReport {
        if self.store.credential().is_none() {
            return HealthReport::unhealthy(SETUP_INCOMPLETE);
        }

        match tokio::time::timeout(self.timeout, self.probe.status()).await {
            Ok(Ok(BackendStatus::Unlocked)) => {
                debug!("Backend is unlocked");
                HealthReport::Healthy
            }
            Ok(Ok(BackendStatus::Locked(status))) => {
                warn!(status = %status, "Backend reports vault is not unlocked");
                HealthReport::unhealthy(VAULT_LOCKED)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Backend health probe failed");
                HealthReport::unhealthy(BACKEND_UNREACHABLE)
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Backend health probe timed out");
                HealthReport::unhealthy(BACKEND_UNREACHABLE)
            }
        }
    }
}
