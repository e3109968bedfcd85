//! bw-gateway - Bitwarden CLI sidecar
//!
//! 在 `bw serve` 前面提供一个小型网关：
//! - 认证握手（最多执行一次）与凭据共享
//! - `/healthz` 实时健康检查
//! - `/sync` 手动同步与周期同步
//! - 其余请求反向代理到 `bw serve`
//! - 监督 `bw serve` 子进程

pub mod app;
pub mod health;
pub mod proxy;
pub mod routing;
pub mod scheduler;
pub mod setup;
pub mod state;
pub mod supervisor;
pub mod sync;

pub use app::{bw_cli, setup_coordinator, Sidecar};
pub use health::{HealthEvaluator, HealthReport};
pub use proxy::ReverseProxy;
pub use routing::{gateway_router, AppState};
pub use scheduler::{resolve_interval, PeriodicSync};
pub use setup::SetupCoordinator;
pub use state::{Credential, CredentialStore, SetupState};
pub use supervisor::BackendSupervisor;
pub use sync::{SyncService, SyncTrigger};
