//! Sidecar 装配与生命周期
//!
//! 启动顺序：metrics → 网关监听 → 信号处理 → 认证握手 → 周期同步 → `bw serve`。
//! 网关先于认证启动，握手期间健康检查返回 503。

use std::sync::Arc;

use adapter_bitwarden::{BwCli, BwCliConfigBuilder, HttpStatusProbe};
use axum::Router;
use bootstrap::{run_with_shutdown, shutdown_signal, MetricsServer, ShutdownController};
use config::SidecarConfig;
use errors::{AppError, AppResult, SetupError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::health::HealthEvaluator;
use crate::proxy::ReverseProxy;
use crate::routing::{gateway_router, AppState};
use crate::scheduler::{resolve_interval, PeriodicSync};
use crate::setup::SetupCoordinator;
use crate::state::{Credential, CredentialStore};
use crate::supervisor::BackendSupervisor;
use crate::sync::SyncService;

/// 根据配置构造 `bw` 客户端
pub fn bw_cli(config: &SidecarConfig) -> BwCli {
    let cli_config = BwCliConfigBuilder::new(config.bitwarden.binary.clone())
        .with_api_key_secrets(
            config.bitwarden.client_id.clone(),
            config.bitwarden.client_secret.clone(),
        )
        .with_password(config.bitwarden.password.clone())
        .with_command_timeout(config.timeouts.command)
        .with_sync_timeout(config.timeouts.sync)
        .build();

    BwCli::new(cli_config)
}

/// 根据配置构造认证协调器
pub fn setup_coordinator(config: &SidecarConfig, cli: &BwCli, store: CredentialStore) -> SetupCoordinator {
    SetupCoordinator::new(Arc::new(cli.clone()), store)
        .with_host(config.bitwarden.host.clone())
        .with_verify(config.verify_unlock)
        .with_debug(config.debug)
}

/// 子进程模式下的 sidecar
pub struct Sidecar {
    config: SidecarConfig,
    cli: BwCli,
    store: CredentialStore,
    setup: Arc<SetupCoordinator>,
    state: AppState,
    shutdown: ShutdownController,
}

impl Sidecar {
    pub fn new(config: SidecarConfig) -> AppResult<Self> {
        let cli = bw_cli(&config);
        let store = CredentialStore::new();
        let backend_url = config.server.backend_url();

        let probe = HttpStatusProbe::new(&backend_url, config.timeouts.health)
            .map_err(|e| AppError::internal(format!("failed to build health probe: {}", e)))?;

        let state = AppState {
            health: Arc::new(HealthEvaluator::new(
                store.clone(),
                Arc::new(probe),
                config.timeouts.health,
            )),
            sync: Arc::new(SyncService::new(Arc::new(cli.clone()), store.clone())),
            proxy: Arc::new(ReverseProxy::new(backend_url)?),
        };

        Ok(Self {
            setup: Arc::new(setup_coordinator(&config, &cli, store.clone())),
            config,
            cli,
            store,
            state,
            shutdown: ShutdownController::new(),
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        gateway_router(self.state.clone())
    }

    /// 执行认证握手，重复调用返回同一个结果
    pub async fn perform_setup(&self) -> Result<Credential, SetupError> {
        self.setup.perform_setup().await
    }

    /// 运行到关闭信号或致命错误
    ///
    /// 认证失败和后端退出都以错误返回，调用方据此以非零状态退出。
    pub async fn run(self) -> AppResult<()> {
        let shutdown = self.shutdown.clone();

        if let Some(addr) = self.config.telemetry.metrics_addr {
            self.spawn_metrics(addr);
        }

        let listen_addr = self.config.server.listen_addr;
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| AppError::internal(format!("failed to bind {}: {}", listen_addr, e)))?;
        info!(
            addr = %listen_addr,
            backend = %self.config.server.backend_url(),
            "Gateway listening"
        );

        let mut server = self.spawn_server(listener);

        let signal_shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_shutdown.shutdown();
        });

        let credential = match run_with_shutdown(&shutdown, self.perform_setup()).await {
            Some(Ok(credential)) => credential,
            Some(Err(e)) => {
                shutdown.shutdown();
                server_result(server.await)?;
                return Err(e.into());
            }
            None => return server_result(server.await),
        };

        let interval = resolve_interval(self.config.sync_interval.as_deref());
        let scheduler = PeriodicSync::new(self.state.sync.clone(), self.store.clone(), interval);
        tokio::spawn(scheduler.run(shutdown.clone()));

        let supervisor = BackendSupervisor::new(
            self.cli.clone(),
            self.store.clone(),
            self.config.server.backend_host.clone(),
            self.config.server.backend_port,
        );

        // 关闭信号优先，正常关闭时网关退出不算故障
        let outcome = tokio::select! {
            biased;
            _ = shutdown.shutdown_signal() => Ok(()),
            result = supervisor.run(&credential) => match result {
                Ok(never) => match never {},
                Err(e) => Err(e),
            },
            result = &mut server => {
                shutdown.shutdown();
                server_result(result)?;
                return Err(AppError::internal("gateway server stopped unexpectedly"));
            }
        };

        shutdown.shutdown();
        server_result(server.await)?;
        info!("Sidecar stopped");
        outcome
    }

    fn spawn_server(&self, listener: TcpListener) -> JoinHandle<std::io::Result<()>> {
        let app = self.router();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.shutdown_signal())
                .await
        })
    }

    fn spawn_metrics(&self, addr: std::net::SocketAddr) {
        let handle = match telemetry::init_metrics() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Failed to install metrics recorder, metrics disabled");
                return;
            }
        };

        let server = MetricsServer::new(handle, addr);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve(shutdown).await {
                warn!(error = %e, "Metrics server stopped");
            }
        });
    }
}

fn server_result(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> AppResult<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(AppError::internal(format!("gateway server failed: {}", e))),
        Err(e) => Err(AppError::internal(format!("gateway server task failed: {}", e))),
    }
}
