//! 认证协调器
//!
//! config → login → unlock → (verify)，整个握手在进程生命周期内最多执行一次。
//! 并发触发会合并为同一次执行，所有调用方拿到同一个结果（包括同一个失败）。

use std::sync::Arc;

use adapter_bitwarden::VaultCli;
use errors::SetupError;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::state::{Credential, CredentialStore};

/// 认证协调器
pub struct SetupCoordinator {
    cli: Arc<dyn VaultCli>,
    store: CredentialStore,
    host: Option<String>,
    verify: bool,
    debug: bool,
    result: OnceCell<Result<Credential, SetupError>>,
}

impl SetupCoordinator {
    pub fn new(cli: Arc<dyn VaultCli>, store: CredentialStore) -> Self {
        Self {
            cli,
            store,
            host: None,
            verify: true,
            debug: false,
            result: OnceCell::new(),
        }
    }

    /// 自托管服务地址
    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    /// 是否在解锁后立即校验凭据
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// 调试模式下记录凭据明文
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// 执行认证握手（single-flight）
    pub async fn perform_setup(&self) -> Result<Credential, SetupError> {
        self.result
            .get_or_init(|| self.run_handshake())
            .await
            .clone()
    }

    async fn run_handshake(&self) -> Result<Credential, SetupError> {
        self.store.begin();
        let result = self.handshake().await;

        // 先写入状态再返回，任何读取方看到的凭据和状态都是一致的
        self.store.complete(&result);
        telemetry::record_setup(result.is_ok());

        match &result {
            Ok(credential) => {
                info!("Bitwarden login successful");
                if self.debug {
                    debug!(session = %credential.expose(), "Obtained session key");
                }
            }
            Err(e) => {
                error!(step = e.step(), error = %e, "Bitwarden setup failed");
            }
        }

        result
    }

    async fn handshake(&self) -> Result<Credential, SetupError> {
        if let Some(host) = &self.host {
            self.cli
                .configure_server(host)
                .await
                .map_err(|e| SetupError::Config(e.to_string()))?;
        }

        info!("Executing Bitwarden login");
        self.cli
            .login_apikey()
            .await
            .map_err(|e| SetupError::Login(e.to_string()))?;
        info!("Logged in successfully");

        info!("Unlocking vault");
        let session = self
            .cli
            .unlock()
            .await
            .map_err(|e| SetupError::Unlock(e.to_string()))?;

        if self.verify {
            self.cli
                .check_unlocked(&session)
                .await
                .map_err(|e| SetupError::Verify(e.to_string()))?;
            debug!("Session key verified");
        }

        Ok(Credential::new(session))
    }
}
