//! 凭据存储
//!
//! 会话凭据和认证状态是进程内唯一的共享可变状态。凭据保存在
//! `Succeeded` 变体内部，读取方不可能看到"有凭据但未成功"或相反的组合。

use std::sync::Arc;

use errors::SetupError;
use secrecy::{ExposeSecret, Secret};
use tokio::sync::watch;
use tracing::debug;

/// 会话凭据（`BW_SESSION`）
///
/// `Debug` 输出被脱敏，只有显式调用 [`Credential::expose`] 才能拿到明文。
#[derive(Clone, Debug)]
pub struct Credential(Secret<String>);

impl Credential {
    pub fn new(session: Secret<String>) -> Self {
        Self(session)
    }

    pub fn as_secret(&self) -> &Secret<String> {
        &self.0
    }

    /// 明文凭据，仅用于调试模式日志
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.0.expose_secret() == other.0.expose_secret()
    }
}

impl Eq for Credential {}

/// 认证状态
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetupState {
    NotStarted,
    InProgress,
    Succeeded(Credential),
    Failed(String),
}

impl SetupState {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Succeeded(credential) => Some(credential),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

/// 凭据存储
///
/// 写入只在 crate 内部开放：认证协调器负责 `begin`/`complete`，
/// 进程监督器只能把 `Succeeded` 改为 `Failed`。
#[derive(Clone, Debug)]
pub struct CredentialStore {
    tx: Arc<watch::Sender<SetupState>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SetupState::NotStarted);
        Self { tx: Arc::new(tx) }
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> SetupState {
        self.tx.borrow().clone()
    }

    /// 认证成功且后端仍在运行时返回凭据
    pub fn credential(&self) -> Option<Credential> {
        self.tx.borrow().credential().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<SetupState> {
        self.tx.subscribe()
    }

    /// 等待认证结束（成功或失败）
    pub async fn wait_for_outcome(&self) -> SetupState {
        let mut rx = self.subscribe();
        match rx.wait_for(SetupState::is_terminal).await {
            Ok(state) => state.clone(),
            // 发送端由 self 持有，不会提前关闭
            Err(_) => self.snapshot(),
        }
    }

    /// 等待认证成功；认证失败时返回 `None`
    pub async fn wait_for_credential(&self) -> Option<Credential> {
        self.wait_for_outcome().await.credential().cloned()
    }

    /// `NotStarted -> InProgress`
    pub(crate) fn begin(&self) -> bool {
        self.transition(|state| match state {
            SetupState::NotStarted => Some(SetupState::InProgress),
            _ => None,
        })
    }

    /// `InProgress -> Succeeded | Failed`
    pub(crate) fn complete(&self, result: &Result<Credential, SetupError>) -> bool {
        self.transition(|state| match (state, result) {
            (SetupState::InProgress, Ok(credential)) => {
                Some(SetupState::Succeeded(credential.clone()))
            }
            (SetupState::InProgress, Err(e)) => Some(SetupState::Failed(e.to_string())),
            _ => None,
        })
    }

    /// `Succeeded -> Failed`，后端进程退出时调用
    pub(crate) fn mark_backend_down(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.transition(|state| match state {
            SetupState::Succeeded(_) => Some(SetupState::Failed(reason.clone())),
            _ => None,
        })
    }

    fn transition(&self, next: impl FnOnce(&SetupState) -> Option<SetupState>) -> bool {
        self.tx.send_if_modified(|state| match next(state) {
            Some(new_state) => {
                debug!(from = state.name(), to = new_state.name(), "Setup state transition");
                *state = new_state;
                true
            }
            None => false,
        })
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
