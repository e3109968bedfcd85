//! errors - 统一错误处理
//!
//! 启动阶段的错误（配置、登录、解锁、校验、后端退出）是致命的，
//! 运行阶段的错误（同步、健康检查、代理）只体现在 HTTP 响应里。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// 认证握手各步骤的错误
///
/// 每个变体携带失败命令的合并输出。实现 `Clone` 以便单次执行的结果
/// 能被所有并发调用方共享。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("bw config server failed: {0}")]
    Config(String),

    #[error("bw login failed: {0}")]
    Login(String),

    #[error("bw unlock failed: {0}")]
    Unlock(String),

    #[error("bw unlock --check failed: {0}")]
    Verify(String),
}

impl SetupError {
    /// 失败的步骤名称
    pub fn step(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Login(_) => "login",
            Self::Unlock(_) => "unlock",
            Self::Verify(_) => "verify",
        }
    }
}

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Setup failed at step '{step}': {0}", step = .0.step())]
    Setup(#[from] SetupError),

    #[error("Backend process exited: {0}")]
    BackendCrash(String),

    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error("{0}")]
    Unhealthy(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn backend_crash(msg: impl Into<String>) -> Self {
        Self::BackendCrash(msg.into())
    }

    pub fn sync_failed(msg: impl Into<String>) -> Self {
        Self::SyncFailed(msg.into())
    }

    pub fn unhealthy(msg: impl Into<String>) -> Self {
        Self::Unhealthy(msg.into())
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::BadGateway(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendCrash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SyncFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unhealthy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 错误响应体为纯文本，直接携带外部命令的诊断输出
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
