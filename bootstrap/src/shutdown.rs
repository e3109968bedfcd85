//! Graceful Shutdown

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shutdown 控制器
///
/// 触发后所有已经在等待以及之后才开始等待的任务都会收到通知。
#[derive(Clone, Debug, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        info!("Triggering shutdown");
        self.token.cancel();
    }

    /// 创建一个可以等待关闭的 future
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + use<> {
        self.token.clone().cancelled_owned()
    }
}

/// 运行带有 graceful shutdown 的任务
///
/// 关闭时任务被丢弃并返回 `None`。
pub async fn run_with_shutdown<Fut>(shutdown: &ShutdownController, task: Fut) -> Option<Fut::Output>
where
    Fut: Future,
{
    tokio::select! {
        result = task => Some(result),
        _ = shutdown.shutdown_signal() => {
            info!("Task cancelled due to shutdown");
            None
        }
    }
}
