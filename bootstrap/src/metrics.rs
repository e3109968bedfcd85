//! Metrics 模块
//!
//! 提供 Prometheus metrics 导出

use std::net::SocketAddr;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use crate::ShutdownController;

/// Metrics 路由
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}

/// Metrics HTTP 服务器，与网关端口分开监听
pub struct MetricsServer {
    handle: PrometheusHandle,
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(handle: PrometheusHandle, addr: SocketAddr) -> Self {
        Self { handle, addr }
    }

    /// 启动 HTTP 服务器，直到收到关闭信号
    pub async fn serve(self, shutdown: ShutdownController) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Metrics HTTP server starting");

        axum::serve(listener, metrics_router(self.handle))
            .with_graceful_shutdown(shutdown.shutdown_signal())
            .await
    }
}

/// Metrics 端点处理器
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        handle.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_endpoint() {
        // 不安装全局 recorder，只取 handle
        let handle = PrometheusBuilder::new().build_recorder().handle();

        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = metrics_router(handle).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
