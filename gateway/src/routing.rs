//! 网关路由
//!
//! `/healthz` 和 `/sync` 由 sidecar 自己处理，其余路径全部转发到 `bw serve`。

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use errors::{AppError, AppResult};
use tower_http::trace::TraceLayer;

use crate::health::{HealthEvaluator, HealthReport};
use crate::proxy::{proxy_handler, ReverseProxy};
use crate::sync::{SyncService, SyncTrigger};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthEvaluator>,
    pub sync: Arc<SyncService>,
    pub proxy: Arc<ReverseProxy>,
}

pub fn gateway_router(state: AppState) -> Router {
    let body_limit = state.proxy.max_body_bytes();

    Router::new()
        .route("/healthz", get(healthz))
        .route("/sync", post(sync).fallback(method_not_allowed))
        .fallback(proxy_handler)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查
async fn healthz(State(state): State<AppState>) -> AppResult<&'static str> {
    match state.health.evaluate().await {
        HealthReport::Healthy => Ok("OK"),
        HealthReport::Unhealthy(reason) => Err(AppError::unhealthy(reason)),
    }
}

/// 手动触发一次同步
async fn sync(State(state): State<AppState>) -> AppResult<(StatusCode, &'static str)> {
    state.sync.run(SyncTrigger::Manual).await?;
    Ok((StatusCode::OK, "Sync successful"))
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CredentialStore;
    use adapter_bitwarden::{BwCli, BwCliConfig, HttpStatusProbe};
    use axum::{body::Body, http::Request};
    use std::time::Duration;
    use tower::ServiceExt;

    fn router_with_limit(limit: usize) -> Router {
        let store = CredentialStore::new();
        // 端口 1 上没有服务，转发会得到 502
        let target = "http://127.0.0.1:1";
        let status = HttpStatusProbe::new(target, Duration::from_secs(1)).unwrap();

        gateway_router(AppState {
            health: Arc::new(HealthEvaluator::new(store.clone(), Arc::new(status), Duration::from_secs(1))),
            sync: Arc::new(SyncService::new(Arc::new(BwCli::new(BwCliConfig::default())), store)),
            proxy: Arc::new(ReverseProxy::new(target).unwrap().with_max_body_bytes(limit)),
        })
    }

    fn post(body: Vec<u8>) -> Request<Body> {
        Request::post("/object/attachment")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let response = router_with_limit(1024)
            .oneshot(post(vec![b'x'; 4096]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_within_limit_is_forwarded() {
        let response = router_with_limit(1024)
            .oneshot(post(vec![b'x'; 512]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
