//! telemetry - 可观测性库

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化 tracing
///
/// `RUST_LOG` 优先于传入的默认级别。
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 初始化 Prometheus metrics
///
/// 全局 recorder 只能安装一次，重复安装返回错误。
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// 同步次数与耗时
pub fn record_sync(trigger: &'static str, success: bool, duration_ms: f64) {
    let labels = [
        ("trigger", trigger.to_string()),
        ("success", success.to_string()),
    ];

    metrics::counter!("bw_sync_total", &labels).increment(1);
    metrics::histogram!("bw_sync_duration_ms", &labels).record(duration_ms);
}

/// 健康检查结果
pub fn record_health_check(healthy: bool) {
    let labels = [("healthy", healthy.to_string())];
    metrics::counter!("bw_health_checks_total", &labels).increment(1);
}

/// 认证握手结果
pub fn record_setup(success: bool) {
    let labels = [("success", success.to_string())];
    metrics::counter!("bw_setup_total", &labels).increment(1);
}
