//! config - 配置加载库
//!
//! 凭据类变量（`BW_*`）直接从环境读取并用 `Secret` 包裹，
//! 其余可调参数（`SIDECAR_*`）通过 figment 叠加默认值加载。

use std::net::SocketAddr;
use std::time::Duration;

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 周期同步的默认间隔（2 分钟）
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(120);

/// 必填的凭据变量
const REQUIRED_VARS: [&str; 3] = ["BW_CLIENTID", "BW_CLIENTSECRET", "BW_PASSWORD"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("missing one or more required environment variables ({vars})", vars = .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Bitwarden CLI 配置
#[derive(Debug, Clone)]
pub struct BitwardenConfig {
    /// 自托管服务地址，设置后先执行 `bw config server`
    pub host: Option<String>,
    pub client_id: Secret<String>,
    pub client_secret: Secret<String>,
    pub password: Secret<String>,
    /// `bw` 可执行文件路径
    pub binary: String,
}

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub backend_host: String,
    pub backend_port: u16,
}

impl ServerConfig {
    /// 反向代理的目标地址
    pub fn backend_url(&self) -> String {
        format!("http://{}:{}", self.backend_host, self.backend_port)
    }
}

/// 外部调用超时
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub health: Duration,
    pub sync: Duration,
    pub command: Duration,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// 遥测配置
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_addr: Option<SocketAddr>,
}

/// `SIDECAR_*` 可调参数
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SidecarSettings {
    listen_addr: String,
    backend_host: String,
    backend_port: u16,
    bw_binary: String,
    health_timeout: u64,
    sync_timeout: u64,
    command_timeout: u64,
    verify_unlock: bool,
    log_level: String,
    log_format: LogFormat,
    metrics_addr: Option<String>,
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8087".to_string(),
            backend_host: "127.0.0.1".to_string(),
            backend_port: 8088,
            bw_binary: "bw".to_string(),
            health_timeout: 5,
            sync_timeout: 60,
            command_timeout: 60,
            verify_unlock: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_addr: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    pub bitwarden: BitwardenConfig,
    pub server: ServerConfig,
    pub timeouts: TimeoutConfig,
    /// `BW_SYNC_INTERVAL` 原始值，由调度器解析并在失败时回退
    pub sync_interval: Option<String>,
    pub verify_unlock: bool,
    pub debug: bool,
    pub telemetry: TelemetryConfig,
}

impl SidecarConfig {
    /// 从 `.env` 文件和环境变量加载配置
    ///
    /// `.env` 不会覆盖已存在的环境变量。
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load()
    }

    fn load() -> Result<Self, ConfigError> {
        // 安全关键配置必须从环境变量读取，不提供默认值
        let missing: Vec<&'static str> = REQUIRED_VARS
            .into_iter()
            .filter(|name| non_empty_var(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let settings: SidecarSettings = Figment::from(Serialized::defaults(SidecarSettings::default()))
            .merge(Env::prefixed("SIDECAR_"))
            .extract()?;

        let listen_addr = settings
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "SIDECAR_LISTEN_ADDR",
                message: e.to_string(),
            })?;

        let metrics_addr = settings
            .metrics_addr
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    key: "SIDECAR_METRICS_ADDR",
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let timeouts = TimeoutConfig {
            health: positive_secs("SIDECAR_HEALTH_TIMEOUT", settings.health_timeout)?,
            sync: positive_secs("SIDECAR_SYNC_TIMEOUT", settings.sync_timeout)?,
            command: positive_secs("SIDECAR_COMMAND_TIMEOUT", settings.command_timeout)?,
        };

        Ok(Self {
            bitwarden: BitwardenConfig {
                host: non_empty_var("BW_HOST"),
                client_id: secret_var("BW_CLIENTID")?,
                client_secret: secret_var("BW_CLIENTSECRET")?,
                password: secret_var("BW_PASSWORD")?,
                binary: settings.bw_binary,
            },
            server: ServerConfig {
                listen_addr,
                backend_host: settings.backend_host,
                backend_port: settings.backend_port,
            },
            timeouts,
            sync_interval: non_empty_var("BW_SYNC_INTERVAL"),
            verify_unlock: settings.verify_unlock,
            debug: non_empty_var("BW_DEBUG").is_some_and(|v| is_truthy(&v)),
            telemetry: TelemetryConfig {
                log_level: settings.log_level,
                log_format: settings.log_format,
                metrics_addr,
            },
        })
    }

    /// 调试模式下强制使用 debug 日志级别
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.telemetry.log_level
        }
    }
}

/// 解析 `BW_SYNC_INTERVAL`（例如 `30s`、`2m`、`1h 30m`）
pub fn parse_sync_interval(raw: &str) -> Result<Duration, ConfigError> {
    let interval = humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::Invalid {
        key: "BW_SYNC_INTERVAL",
        message: e.to_string(),
    })?;

    if interval.is_zero() {
        return Err(ConfigError::Invalid {
            key: "BW_SYNC_INTERVAL",
            message: "interval must be greater than zero".to_string(),
        });
    }

    Ok(interval)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn secret_var(name: &'static str) -> Result<Secret<String>, ConfigError> {
    non_empty_var(name)
        .map(Secret::new)
        .ok_or(ConfigError::Missing(vec![name]))
}

fn positive_secs(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            message: "timeout must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
