//! 反向代理
//!
//! 方法、路径、查询串、请求头和请求体原样转发到 `bw serve`，
//! 响应的状态码、响应头和响应体原样流式返回。

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, Uri},
    response::Response,
};
use errors::{AppError, AppResult};
use tracing::{debug, warn};

use crate::routing::AppState;

/// 默认请求体上限，超出时返回 413
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// 逐跳头，不应跨越代理转发
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// 反向代理客户端
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    client: reqwest::Client,
    target: String,
    max_body_bytes: usize,
}

impl ReverseProxy {
    /// 创建指向 `target`（如 `http://127.0.0.1:8088`）的代理
    pub fn new(target: impl Into<String>) -> AppResult<Self> {
        // 不跟随重定向，3xx 原样返回给调用方
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::internal(format!("failed to build proxy client: {}", e)))?;

        Ok(Self {
            client,
            target: target.into().trim_end_matches('/').to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// 转发请求
    ///
    /// 客户端的 `Host` 原样保留，请求体已由路由层按上限缓冲。
    pub async fn forward(
        &self,
        method: Method,
        uri: Uri,
        mut headers: HeaderMap,
        body: Bytes,
    ) -> AppResult<Response> {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = format!("{}{}", self.target, path_and_query);

        strip_hop_by_hop(&mut headers);
        // 按实际请求体重新生成
        headers.remove(header::CONTENT_LENGTH);

        debug!(method = %method, url = %url, "Proxying request");

        let upstream = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Proxy request to backend failed");
                AppError::bad_gateway(e.to_string())
            })?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// 移除逐跳头以及 `Connection` 中列出的头
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// 未被控制端点拦截的请求全部走这里
///
/// 请求体超过上限时 `Bytes` 提取失败，直接返回 413。
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    state.proxy.forward(method, uri, headers, body).await
}
