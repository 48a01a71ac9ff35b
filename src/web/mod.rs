//! Web 服务器模块
//!
//! 简化代理服务：持有上游 API 密钥，按客户端指纹限速，把流式补全
//! 转发为增量事件协议。浏览器端永远不直接接触上游。

pub mod config;
pub mod fingerprint;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod types;
pub mod upstream;

pub use config::{EnvError, EnvResult, UpstreamConfig, WebConfig};
pub use fingerprint::hash_fingerprint;
pub use rate_limit::{spawn_purge_task, FingerprintLimiter};
pub use types::AppState;
pub use upstream::{system_instruction, OpenAiClient, UpstreamStreamer};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Web 服务器
pub struct WebServer {
    config: WebConfig,
}

impl WebServer {
    /// 创建新的 Web 服务器
    pub fn new(config: WebConfig) -> Self {
        Self { config }
    }

    /// 启动 Web 服务器
    pub async fn start(&self) -> std::io::Result<()> {
        let app_state = Arc::new(AppState {
            config: self.config.clone(),
            limiter: Arc::new(FingerprintLimiter::new(
                self.config.rate_ceiling,
                self.config.rate_window_ms,
            )),
            playground_limiter: Arc::new(FingerprintLimiter::new(
                self.config.playground_rate_ceiling,
                self.config.rate_window_ms,
            )),
            upstream: Arc::new(OpenAiClient::new(self.config.upstream.clone())),
            started_at: Instant::now(),
        });

        // 定期回收过期的限速窗口
        rate_limit::spawn_purge_task(app_state.limiter.clone(), self.config.rate_window_ms);
        rate_limit::spawn_purge_task(
            app_state.playground_limiter.clone(),
            self.config.rate_window_ms,
        );

        let app = create_router(app_state);

        let listener = tokio::net::TcpListener::bind(self.config.listen_address()).await?;

        tracing::info!(
            "Web server starting at http://{}",
            self.config.listen_address()
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}

/// 创建路由器
fn create_router(app_state: Arc<AppState>) -> Router {
    routes::create_routes()
        .with_state(app_state)
        // 浏览器扩展从任意源发起请求
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
