//! Web 路由定义

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::web::{handlers, types::AppState};

/// 创建路由结构
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        // 核心简化端点
        .route("/api/simplify", post(handlers::simplify))
        // 落地页演示端点
        .route("/api/playground", post(handlers::playground))
        // 健康检查
        .route("/health", get(handlers::health))
}
