//! API路由定义

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{health_check, multiply, sum, AppState};
use crate::core::Operation;

/// 创建worker路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(Operation::Sum.path(), post(sum))
        .route(Operation::Multiply.path(), post(multiply))
        .with_state(state)
}
