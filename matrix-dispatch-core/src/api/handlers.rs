//! HTTP请求处理器

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::NumericVector;

/// 请求计数
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub sum_requests: AtomicU64,
    pub multiply_requests: AtomicU64,
    pub rejected_requests: AtomicU64,
}

/// 应用状态
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub stats: Arc<WorkerStats>,
}

/// 健康检查处理器
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "matrix-dispatch-worker",
        "version": env!("CARGO_PKG_VERSION"),
        "sum_requests": state.stats.sum_requests.load(Ordering::Relaxed),
        "multiply_requests": state.stats.multiply_requests.load(Ordering::Relaxed),
        "rejected_requests": state.stats.rejected_requests.load(Ordering::Relaxed),
    }))
}

/// 求和：返回单元素数组 `[Σ]`
pub async fn sum(State(state): State<AppState>, Json(values): Json<NumericVector>) -> Response {
    state.stats.sum_requests.fetch_add(1, Ordering::Relaxed);
    let total: f64 = values.iter().sum();
    tracing::debug!(len = values.len(), total, "Sum request served");
    Json(vec![total]).into_response()
}

/// 成对乘积：`[a0, b0, a1, b1, ...]` -> `[a0*b0, a1*b1, ...]`
pub async fn multiply(State(state): State<AppState>, Json(values): Json<NumericVector>) -> Response {
    if values.len() % 2 != 0 {
        state.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(len = values.len(), "Multiply request rejected: odd number of values");
        return (
            StatusCode::BAD_REQUEST,
            format!("multiply expects an even number of values, got {}", values.len()),
        )
            .into_response();
    }

    state.stats.multiply_requests.fetch_add(1, Ordering::Relaxed);
    let products: NumericVector = values.chunks_exact(2).map(|pair| pair[0] * pair[1]).collect();
    tracing::debug!(pairs = products.len(), "Multiply request served");
    Json(products).into_response()
}
