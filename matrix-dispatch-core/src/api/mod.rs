//! 参考worker API模块
//!
//! 基于Axum实现 `/sum` 与 `/multiply` 计算服务

pub mod handlers;
pub mod routes;
pub mod server;

pub use handlers::{AppState, WorkerStats};
pub use routes::create_routes;
pub use server::*;
