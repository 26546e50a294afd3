//! # Matrix Dispatch - Core Library
//!
//! 核心库，包含远程计算节点客户端、执行控制器（分发与结果汇总）以及配置、
//! 日志、矩阵I/O和参考worker服务
//!
//! ## 架构概述
//!
//! - **节点客户端**: 基于Tokio的HTTP/1.0 + JSON请求，每次调用一个TCP连接
//! - **执行控制器**: 在独立线程中运行分发策略，调用方阻塞等待完成信号
//! - **参考worker**: 基于axum的 `/sum` 与 `/multiply` 服务

pub mod core;
pub mod api;
pub mod config;
pub mod io;

/// 重新导出核心类型
pub use self::core::*;
