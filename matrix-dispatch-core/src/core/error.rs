//! 错误处理定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::Operation;

/// 框架的主要结果类型
pub type Result<T> = std::result::Result<T, DispatchError>;

/// 单次远程调用的错误
///
/// 调用级错误只会出现在对应的 `PendingResult` 中（`InvalidNode` 除外，
/// 它在调用点立即返回），从不跨线程抛出
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NodeError {
    /// 对无效节点发起调用
    #[error("Invalid compute node '{node}': invoke on a node without an endpoint")]
    InvalidNode { node: String },

    /// DNS、连接或套接字错误
    #[error("Connection error to {host}:{port}: {message}")]
    Connection { host: String, port: u16, message: String },

    /// 状态行、报文分隔或JSON响应体格式错误
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// 远端返回非200状态码
    #[error("Remote error: HTTP {status_code} - {body}")]
    Remote { status_code: u16, body: String },

    /// 超出单次调用期限
    #[error("Invocation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// 调用任务被取消或发生panic
    #[error("Invocation aborted: {message}")]
    Aborted { message: String },
}

impl NodeError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        NodeError::Protocol { message: message.into() }
    }

    /// 错误类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::InvalidNode { .. } => "InvalidNode",
            NodeError::Connection { .. } => "Connection",
            NodeError::Protocol { .. } => "Protocol",
            NodeError::Remote { .. } => "Remote",
            NodeError::Timeout { .. } => "Timeout",
            NodeError::Aborted { .. } => "Aborted",
        }
    }
}

/// 编排层错误
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DispatchError {
    /// 节点列表中没有有效节点
    #[error("No compute nodes available: {supplied} supplied, none valid")]
    NoNodesAvailable { supplied: usize },

    /// 某个子任务的调用失败，整个执行随之失败
    #[error("Execution failed: sub-task {task} ({operation}) on node '{node}': {source}")]
    ExecutionFailure {
        node: String,
        operation: Operation,
        task: usize,
        source: NodeError,
    },

    /// 输入或输出矩阵的形状不满足运算要求
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// 远端返回的向量长度与目标区域不符
    #[error("Result shape error: sub-task {task} expected {expected} values, got {actual}")]
    ResultShape { task: usize, expected: usize, actual: usize },

    /// 后台运行时错误
    #[error("Runtime error: {message}")]
    Runtime { message: String },

    /// 配置错误
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O错误
    #[error("I/O error: {message}")]
    Io { message: String, path: Option<String> },

    /// 序列化错误
    #[error("Serialization error: {message}")]
    Serialization { message: String, data_type: Option<String> },
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// 低严重程度 - 调用方可自行处理
    Low,
    /// 中等严重程度 - 本次执行失败
    Medium,
    /// 高严重程度 - 配置或环境问题
    High,
    /// 严重错误 - 系统无法正常工作
    Critical,
}

impl DispatchError {
    /// 获取错误类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoNodesAvailable { .. } => "NoNodesAvailable",
            DispatchError::ExecutionFailure { .. } => "ExecutionFailure",
            DispatchError::ShapeMismatch { .. } => "ShapeMismatch",
            DispatchError::ResultShape { .. } => "ResultShape",
            DispatchError::Runtime { .. } => "Runtime",
            DispatchError::Config { .. } => "Config",
            DispatchError::Io { .. } => "Io",
            DispatchError::Serialization { .. } => "Serialization",
        }
    }

    /// 获取错误严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DispatchError::NoNodesAvailable { .. } => ErrorSeverity::High,
            DispatchError::ExecutionFailure { source, .. } => match source {
                NodeError::Remote { .. } => ErrorSeverity::Low,
                NodeError::InvalidNode { .. } => ErrorSeverity::High,
                _ => ErrorSeverity::Medium,
            },
            DispatchError::ShapeMismatch { .. } => ErrorSeverity::Low,
            DispatchError::ResultShape { .. } => ErrorSeverity::Medium,
            DispatchError::Runtime { .. } => ErrorSeverity::Critical,
            DispatchError::Config { .. } => ErrorSeverity::High,
            DispatchError::Io { .. } => ErrorSeverity::Medium,
            DispatchError::Serialization { .. } => ErrorSeverity::Medium,
        }
    }

    /// 按严重程度记录错误日志
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Low => tracing::warn!(kind = self.kind(), "Low severity error: {}", self),
            ErrorSeverity::Medium => tracing::error!(kind = self.kind(), "Medium severity error: {}", self),
            ErrorSeverity::High => tracing::error!(kind = self.kind(), "High severity error: {}", self),
            ErrorSeverity::Critical => tracing::error!(kind = self.kind(), "CRITICAL ERROR: {}", self),
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(error: std::io::Error) -> Self {
        DispatchError::Io {
            message: error.to_string(),
            path: None,
        }
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(error: config::ConfigError) -> Self {
        DispatchError::Config {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(error: serde_json::Error) -> Self {
        DispatchError::Serialization {
            message: error.to_string(),
            data_type: Some("json".to_string()),
        }
    }
}

impl From<bincode::Error> for DispatchError {
    fn from(error: bincode::Error) -> Self {
        DispatchError::Serialization {
            message: error.to_string(),
            data_type: Some("bincode".to_string()),
        }
    }
}
