//! 配置结构体定义

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::logging::LoggingConfig;
use crate::core::protocol::DEFAULT_SERVICE_PORT;
use crate::core::sandbox::DispatchConfig;

/// 应用程序配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 分发配置
    pub dispatch: DispatchConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 参考worker配置
    pub worker: WorkerSettings,
    /// 主机列表文件（JSON字符串数组）
    pub hosts_file: Option<PathBuf>,
}

/// 参考worker配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_SERVICE_PORT,
        }
    }
}
