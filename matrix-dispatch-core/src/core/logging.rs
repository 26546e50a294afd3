//! 日志系统配置和结构化日志

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 优先）
    pub level: String,
    /// 是否启用控制台输出
    pub console_output: bool,
    /// 文件输出配置
    pub file_output: Option<FileOutputConfig>,
    /// JSON格式输出
    pub json_format: bool,
    /// 包含源代码位置
    pub include_location: bool,
}

/// 文件输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutputConfig {
    /// 日志文件路径
    pub path: String,
    /// 轮转策略
    #[serde(default)]
    pub rotation: RotationStrategy,
}

/// 轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    /// 按小时轮转
    Hourly,
    /// 按天轮转
    #[default]
    Daily,
    /// 从不轮转
    Never,
    /// 按分钟轮转
    Minutely,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: None,
            json_format: false,
            include_location: false,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志初始化器
pub struct Logger;

impl Logger {
    /// 初始化全局日志系统，重复初始化返回错误
    pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        // 控制台输出层
        if config.console_output {
            if config.json_format {
                let console_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location);
                layers.push(console_layer.boxed());
            } else {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_names(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .compact();
                layers.push(console_layer.boxed());
            }
        }

        // 文件输出层
        if let Some(file_config) = &config.file_output {
            let rotation = match file_config.rotation {
                RotationStrategy::Hourly => Rotation::HOURLY,
                RotationStrategy::Daily => Rotation::DAILY,
                RotationStrategy::Never => Rotation::NEVER,
                RotationStrategy::Minutely => Rotation::MINUTELY,
            };

            let path = Path::new(&file_config.path);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| format!("log path '{}' has no file name", file_config.path))?;

            // 确保日志目录存在
            std::fs::create_dir_all(directory)?;

            let file_appender = RollingFileAppender::new(rotation, directory, file_name);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location);

            if config.json_format {
                layers.push(file_layer.json().boxed());
            } else {
                layers.push(file_layer.boxed());
            }
        }

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()?;

        tracing::info!("Logger initialized with level: {}", config.level);
        if let Some(file_config) = &config.file_output {
            tracing::info!("File output: {} (rotation: {:?})", file_config.path, file_config.rotation);
        }

        Ok(())
    }
}

/// 性能日志记录器
pub struct PerformanceLogger;

impl PerformanceLogger {
    /// 记录一次分布式执行的耗时
    pub fn record_execution(execution_id: &str, operation: &str, sub_tasks: usize, duration: Duration, success: bool) {
        let span = tracing::info_span!(
            "execution",
            execution_id = execution_id,
            operation = operation,
            sub_tasks = sub_tasks,
            duration_ms = duration.as_millis() as u64,
            success = success
        );
        let _enter = span.enter();

        if success {
            tracing::info!("Execution completed");
        } else {
            tracing::error!("Execution failed");
        }
    }

    /// 记录单个子任务的耗时，慢调用单独告警
    pub fn record_invocation(node: &str, operation: &str, task: usize, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        if duration_ms > 1000 {
            tracing::warn!(node, operation, task, duration_ms, "Slow invocation detected");
        } else {
            tracing::debug!(node, operation, task, duration_ms, "Invocation completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_console_only() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output.is_none());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LoggingConfig = serde_json::from_str(
            r#"{"level": "debug", "file_output": {"path": "logs/dispatch.log"}}"#,
        )
        .unwrap();
        assert_eq!(config.level, "debug");
        assert!(config.console_output);
        assert_eq!(config.file_output.unwrap().rotation, RotationStrategy::Daily);
    }
}
