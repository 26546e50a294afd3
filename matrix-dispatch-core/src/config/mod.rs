//! 配置管理模块
//!
//! 配置在启动时构建一次，按值传入需要它的组件，不存在全局可变配置

pub mod settings;

pub use settings::*;

use std::path::Path;

/// 环境变量前缀，如 `MATRIX_DISPATCH__DISPATCH__ROWS_PER_TASK=4`
pub const ENV_PREFIX: &str = "MATRIX_DISPATCH";

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// 加载配置文件，环境变量覆盖文件中的值
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(environment())
        .build()?
        .try_deserialize()
}

/// 加载默认配置（仅环境变量，缺省值补齐）
pub fn load_default_config() -> Result<Settings, config::ConfigError> {
    config::Config::builder()
        .add_source(environment())
        .build()?
        .try_deserialize()
}
