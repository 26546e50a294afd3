//! 核心模块
//!
//! 包含框架的核心类型、错误定义、节点客户端和执行控制器

pub mod types;
pub mod error;
pub mod matrix;
pub mod protocol;
pub mod pending;
pub mod node;
pub mod partition;
pub mod sandbox;
pub mod logging;

pub use types::*;
pub use error::*;
pub use matrix::*;
pub use pending::*;
pub use node::*;
pub use partition::*;
pub use sandbox::*;
pub use logging::*;
