//! 外部数据读写
//!
//! 矩阵文件（文本/二进制）与主机列表的加载

pub mod matrix_io;
pub mod hosts;

pub use matrix_io::*;
pub use hosts::*;
