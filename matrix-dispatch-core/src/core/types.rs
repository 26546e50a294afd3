//! 核心数据类型定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 数值向量，线上格式为JSON数字数组，顺序端到端保持不变
pub type NumericVector = Vec<f64>;

/// 远程节点支持的向量运算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// 求和，返回单元素向量
    Sum,
    /// 成对相乘，输入为交错排列的两个向量
    Multiply,
}

impl Operation {
    /// 该运算对应的HTTP路径
    pub fn path(&self) -> &'static str {
        match self {
            Operation::Sum => "/sum",
            Operation::Multiply => "/multiply",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// 分布式执行的矩阵运算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatrixOperation {
    /// 按列求和，输出 1 × A.cols
    ColumnSum,
    /// 按行求和，输出 A.rows × 1
    RowSum,
    /// 逐元素相乘，输出与A同形
    ElementwiseProduct,
    /// 矩阵乘法，输出 A.rows × B.cols
    Product,
}

impl MatrixOperation {
    /// 所有支持的运算名称
    pub const NAMES: [&'static str; 4] = ["column-sum", "row-sum", "elementwise-product", "product"];

    pub fn name(&self) -> &'static str {
        match self {
            MatrixOperation::ColumnSum => "column-sum",
            MatrixOperation::RowSum => "row-sum",
            MatrixOperation::ElementwiseProduct => "elementwise-product",
            MatrixOperation::Product => "product",
        }
    }
}

impl fmt::Display for MatrixOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatrixOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "column-sum" => Ok(MatrixOperation::ColumnSum),
            "row-sum" => Ok(MatrixOperation::RowSum),
            "elementwise-product" => Ok(MatrixOperation::ElementwiseProduct),
            "product" => Ok(MatrixOperation::Product),
            other => Err(format!(
                "unknown matrix operation '{}', expected one of: {}",
                other,
                Self::NAMES.join(", ")
            )),
        }
    }
}

/// 执行状态机：Idle → Running → {Completed, Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    /// 初始状态
    Idle,
    /// 正在执行
    Running,
    /// 执行成功（终态）
    Completed,
    /// 执行失败（终态）
    Failed,
}

impl ExecutionState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed)
    }

    /// 对外可观察的结果标志
    pub fn outcome(&self) -> ExecutionOutcome {
        match self {
            ExecutionState::Idle | ExecutionState::Running => ExecutionOutcome { completed: false, failed: false },
            ExecutionState::Completed => ExecutionOutcome { completed: true, failed: false },
            ExecutionState::Failed => ExecutionOutcome { completed: true, failed: true },
        }
    }
}

/// 执行结果标志，从 `{false, false}` 单调地转换到终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// 是否已结束
    pub completed: bool,
    /// 是否失败
    pub failed: bool,
}
