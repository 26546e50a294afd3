//! 分发策略
//!
//! 将矩阵运算拆分为互不重叠的子任务，每个子任务是一次向量运算，
//! 并以轮询方式分配给有效节点

use super::error::{DispatchError, Result};
use super::matrix::Matrix;
use super::node::ComputeNode;
use super::types::{MatrixOperation, NumericVector, Operation};

/// 子任务结果写入输出矩阵的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// 单个元素
    Cell { row: usize, col: usize },
    /// 连续的若干整行
    Rows { start: usize, count: usize },
    /// 矩阵乘法第一阶段的中间结果（第 `row` 行的全部乘积），不直接写入
    Partial { row: usize },
}

/// 一个子任务：一次向量运算 + 结果目标位置
#[derive(Debug, Clone, PartialEq)]
pub struct SubTask {
    /// 子任务序号，同一阶段内唯一
    pub index: usize,
    pub operation: Operation,
    pub payload: NumericVector,
    pub target: Target,
    /// 期望的结果长度
    pub expected_len: usize,
}

/// 执行计划
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// 一轮分发后直接合并
    Single(Vec<SubTask>),
    /// 矩阵乘法：先成对相乘，再对每个输出元素的 `inner` 个乘积求和
    Product {
        multiply: Vec<SubTask>,
        inner: usize,
        cols: usize,
    },
}

impl Plan {
    /// 第一轮的子任务
    pub fn first_phase(&self) -> &[SubTask] {
        match self {
            Plan::Single(tasks) => tasks,
            Plan::Product { multiply, .. } => multiply,
        }
    }
}

/// 运算对应的输出形状
pub fn output_shape(operation: MatrixOperation, a: &Matrix, b: &Matrix) -> (usize, usize) {
    match operation {
        MatrixOperation::ColumnSum => (1, a.cols()),
        MatrixOperation::RowSum => (a.rows(), 1),
        MatrixOperation::ElementwiseProduct => a.shape(),
        MatrixOperation::Product => (a.rows(), b.cols()),
    }
}

/// 校验输入与输出矩阵的形状
pub fn validate_shapes(operation: MatrixOperation, a: &Matrix, b: &Matrix, c: &Matrix) -> Result<()> {
    match operation {
        MatrixOperation::ElementwiseProduct if a.shape() != b.shape() => {
            return Err(DispatchError::ShapeMismatch {
                message: format!(
                    "{} needs equal shapes, got {}x{} and {}x{}",
                    operation,
                    a.rows(),
                    a.cols(),
                    b.rows(),
                    b.cols()
                ),
            });
        }
        MatrixOperation::Product if a.cols() != b.rows() => {
            return Err(DispatchError::ShapeMismatch {
                message: format!(
                    "{} needs A.cols == B.rows, got {}x{} and {}x{}",
                    operation,
                    a.rows(),
                    a.cols(),
                    b.rows(),
                    b.cols()
                ),
            });
        }
        _ => {}
    }

    let expected = output_shape(operation, a, b);
    if c.shape() != expected {
        return Err(DispatchError::ShapeMismatch {
            message: format!(
                "output of {} must be {}x{}, got {}x{}",
                operation,
                expected.0,
                expected.1,
                c.rows(),
                c.cols()
            ),
        });
    }
    Ok(())
}

/// 交错排列两个等长向量：`[x0, y0, x1, y1, ...]`
pub fn interleave(x: &[f64], y: &[f64]) -> NumericVector {
    x.iter().zip(y).flat_map(|(a, b)| [*a, *b]).collect()
}

/// 生成执行计划
///
/// `rows_per_task` 只影响逐元素相乘，表示每个子任务处理的行数（至少为1）
pub fn partition(operation: MatrixOperation, a: &Matrix, b: &Matrix, rows_per_task: usize) -> Plan {
    match operation {
        MatrixOperation::ColumnSum => Plan::Single(
            (0..a.cols())
                .map(|col| SubTask {
                    index: col,
                    operation: Operation::Sum,
                    payload: a.column(col),
                    target: Target::Cell { row: 0, col },
                    expected_len: 1,
                })
                .collect(),
        ),
        MatrixOperation::RowSum => Plan::Single(
            (0..a.rows())
                .map(|row| SubTask {
                    index: row,
                    operation: Operation::Sum,
                    payload: a.row(row).to_vec(),
                    target: Target::Cell { row, col: 0 },
                    expected_len: 1,
                })
                .collect(),
        ),
        MatrixOperation::ElementwiseProduct => {
            let block = rows_per_task.max(1);
            let tasks = (0..a.rows())
                .step_by(block)
                .enumerate()
                .map(|(index, start)| {
                    let count = block.min(a.rows() - start);
                    let payload = (start..start + count)
                        .flat_map(|row| interleave(a.row(row), b.row(row)))
                        .collect();
                    SubTask {
                        index,
                        operation: Operation::Multiply,
                        payload,
                        target: Target::Rows { start, count },
                        expected_len: count * a.cols(),
                    }
                })
                .collect();
            Plan::Single(tasks)
        }
        MatrixOperation::Product => {
            let columns: Vec<Vec<f64>> = (0..b.cols()).map(|col| b.column(col)).collect();
            let multiply = (0..a.rows())
                .map(|row| SubTask {
                    index: row,
                    operation: Operation::Multiply,
                    payload: columns
                        .iter()
                        .flat_map(|column| interleave(a.row(row), column))
                        .collect(),
                    target: Target::Partial { row },
                    expected_len: a.cols() * b.cols(),
                })
                .collect();
            Plan::Product {
                multiply,
                inner: a.cols(),
                cols: b.cols(),
            }
        }
    }
}

/// 由矩阵乘法第一阶段的结果生成求和子任务，每个输出元素一个
pub fn product_sum_phase(
    multiply: &[SubTask],
    results: &[NumericVector],
    inner: usize,
    cols: usize,
) -> Result<Vec<SubTask>> {
    check_result_lengths(multiply, results)?;

    let mut tasks = Vec::with_capacity(multiply.len() * cols);
    for (task, products) in multiply.iter().zip(results) {
        let row = match task.target {
            Target::Partial { row } => row,
            other => {
                return Err(DispatchError::Runtime {
                    message: format!("sum phase expects partial targets, got {:?}", other),
                })
            }
        };
        for col in 0..cols {
            tasks.push(SubTask {
                index: tasks.len(),
                operation: Operation::Sum,
                payload: products[col * inner..(col + 1) * inner].to_vec(),
                target: Target::Cell { row, col },
                expected_len: 1,
            });
        }
    }
    Ok(tasks)
}

fn check_result_lengths(tasks: &[SubTask], results: &[NumericVector]) -> Result<()> {
    if tasks.len() != results.len() {
        return Err(DispatchError::Runtime {
            message: format!("{} sub-tasks but {} results", tasks.len(), results.len()),
        });
    }
    for (task, result) in tasks.iter().zip(results) {
        if result.len() != task.expected_len {
            return Err(DispatchError::ResultShape {
                task: task.index,
                expected: task.expected_len,
                actual: result.len(),
            });
        }
    }
    Ok(())
}

/// 将全部结果合并进输出矩阵
///
/// 先校验所有结果，再统一写入：校验失败时输出矩阵保持不变
pub fn merge(output: &mut Matrix, tasks: &[SubTask], results: &[NumericVector]) -> Result<()> {
    check_result_lengths(tasks, results)?;

    for task in tasks {
        let fits = match task.target {
            Target::Cell { row, col } => row < output.rows() && col < output.cols(),
            Target::Rows { start, count } => start + count <= output.rows(),
            Target::Partial { .. } => false,
        };
        if !fits {
            return Err(DispatchError::Runtime {
                message: format!("sub-task {} target {:?} cannot be merged", task.index, task.target),
            });
        }
    }

    for (task, result) in tasks.iter().zip(results) {
        match task.target {
            Target::Cell { row, col } => output[(row, col)] = result[0],
            Target::Rows { start, count } => {
                let cols = output.cols();
                for (offset, value) in result.iter().enumerate().take(count * cols) {
                    output[(start + offset / cols, offset % cols)] = *value;
                }
            }
            Target::Partial { .. } => {}
        }
    }
    Ok(())
}

/// 轮询节点选择器
#[derive(Debug)]
pub struct RoundRobin<'a> {
    nodes: Vec<&'a ComputeNode>,
    index: usize,
}

impl<'a> RoundRobin<'a> {
    /// 只保留有效节点；没有有效节点时返回 `NoNodesAvailable`
    pub fn new(nodes: &'a [ComputeNode]) -> Result<Self> {
        let valid: Vec<&ComputeNode> = nodes.iter().filter(|n| n.is_valid()).collect();
        if valid.is_empty() {
            return Err(DispatchError::NoNodesAvailable { supplied: nodes.len() });
        }
        Ok(Self { nodes: valid, index: 0 })
    }

    /// 有效节点数
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 选择下一个节点
    pub fn next_node(&mut self) -> &'a ComputeNode {
        let selected = self.nodes[self.index % self.nodes.len()];
        self.index += 1;
        selected
    }
}
