//! 矩阵文件格式
//!
//! - 文本格式：首行为 `rows cols`，之后每行一个矩阵行，数值以空白分隔
//! - 二进制格式：矩阵的 `bincode` 编码

use std::fs;
use std::path::Path;

use crate::core::error::{DispatchError, Result};
use crate::core::matrix::{element_count, Matrix, RawMatrix};

/// 矩阵文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFormat {
    Text,
    Binary,
}

/// 读取矩阵文件
pub fn read_matrix<P: AsRef<Path>>(path: P, format: MatrixFormat) -> Result<Matrix> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| io_error(e, path))?;
    let matrix = match format {
        MatrixFormat::Text => {
            let text = String::from_utf8(bytes).map_err(|e| DispatchError::Serialization {
                message: format!("{}: {}", path.display(), e),
                data_type: Some("text".to_string()),
            })?;
            parse_text(&text)?
        }
        MatrixFormat::Binary => {
            let raw: RawMatrix = bincode::deserialize(&bytes)?;
            Matrix::try_from(raw)?
        }
    };
    tracing::debug!(path = %path.display(), rows = matrix.rows(), cols = matrix.cols(), "Matrix loaded");
    Ok(matrix)
}

/// 写入矩阵文件
pub fn write_matrix<P: AsRef<Path>>(path: P, matrix: &Matrix, format: MatrixFormat) -> Result<()> {
    let path = path.as_ref();
    let bytes = match format {
        MatrixFormat::Text => render_text(matrix).into_bytes(),
        MatrixFormat::Binary => bincode::serialize(matrix)?,
    };
    fs::write(path, bytes).map_err(|e| io_error(e, path))?;
    tracing::debug!(path = %path.display(), rows = matrix.rows(), cols = matrix.cols(), "Matrix written");
    Ok(())
}

/// 解析文本格式矩阵
pub fn parse_text(text: &str) -> Result<Matrix> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    let header = lines.next().ok_or_else(|| text_error("empty matrix file"))?;
    let dims: Vec<usize> = header
        .split_whitespace()
        .map(|d| d.parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| text_error(format!("invalid header '{}': {}", header, e)))?;
    let (rows, cols) = match dims.as_slice() {
        [rows, cols] => (*rows, *cols),
        _ => return Err(text_error(format!("header must be 'rows cols', got '{}'", header))),
    };

    let expected = element_count(rows, cols)
        .map_err(|_| text_error(format!("header '{}' describes a matrix that is too large", header)))?;

    // 形状来自文件头，不据此预留内存
    let mut data = Vec::new();
    for (index, line) in lines.enumerate() {
        if index >= rows {
            return Err(text_error(format!("more than {} rows", rows)));
        }
        let row: Vec<f64> = line
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| text_error(format!("row {}: {}", index, e)))?;
        if row.len() != cols {
            return Err(text_error(format!("row {} has {} values, expected {}", index, row.len(), cols)));
        }
        data.extend(row);
    }
    if data.len() != expected {
        return Err(text_error(format!("expected {} rows, got {}", rows, data.len() / cols.max(1))));
    }

    Matrix::from_vec(rows, cols, data)
}

/// 渲染为文本格式
pub fn render_text(matrix: &Matrix) -> String {
    let mut out = format!("{} {}\n", matrix.rows(), matrix.cols());
    for row in 0..matrix.rows() {
        let rendered: Vec<String> = matrix.row(row).iter().map(f64::to_string).collect();
        out.push_str(&rendered.join(" "));
        out.push('\n');
    }
    out
}

fn text_error(message: impl Into<String>) -> DispatchError {
    DispatchError::Serialization {
        message: message.into(),
        data_type: Some("text".to_string()),
    }
}

fn io_error(error: std::io::Error, path: &Path) -> DispatchError {
    DispatchError::Io {
        message: error.to_string(),
        path: Some(path.display().to_string()),
    }
}
