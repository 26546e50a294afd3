//! 稠密矩阵
//!
//! 行主序存储的 `f64` 二维容器，同时提供本地参考计算，用于校验分布式结果

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use super::error::{DispatchError, Result};

/// 行主序稠密矩阵
///
/// 反序列化经过 [`Matrix::from_vec`]，数据长度与形状不符时报错
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// 未经校验的序列化表示，只能通过 `Matrix::try_from` 使用
#[derive(Deserialize)]
pub struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = DispatchError;

    fn try_from(raw: RawMatrix) -> Result<Self> {
        Matrix::from_vec(raw.rows, raw.cols, raw.data)
    }
}

/// 元素个数，乘法溢出时报错
pub fn element_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| DispatchError::ShapeMismatch {
        message: format!("{}x{} matrix is too large", rows, cols),
    })
}

impl Matrix {
    /// 创建全零矩阵
    ///
    /// `rows * cols` 溢出时panic，不可信的形状先经过 [`element_count`]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// 由行主序数据创建矩阵
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        let expected = element_count(rows, cols)?;
        if data.len() != expected {
            return Err(DispatchError::ShapeMismatch {
                message: format!("{}x{} matrix needs {} values, got {}", rows, cols, expected, data.len()),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// 由若干行创建矩阵，所有行必须等长
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let count = rows.len();
        let mut data = Vec::with_capacity(count * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(DispatchError::ShapeMismatch {
                    message: format!("row {} has {} values, expected {}", i, row.len(), cols),
                });
            }
            data.extend(row);
        }
        Ok(Self { rows: count, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// 形状 `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(DispatchError::ShapeMismatch {
                message: format!("index ({}, {}) outside {}x{} matrix", row, col, self.rows, self.cols),
            });
        }
        self.data[row * self.cols + col] = value;
        Ok(())
    }

    /// 第 `row` 行的切片
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// 第 `col` 列的拷贝
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.data[r * self.cols + col]).collect()
    }

    /// 行主序数据
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// 按列求和，结果为 1 × cols
    pub fn column_sums(&self) -> Matrix {
        let data = (0..self.cols).map(|c| self.column(c).iter().sum()).collect();
        Matrix { rows: 1, cols: self.cols, data }
    }

    /// 按行求和，结果为 rows × 1
    pub fn row_sums(&self) -> Matrix {
        let data = (0..self.rows).map(|r| self.row(r).iter().sum()).collect();
        Matrix { rows: self.rows, cols: 1, data }
    }

    /// 逐元素相乘
    pub fn hadamard(&self, other: &Matrix) -> Result<Matrix> {
        if self.shape() != other.shape() {
            return Err(DispatchError::ShapeMismatch {
                message: format!(
                    "elementwise product of {}x{} and {}x{}",
                    self.rows, self.cols, other.rows, other.cols
                ),
            });
        }
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a * b).collect();
        Ok(Matrix { rows: self.rows, cols: self.cols, data })
    }

    /// 矩阵乘法
    pub fn product(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(DispatchError::ShapeMismatch {
                message: format!(
                    "product of {}x{} and {}x{}",
                    self.rows, self.cols, other.rows, other.cols
                ),
            });
        }
        let mut out = Matrix::new(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                out[(i, j)] = (0..self.cols).map(|k| self[(i, k)] * other[(k, j)]).sum();
            }
        }
        Ok(out)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(row < self.rows && col < self.cols, "matrix index out of bounds");
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(row < self.rows && col < self.cols, "matrix index out of bounds");
        &mut self.data[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap()
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let result = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(DispatchError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_row_and_column_access() {
        let m = sample();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.column(2), vec![3.0, 6.0]);
        assert_eq!(m.get(1, 0), Some(4.0));
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn test_reference_kernels() {
        let m = sample();
        assert_eq!(m.column_sums().as_slice(), &[5.0, 7.0, 9.0]);
        assert_eq!(m.row_sums().as_slice(), &[6.0, 15.0]);
        assert_eq!(m.hadamard(&m).unwrap().as_slice(), &[1.0, 4.0, 9.0, 16.0, 25.0, 36.0]);

        let b = Matrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let p = m.product(&b).unwrap();
        assert_eq!(p.shape(), (2, 2));
        assert_eq!(p.as_slice(), &[4.0, 5.0, 10.0, 11.0]);
        assert!(m.product(&m).is_err());
    }

    #[test]
    fn test_from_vec_checks_length_and_overflow() {
        assert!(Matrix::from_vec(2, 2, vec![1.0; 4]).is_ok());
        assert!(matches!(Matrix::from_vec(2, 2, vec![1.0]), Err(DispatchError::ShapeMismatch { .. })));
        assert!(matches!(Matrix::from_vec(usize::MAX, 2, Vec::new()), Err(DispatchError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_shape() {
        let json = r#"{"rows": 2, "cols": 2, "data": [1.0]}"#;
        assert!(serde_json::from_str::<Matrix>(json).is_err());

        let m: Matrix = serde_json::from_str(r#"{"rows": 1, "cols": 2, "data": [1.0, 2.0]}"#).unwrap();
        assert_eq!(m.row(0), &[1.0, 2.0]);
    }

    #[test]
    fn test_set_out_of_bounds() {
        let mut m = Matrix::new(1, 1);
        assert!(m.set(0, 0, 2.5).is_ok());
        assert_eq!(m[(0, 0)], 2.5);
        assert!(m.set(1, 0, 1.0).is_err());
    }
}
