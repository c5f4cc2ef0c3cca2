//! Dense matrices and the in-process multiplication routines.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::Error;

/// The type of every matrix entry.
pub type Element = i32;

/// A dense matrix stored in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Element>,
}

impl Matrix {
    /// Creates a `rows`×`cols` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    /// Wraps row-major `data` as a `rows`×`cols` matrix.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<Element>) -> Result<Self, Error> {
        if data.len() != rows * cols {
            return Err(Error::Shape {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds a matrix from a list of rows. All rows must have equal length.
    pub fn from_rows(rows: Vec<Vec<Element>>) -> Result<Self, Error> {
        let n = rows.len();
        let m = rows.first().map_or(0, |row| row.len());
        let mut data = Vec::with_capacity(n * m);
        for row in rows {
            if row.len() != m {
                return Err(Error::Shape {
                    rows: n,
                    cols: m,
                    len: data.len() + row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n,
            cols: m,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Element> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> &[Element] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// The row-major backing storage.
    pub fn as_slice(&self) -> &[Element] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<Element> {
        self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<Element>> {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        out
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = Element;

    fn index(&self, (row, col): (usize, usize)) -> &Element {
        assert!(row < self.rows && col < self.cols, "matrix index out of bounds");
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Element {
        assert!(row < self.rows && col < self.cols, "matrix index out of bounds");
        &mut self.data[row * self.cols + col]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.rows {
            let row = self
                .row(i)
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("\t");
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

/// A multiplication routine that runs in the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Textbook triple loop over `a` and `b`.
    Naive,
    /// Transposes `b` first so the inner loop walks both operands
    /// contiguously.
    Transposed,
}

impl Strategy {
    /// Resolves a routine from its module-style name. A trailing extension
    /// such as `.so` is ignored, so `"smart_matmul.so"` selects
    /// [`Strategy::Transposed`].
    pub fn by_name(name: &str) -> Result<Self, Error> {
        let stem = name.rsplit('/').next().unwrap_or(name);
        let stem = stem.split('.').next().unwrap_or(stem);
        match stem {
            "naive" | "naive_matmul" => Ok(Strategy::Naive),
            "transposed" | "smart" | "smart_matmul" => Ok(Strategy::Transposed),
            _ => Err(Error::UnknownStrategy(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Naive => "naive",
            Strategy::Transposed => "transposed",
        }
    }

    /// Computes `a × b`.
    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix, Error> {
        if a.cols != b.rows {
            return Err(Error::DimensionMismatch(a.rows, a.cols, b.rows, b.cols));
        }
        let (n1, n2, n3) = (a.rows, a.cols, b.cols);
        let mut c = Matrix::zeros(n1, n3);
        match self {
            Strategy::Naive => {
                for i in 0..n1 {
                    for j in 0..n3 {
                        let mut sum: Element = 0;
                        for k in 0..n2 {
                            sum = sum.wrapping_add(a[(i, k)].wrapping_mul(b[(k, j)]));
                        }
                        c[(i, j)] = sum;
                    }
                }
            }
            Strategy::Transposed => {
                let bt = b.transpose();
                for i in 0..n1 {
                    let row = a.row(i);
                    for j in 0..n3 {
                        c[(i, j)] = dot(row, bt.row(j));
                    }
                }
            }
        }
        Ok(c)
    }
}

/// Wrapping dot product of two equally long slices.
pub(crate) fn dot(x: &[Element], y: &[Element]) -> Element {
    x.iter()
        .zip(y)
        .fold(0, |acc: Element, (&p, &q)| acc.wrapping_add(p.wrapping_mul(q)))
}
