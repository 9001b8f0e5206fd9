//! Dense linear-system backends used by the least-squares estimator.

use crate::error::{PedalError, PedalResult};
use faer::{prelude::*, solvers::PartialPivLu, Mat};
use std::str::FromStr;
use std::sync::Arc;

/// Solves `A x = b` for a square, dense `A`.
pub trait LinearSystemBackend: Send + Sync {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> PedalResult<Vec<f64>>;

    fn name(&self) -> &'static str;
}

fn check_shape(matrix: &[Vec<f64>], rhs: &[f64]) -> PedalResult<usize> {
    let n = matrix.len();
    if rhs.len() != n {
        return Err(PedalError::Validation(format!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        )));
    }
    if matrix.iter().any(|row| row.len() != n) {
        return Err(PedalError::Validation("matrix must be square".into()));
    }
    Ok(n)
}

/// Partial-pivot LU from `faer`.
#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl LinearSystemBackend for FaerSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> PedalResult<Vec<f64>> {
        let n = check_shape(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mat = Mat::from_fn(n, n, |i, j| matrix[i][j]);
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        let solution: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(PedalError::Degenerate(
                "singular normal equations (faer)".into(),
            ));
        }
        Ok(solution)
    }

    fn name(&self) -> &'static str {
        "faer"
    }
}

/// Gauss-Jordan elimination with partial pivoting. Slower than faer but has
/// no numeric dependencies; kept as a reference implementation.
#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl LinearSystemBackend for GaussSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> PedalResult<Vec<f64>> {
        let n = check_shape(matrix, rhs)?;
        let mut a: Vec<Vec<f64>> = matrix.to_vec();
        let mut b = rhs.to_vec();

        for col in 0..n {
            let pivot = (col..n)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
                .unwrap_or(col);
            if a[pivot][col].abs() < 1e-12 {
                return Err(PedalError::Degenerate(
                    "singular normal equations (gauss)".into(),
                ));
            }
            a.swap(col, pivot);
            b.swap(col, pivot);

            let diag = a[col][col];
            a[col].iter_mut().for_each(|v| *v /= diag);
            b[col] /= diag;

            let pivot_row = a[col].clone();
            let pivot_rhs = b[col];
            for (row, (a_row, b_row)) in a.iter_mut().zip(b.iter_mut()).enumerate() {
                if row == col {
                    continue;
                }
                let factor = a_row[col];
                if factor == 0.0 {
                    continue;
                }
                a_row
                    .iter_mut()
                    .zip(&pivot_row)
                    .for_each(|(target, p)| *target -= factor * p);
                *b_row -= factor * pivot_rhs;
            }
        }
        Ok(b)
    }

    fn name(&self) -> &'static str {
        "gauss"
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SolverKind {
    #[default]
    Faer,
    Gauss,
}

impl SolverKind {
    pub fn build_solver(self) -> Arc<dyn LinearSystemBackend> {
        match self {
            SolverKind::Faer => Arc::new(FaerSolver),
            SolverKind::Gauss => Arc::new(GaussSolver),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Faer => "faer",
            SolverKind::Gauss => "gauss",
        }
    }
}

impl FromStr for SolverKind {
    type Err = PedalError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "faer" | "default" => Ok(SolverKind::Faer),
            "gauss" => Ok(SolverKind::Gauss),
            other => Err(PedalError::Config(format!(
                "unknown solver '{other}'; supported values: faer, gauss"
            ))),
        }
    }
}
