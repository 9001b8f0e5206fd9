//! Ordinary least squares over [`FeatureColumn`] design matrices.
//!
//! Normal equations are accumulated from sparse rows, so the cost per training
//! row is quadratic in the number of non-zero columns rather than in the full
//! width. Aliased columns (all zero, or a linear combination of earlier
//! columns) are detected with a Cholesky sweep and dropped from the solve; their
//! coefficients are reported as `None`.

use crate::models::FeatureColumn;
use pedal_core::{LinearSystemBackend, PanelRecord, PedalError, PedalResult};
use tracing::debug;

/// Relative pivot tolerance for the aliasing sweep.
const ALIAS_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone)]
pub struct OlsModel {
    columns: Vec<FeatureColumn>,
    coefficients: Vec<Option<f64>>,
    /// Indicator columns that were switched on at least once in training
    seen: Vec<bool>,
    /// Training value of continuous columns that never varied
    constants: Vec<Option<f64>>,
    train_rows: usize,
}

fn sparse_row(columns: &[FeatureColumn], record: &PanelRecord) -> Option<Vec<(usize, f64)>> {
    let mut row = Vec::new();
    for (j, column) in columns.iter().enumerate() {
        let value = column.value(record)?;
        if value != 0.0 {
            row.push((j, value));
        }
    }
    Some(row)
}

/// Columns that cannot be estimated: a zero diagonal, or a Cholesky pivot that
/// collapses relative to its diagonal once earlier columns are projected out.
fn aliased_columns(xtx: &[Vec<f64>]) -> Vec<bool> {
    let p = xtx.len();
    let mut lower = vec![vec![0.0; p]; p];
    let mut aliased = vec![false; p];
    for j in 0..p {
        let diag = xtx[j][j];
        let pivot = diag - lower[j][..j].iter().map(|v| v * v).sum::<f64>();
        if diag <= 0.0 || pivot <= ALIAS_TOLERANCE * diag {
            aliased[j] = true;
            continue;
        }
        let root = pivot.sqrt();
        lower[j][j] = root;
        for i in (j + 1)..p {
            let dot: f64 = lower[i][..j]
                .iter()
                .zip(&lower[j][..j])
                .map(|(a, b)| a * b)
                .sum();
            lower[i][j] = (xtx[i][j] - dot) / root;
        }
    }
    aliased
}

impl OlsModel {
    /// Fit `trip_count ~ columns` on `rows`.
    ///
    /// Every row must have a value for every column; callers filter by model
    /// eligibility first. Returns [`PedalError::Degenerate`] when there is
    /// nothing to fit or the reduced system cannot be solved.
    pub fn fit(
        columns: &[FeatureColumn],
        rows: &[&PanelRecord],
        solver: &dyn LinearSystemBackend,
    ) -> PedalResult<Self> {
        if rows.is_empty() {
            return Err(PedalError::Degenerate("no training rows".into()));
        }
        let p = columns.len();
        let mut xtx = vec![vec![0.0; p]; p];
        let mut xty = vec![0.0; p];
        let mut min = vec![f64::INFINITY; p];
        let mut max = vec![f64::NEG_INFINITY; p];

        for record in rows {
            let row = sparse_row(columns, record).ok_or_else(|| {
                PedalError::Validation(format!(
                    "record {} lacks a feature required by the design",
                    record.id
                ))
            })?;
            let y = f64::from(record.trip_count);
            for &(a, va) in &row {
                xty[a] += va * y;
                for &(b, vb) in &row {
                    xtx[a][b] += va * vb;
                }
            }
            // zeros are implicit in the sparse row
            let mut cursor = 0;
            for (j, (lo, hi)) in min.iter_mut().zip(max.iter_mut()).enumerate() {
                let value = match row.get(cursor) {
                    Some(&(col, v)) if col == j => {
                        cursor += 1;
                        v
                    }
                    _ => 0.0,
                };
                *lo = lo.min(value);
                *hi = hi.max(value);
            }
        }

        let aliased = aliased_columns(&xtx);
        let kept: Vec<usize> = (0..p).filter(|&j| !aliased[j]).collect();
        let reduced: Vec<Vec<f64>> = kept
            .iter()
            .map(|&a| kept.iter().map(|&b| xtx[a][b]).collect())
            .collect();
        let rhs: Vec<f64> = kept.iter().map(|&a| xty[a]).collect();
        let solution = solver.solve(&reduced, &rhs)?;

        let mut coefficients = vec![None; p];
        for (&j, beta) in kept.iter().zip(solution) {
            coefficients[j] = Some(beta);
        }
        let seen = (0..p).map(|j| xtx[j][j] > 0.0).collect();
        let constants = columns
            .iter()
            .enumerate()
            .map(|(j, column)| {
                let fixed = !column.is_indicator()
                    && *column != FeatureColumn::Intercept
                    && min[j] == max[j];
                fixed.then_some(min[j])
            })
            .collect();

        debug!(
            rows = rows.len(),
            columns = p,
            aliased = p - kept.len(),
            solver = solver.name(),
            "ols fit"
        );
        Ok(Self {
            columns: columns.to_vec(),
            coefficients,
            seen,
            constants,
            train_rows: rows.len(),
        })
    }

    /// Predicted trip count, or `None` when the row cannot be scored: a
    /// missing feature, an indicator level never seen in training, or a value
    /// for a column that was constant in training.
    pub fn predict(&self, record: &PanelRecord) -> Option<f64> {
        let mut prediction = 0.0;
        for (j, column) in self.columns.iter().enumerate() {
            let value = column.value(record)?;
            if column.is_indicator() && value != 0.0 && !self.seen[j] {
                return None;
            }
            if let Some(constant) = self.constants[j] {
                if value != constant {
                    return None;
                }
            }
            if let Some(beta) = self.coefficients[j] {
                prediction += beta * value;
            }
        }
        prediction.is_finite().then_some(prediction)
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn coefficients(&self) -> &[Option<f64>] {
        &self.coefficients
    }

    pub fn aliased_count(&self) -> usize {
        self.coefficients.iter().filter(|c| c.is_none()).count()
    }

    pub fn train_rows(&self) -> usize {
        self.train_rows
    }
}
