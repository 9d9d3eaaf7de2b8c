use crate::*;
use rayon::prelude::*;

/// Per-column statistics of a square-rooted feature matrix.
///
/// `std` holds population standard deviations, with every column below
/// [`STD_FLOOR`] replaced by 1 so it is centered but left unscaled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalization {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Normalization {
    /// Hellinger map then z-score, in place. Returns the statistics used.
    pub fn transform(matrix: &mut Matrix) -> Self {
        let cols = matrix.cols();
        matrix
            .as_mut_slice()
            .par_iter_mut()
            .for_each(|x| *x = x.sqrt());
        let ref m = *matrix;
        let (mean, std) = (0..cols)
            .into_par_iter()
            .map(|j| Self::column(m, j))
            .unzip::<f64, f64, Vec<f64>, Vec<f64>>();
        let stats = Self { mean, std };
        matrix
            .as_mut_slice()
            .par_chunks_mut(cols.max(1))
            .for_each(|row| stats.standardize(row));
        stats
    }

    /// Map one raw probability row into the normalized space.
    pub fn apply(&self, row: &mut [f32]) {
        row.iter_mut().for_each(|x| *x = x.sqrt());
        self.standardize(row);
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }
    pub fn std(&self) -> &[f64] {
        &self.std
    }
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    fn standardize(&self, row: &mut [f32]) {
        row.iter_mut()
            .zip(self.mean.iter().zip(self.std.iter()))
            .for_each(|(x, (m, s))| *x = ((*x as f64 - m) / s) as f32);
    }

    /// Population mean and floored std of column `j`.
    fn column(matrix: &Matrix, j: usize) -> (f64, f64) {
        let n = matrix.rows().max(1) as f64;
        let mean = matrix.iter_rows().map(|r| r[j] as f64).sum::<f64>() / n;
        let var = matrix
            .iter_rows()
            .map(|r| r[j] as f64 - mean)
            .map(|d| d * d)
            .sum::<f64>()
            / n;
        let std = var.sqrt();
        (mean, if std < STD_FLOOR { 1. } else { std })
    }
}
