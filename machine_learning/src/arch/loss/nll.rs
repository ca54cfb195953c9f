use ndarray::{Array2, Array3, ArrayView1, ArrayView2};

use super::LossFn;

/// Negative log likelihood of a softmax over the outputs, targets are class
/// indices stored as floats.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NegLogLikelihood;

impl NegLogLikelihood {
    /// Returns a new `NegLogLikelihood`.
    pub fn new() -> Self {
        Self
    }
}

/// Row-wise softmax, shifted by the row maximum.
pub(crate) fn softmax(z: ArrayView2<f64>) -> Array2<f64> {
    let mut p = z.to_owned();
    for mut row in p.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    p
}

impl LossFn for NegLogLikelihood {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        let n = z.nrows() as f64;
        let mut total = 0.0;
        for (row, &label) in z.rows().into_iter().zip(y) {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            let lse = max + row.mapv(|v| (v - max).exp()).sum().ln();
            total += lse - row[label as usize];
        }
        total / n
    }

    fn loss_prime(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        let n = z.nrows() as f64;
        let mut g = softmax(z);
        for (mut row, &label) in g.rows_mut().into_iter().zip(y) {
            row[label as usize] -= 1.0;
            row /= n;
        }
        g
    }

    fn loss_second(&self, z: ArrayView2<f64>, _y: ArrayView1<f64>) -> Array3<f64> {
        let (n, c) = z.dim();
        let p = softmax(z);
        let mut s = Array3::zeros((n, c, c));
        for i in 0..n {
            for j in 0..c {
                for l in 0..c {
                    let diag = if j == l { p[[i, j]] } else { 0.0 };
                    s[[i, j, l]] = (diag - p[[i, j]] * p[[i, l]]) / n as f64;
                }
            }
        }
        s
    }
}
