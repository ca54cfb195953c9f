use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis, Zip};

use super::LossFn;

/// Binary cross entropy taken directly on logits, the sigmoid is folded in.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BinaryCrossEntropy;

impl BinaryCrossEntropy {
    /// Returns a new `BinaryCrossEntropy`.
    pub fn new() -> Self {
        Self
    }
}

#[inline]
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
#[inline]
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

impl LossFn for BinaryCrossEntropy {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        let n = z.nrows() as f64;
        let total = Zip::from(z.column(0))
            .and(y)
            .fold(0.0, |acc, &z, &y| acc + softplus(z) - y * z);

        total / n
    }

    fn loss_prime(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        let n = z.nrows() as f64;
        Zip::from(z.column(0))
            .and(y)
            .map_collect(|&z, &y| (sigmoid(z) - y) / n)
            .insert_axis(Axis(1))
    }

    fn loss_second(&self, z: ArrayView2<f64>, _y: ArrayView1<f64>) -> Array3<f64> {
        let n = z.nrows();
        let mut s = Array3::zeros((n, 1, 1));
        for (i, &zi) in z.column(0).iter().enumerate() {
            let p = sigmoid(zi);
            s[[i, 0, 0]] = p * (1.0 - p) / n as f64;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn zero_logit_gives_log_two() {
        let z = array![[0.0], [0.0]];
        let y = array![0.0, 1.0];

        let loss = BinaryCrossEntropy.loss(z.view(), y.view());
        assert!((loss - 2f64.ln()).abs() < 1e-12);

        let g = BinaryCrossEntropy.loss_prime(z.view(), y.view());
        assert!((g[[0, 0]] - 0.25).abs() < 1e-12);
        assert!((g[[1, 0]] + 0.25).abs() < 1e-12);

        let s = BinaryCrossEntropy.loss_second(z.view(), y.view());
        assert!((s[[0, 0, 0]] - 0.125).abs() < 1e-12);
    }

    #[test]
    fn large_logits_stay_finite() {
        let z = array![[800.0], [-800.0]];
        let y = array![0.0, 1.0];

        let loss = BinaryCrossEntropy.loss(z.view(), y.view());
        assert!(loss.is_finite());
        assert!((loss - 800.0).abs() < 1e-9);
    }
}
