use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

use super::LossFn;

/// Mean squared error loss function over a single output column.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        let diff = &z.column(0) - &y;
        diff.mapv(|x| x.powi(2)).mean().unwrap_or_default()
    }

    fn loss_prime(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        let n = z.nrows() as f64;
        let diff = &z.column(0) - &y;
        (diff * (2.0 / n)).insert_axis(Axis(1))
    }

    fn loss_second(&self, z: ArrayView2<f64>, _y: ArrayView1<f64>) -> Array3<f64> {
        let n = z.nrows();
        Array3::from_elem((n, 1, 1), 2.0 / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn matches_hand_computed_values() {
        let z = array![[1.0], [3.0]];
        let y = array![0.0, 1.0];

        assert_eq!(Mse.loss(z.view(), y.view()), 2.5);
        assert_eq!(Mse.loss_prime(z.view(), y.view()), array![[1.0], [2.0]]);
        assert_eq!(Mse.loss_second(z.view(), y.view())[[1, 0, 0]], 1.0);
    }
}
