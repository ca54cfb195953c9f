use ndarray::{Array2, Array3, ArrayView1, ArrayView2};

/// A per-sample loss averaged over a batch, with its first and second
/// derivatives with respect to the model outputs.
///
/// Outputs are laid out as an `n×c` matrix, one row per sample.
pub trait LossFn {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> f64;

    /// `∂L/∂z`, shaped `n×c`.
    fn loss_prime(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64>;

    /// The per-sample blocks `∂²L/∂z_i∂z_i`, shaped `n×c×c`.
    fn loss_second(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> Array3<f64>;
}
