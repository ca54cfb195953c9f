use log::debug;
use ml_core::{
    Batch, DifferentiationOracle, LossGraph, MlError, ParameterLayout, ParameterSet, Result,
    ensure_finite,
};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Ix1, Ix2, concatenate, s};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::loss::{Loss, sigmoid, softmax};

const WEIGHT: &str = "weight";
const BIAS: &str = "bias";

/// A generalized linear model `z = W x + b` paired with a loss on its outputs.
///
/// The parameters are a `weight` tensor shaped `[outputs, features]` followed
/// by a `bias` tensor shaped `[outputs]`. With the squared error this is
/// linear regression, with the binary cross entropy logistic regression and
/// with the negative log likelihood softmax regression.
#[derive(Debug, Clone)]
pub struct GeneralizedLinear {
    features: usize,
    outputs: usize,
    loss: Loss,
    weight_decay: f64,
    layout: ParameterLayout,
}

impl GeneralizedLinear {
    /// Creates a new `GeneralizedLinear` model.
    ///
    /// # Args
    /// * `features` - The amount of input features.
    /// * `classes` - The amount of classes, only used by the negative log likelihood.
    /// * `loss` - The loss to train with.
    /// * `weight_decay` - The coefficient `λ` of an added `λ/2 ‖θ‖²` penalty.
    ///
    /// # Returns
    /// The model or an `MlError::InvalidInput` if any size is zero or `λ` is
    /// negative or not finite.
    pub fn new(features: usize, classes: usize, loss: Loss, weight_decay: f64) -> Result<Self> {
        if features == 0 {
            return Err(MlError::InvalidInput("a model needs at least one feature"));
        }
        if matches!(loss, Loss::Nll(_)) && classes < 2 {
            return Err(MlError::InvalidInput("softmax regression needs at least two classes"));
        }
        if !weight_decay.is_finite() || weight_decay < 0.0 {
            return Err(MlError::InvalidInput("weight decay must be finite and non-negative"));
        }

        let outputs = loss.outputs(classes);
        let layout =
            ParameterLayout::new([(WEIGHT, vec![outputs, features]), (BIAS, vec![outputs])])?;

        Ok(Self {
            features,
            outputs,
            loss,
            weight_decay,
            layout,
        })
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    #[inline]
    pub fn features(&self) -> usize {
        self.features
    }

    #[inline]
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    #[inline]
    pub fn loss_fn(&self) -> Loss {
        self.loss
    }

    /// Samples fresh parameters, weights from `N(0, std_dev²)` and zero biases.
    ///
    /// # Errors
    /// `MlError::InvalidInput` if `std_dev` is negative or not finite.
    pub fn init_params<R: Rng + ?Sized>(&self, rng: &mut R, std_dev: f64) -> Result<ParameterSet> {
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(MlError::InvalidInput(
                "initialization std dev must be finite and non-negative",
            ));
        }
        let normal = Normal::new(0.0, std_dev).map_err(|_| {
            MlError::InvalidInput("initialization std dev must be finite and non-negative")
        })?;

        let mut params = ParameterSet::zeros(&self.layout);
        if let Some(mut weight) = params.get_mut(WEIGHT) {
            weight.mapv_inplace(|_| normal.sample(&mut *rng));
        }
        Ok(params)
    }

    /// Computes the model's prediction for `x`, mapped through the loss's link.
    ///
    /// Returns raw outputs for the squared error, probabilities of the positive
    /// class for the binary cross entropy and class probabilities for the
    /// negative log likelihood.
    pub fn predict(&self, params: &ParameterSet, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_params(params)?;
        if x.ncols() != self.features {
            return Err(MlError::ShapeMismatch {
                what: "batch features",
                got: x.ncols(),
                expected: self.features,
            });
        }

        let z = self.forward(&self.stacked(params)?, x);
        Ok(match self.loss {
            Loss::Mse(_) => z,
            Loss::Bce(_) => z.mapv(sigmoid),
            Loss::Nll(_) => softmax(z.view()),
        })
    }

    /// Fraction of `batch` classified correctly, `None` for the squared error.
    pub fn accuracy(&self, params: &ParameterSet, batch: &Batch) -> Result<Option<f64>> {
        let p = self.predict(params, batch.x().view())?;
        let hits = match self.loss {
            Loss::Mse(_) => return Ok(None),
            Loss::Bce(_) => p
                .column(0)
                .iter()
                .zip(batch.y())
                .filter(|&(&p, &y)| (p >= 0.5) == (y >= 0.5))
                .count(),
            Loss::Nll(_) => p
                .rows()
                .into_iter()
                .zip(batch.y())
                .filter(|&(row, &y)| argmax(row) == y as usize)
                .count(),
        };
        Ok(Some(hits as f64 / batch.len() as f64))
    }

    fn check_params(&self, params: &ParameterSet) -> Result<()> {
        if params.layout() != &self.layout {
            return Err(MlError::ShapeMismatch {
                what: "model parameters",
                got: params.num_params(),
                expected: self.layout.len(),
            });
        }
        Ok(())
    }

    /// The weight and bias stacked as a single `outputs×(features+1)` matrix.
    fn stacked(&self, params: &ParameterSet) -> Result<Array2<f64>> {
        let shape_err = || MlError::InvalidInput("linear model parameters are malformed");
        let weight = params
            .get(WEIGHT)
            .ok_or_else(shape_err)?
            .into_dimensionality::<Ix2>()
            .map_err(|_| shape_err())?;
        let bias = params
            .get(BIAS)
            .ok_or_else(shape_err)?
            .into_dimensionality::<Ix1>()
            .map_err(|_| shape_err())?
            .insert_axis(Axis(1));

        concatenate(Axis(1), &[weight, bias]).map_err(|_| shape_err())
    }

    fn forward(&self, theta: &Array2<f64>, x: ArrayView2<f64>) -> Array2<f64> {
        let w = theta.slice(s![.., ..self.features]);
        let b = theta.column(self.features);
        x.dot(&w.t()) + &b
    }
}

impl DifferentiationOracle for GeneralizedLinear {
    type Graph = GlmGraph;

    fn compute_loss(&self, params: &ParameterSet, batch: &Batch) -> Result<GlmGraph> {
        self.check_params(params)?;
        if batch.features() != self.features {
            return Err(MlError::ShapeMismatch {
                what: "batch features",
                got: batch.features(),
                expected: self.features,
            });
        }
        self.loss.check_targets(batch.y().view(), self.outputs)?;
        ensure_finite("batch inputs", batch.x())?;
        ensure_finite("parameters", params.tensors().iter().flat_map(|t| t.iter()))?;

        let theta = self.stacked(params)?;
        let z = self.forward(&theta, batch.x().view());
        let ones = Array2::ones((batch.len(), 1));
        let phi = concatenate(Axis(1), &[batch.x().view(), ones.view()])
            .map_err(|_| MlError::InvalidInput("could not build the design matrix"))?;

        let penalty = 0.5 * self.weight_decay * theta.mapv(|v| v * v).sum();
        let loss = self.loss.loss(z.view(), batch.y().view()) + penalty;
        if !loss.is_finite() {
            return Err(MlError::NonFinite {
                what: "loss",
                index: 0,
                value: loss,
            });
        }
        debug!(samples = batch.len(), loss = loss; "forward pass");

        Ok(GlmGraph {
            loss_fn: self.loss,
            weight_decay: self.weight_decay,
            features: self.features,
            outputs: self.outputs,
            phi,
            y: batch.y().clone(),
            z,
            theta,
            loss,
            second: None,
        })
    }
}

/// The retained forward pass of a `GeneralizedLinear` model over one batch.
///
/// Derivatives are computed analytically from the stored outputs, the
/// per-sample second derivative blocks are computed once and cached.
#[derive(Debug)]
pub struct GlmGraph {
    loss_fn: Loss,
    weight_decay: f64,
    features: usize,
    outputs: usize,
    /// Design matrix `[x | 1]`, `n×(features+1)`.
    phi: Array2<f64>,
    y: Array1<f64>,
    z: Array2<f64>,
    theta: Array2<f64>,
    loss: f64,
    second: Option<Array3<f64>>,
}

impl GlmGraph {
    /// Flat position of the parameter multiplying input `a` for output `j`,
    /// `a == features` being the bias.
    #[inline]
    fn index(&self, j: usize, a: usize) -> usize {
        if a < self.features {
            j * self.features + a
        } else {
            self.outputs * self.features + j
        }
    }

    fn flatten(&self, m: &Array2<f64>) -> Array1<f64> {
        let mut flat = Array1::zeros(self.dim());
        for ((j, a), &v) in m.indexed_iter() {
            flat[self.index(j, a)] = v;
        }
        flat
    }

    fn stack(&self, v: ArrayView1<f64>) -> Array2<f64> {
        Array2::from_shape_fn((self.outputs, self.features + 1), |(j, a)| v[self.index(j, a)])
    }

    fn second(&mut self) -> &Array3<f64> {
        let (loss_fn, z, y) = (self.loss_fn, &self.z, &self.y);
        self.second
            .get_or_insert_with(|| loss_fn.loss_second(z.view(), y.view()))
    }
}

impl LossGraph for GlmGraph {
    fn loss(&self) -> f64 {
        self.loss
    }

    fn dim(&self) -> usize {
        self.outputs * (self.features + 1)
    }

    fn gradient(&mut self) -> Result<Array1<f64>> {
        let g_z = self.loss_fn.loss_prime(self.z.view(), self.y.view());
        let mut g = g_z.t().dot(&self.phi);
        g.scaled_add(self.weight_decay, &self.theta);

        let flat = self.flatten(&g);
        ensure_finite("gradient", &flat)?;
        Ok(flat)
    }

    fn hessian(&mut self) -> Result<Array2<f64>> {
        let d = self.dim();
        let cols = self.features + 1;
        let mut h = Array2::zeros((d, d));

        let second = self.second().clone();
        for (i, phi_i) in self.phi.rows().into_iter().enumerate() {
            for j in 0..self.outputs {
                for l in 0..self.outputs {
                    let s_jl = second[[i, j, l]];
                    if s_jl == 0.0 {
                        continue;
                    }
                    for a in 0..cols {
                        let row = self.index(j, a);
                        let sa = s_jl * phi_i[a];
                        for b in 0..cols {
                            h[[row, self.index(l, b)]] += sa * phi_i[b];
                        }
                    }
                }
            }
        }
        h.diag_mut().mapv_inplace(|v| v + self.weight_decay);

        ensure_finite("hessian", &h)?;
        Ok(h)
    }

    fn hvp(&mut self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if v.len() != self.dim() {
            return Err(MlError::ShapeMismatch {
                what: "hvp vector",
                got: v.len(),
                expected: self.dim(),
            });
        }

        let v_mat = self.stack(v);
        // u_i = V φ_i, w_i = S_i u_i
        let u = self.phi.dot(&v_mat.t());
        let second = self.second();
        let mut w = Array2::zeros(u.raw_dim());
        for (i, mut w_i) in w.rows_mut().into_iter().enumerate() {
            w_i.assign(&second.index_axis(Axis(0), i).dot(&u.row(i)));
        }

        let mut out = self.flatten(&w.t().dot(&self.phi));
        out.scaled_add(self.weight_decay, &v);
        ensure_finite("hessian-vector product", &out)?;
        Ok(out)
    }
}

fn argmax(row: ArrayView1<f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const EPS: f64 = 1e-6;

    fn batch(loss: Loss) -> Batch {
        let x = array![[0.5, -1.0], [1.5, 0.3], [-0.7, 0.8], [0.2, 0.1]];
        let y = match loss {
            Loss::Mse(_) => array![1.0, -0.5, 0.3, 2.0],
            Loss::Bce(_) => array![1.0, 0.0, 0.0, 1.0],
            Loss::Nll(_) => array![0.0, 2.0, 1.0, 2.0],
        };
        Batch::new(x, y).unwrap()
    }

    fn model(loss: Loss) -> GeneralizedLinear {
        GeneralizedLinear::new(2, 3, loss, 0.1).unwrap()
    }

    fn loss_at(model: &GeneralizedLinear, batch: &Batch, flat: &Array1<f64>) -> f64 {
        let params = ParameterSet::from_flat(model.layout(), flat.view()).unwrap();
        model.compute_loss(&params, batch).unwrap().loss()
    }

    fn gradient_at(model: &GeneralizedLinear, batch: &Batch, flat: &Array1<f64>) -> Array1<f64> {
        let params = ParameterSet::from_flat(model.layout(), flat.view()).unwrap();
        model.compute_loss(&params, batch).unwrap().gradient().unwrap()
    }

    fn check_derivatives(loss: Loss) {
        let model = model(loss);
        let batch = batch(loss);
        let mut rng = StdRng::seed_from_u64(7);
        let params = model.init_params(&mut rng, 0.5).unwrap();
        let theta = params.flatten();

        let mut graph = model.compute_loss(&params, &batch).unwrap();
        let g = graph.gradient().unwrap();
        let h = graph.hessian().unwrap();

        for k in 0..theta.len() {
            let mut plus = theta.clone();
            let mut minus = theta.clone();
            plus[k] += EPS;
            minus[k] -= EPS;

            let fd = (loss_at(&model, &batch, &plus) - loss_at(&model, &batch, &minus)) / (2.0 * EPS);
            assert!((fd - g[k]).abs() < 1e-6, "gradient {k}: {fd} vs {}", g[k]);

            let fd_col = (gradient_at(&model, &batch, &plus) - gradient_at(&model, &batch, &minus))
                / (2.0 * EPS);
            for r in 0..theta.len() {
                assert!((fd_col[r] - h[[r, k]]).abs() < 1e-5, "hessian ({r}, {k})");
            }
        }

        let v = Array1::from_shape_fn(theta.len(), |i| (i as f64 * 0.37).sin());
        let hv = graph.hvp(v.view()).unwrap();
        let dense = h.dot(&v);
        for (a, b) in hv.iter().zip(&dense) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn squared_error_derivatives_match_finite_differences() {
        check_derivatives(Loss::mse());
    }

    #[test]
    fn logistic_derivatives_match_finite_differences() {
        check_derivatives(Loss::bce());
    }

    #[test]
    fn softmax_derivatives_match_finite_differences() {
        check_derivatives(Loss::nll());
    }

    #[test]
    fn negative_init_std_dev_is_rejected() {
        let model = model(Loss::mse());
        let mut rng = StdRng::seed_from_u64(1);

        assert!(matches!(
            model.init_params(&mut rng, -0.5),
            Err(MlError::InvalidInput(_))
        ));
        assert!(model.init_params(&mut rng, f64::INFINITY).is_err());

        let zeros = model.init_params(&mut rng, 0.0).unwrap();
        assert!(zeros.flatten().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn layout_is_weight_then_bias() {
        let model = model(Loss::nll());
        let slots = model.layout().slots();

        assert_eq!(slots[0].name(), "weight");
        assert_eq!(slots[0].shape(), &[3, 2]);
        assert_eq!(slots[1].name(), "bias");
        assert_eq!(slots[1].shape(), &[3]);
        assert_eq!(model.layout().len(), 9);
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let model = GeneralizedLinear::new(3, 1, Loss::mse(), 0.0).unwrap();
        let params = ParameterSet::zeros(model.layout());

        let err = model.compute_loss(&params, &batch(Loss::mse())).unwrap_err();
        assert!(matches!(err, MlError::ShapeMismatch { what: "batch features", got: 2, expected: 3 }));
    }

    #[test]
    fn foreign_parameters_are_rejected() {
        let model = model(Loss::mse());
        let other = GeneralizedLinear::new(4, 1, Loss::mse(), 0.0).unwrap();
        let params = ParameterSet::zeros(other.layout());

        assert!(model.compute_loss(&params, &batch(Loss::mse())).is_err());
    }

    #[test]
    fn separable_data_is_classified() {
        let model = GeneralizedLinear::new(1, 2, Loss::bce(), 0.0).unwrap();
        let mut params = ParameterSet::zeros(model.layout());
        params.get_mut("weight").unwrap().fill(4.0);
        let batch = Batch::new(array![[-1.0], [-2.0], [1.0], [2.0]], array![0.0, 0.0, 1.0, 1.0]).unwrap();

        assert_eq!(model.accuracy(&params, &batch).unwrap(), Some(1.0));
    }
}
