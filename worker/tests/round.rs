use std::num::NonZeroUsize;

use gt_worker::{Curvature, EdgeWorker, WorkerConfig, WorkerErr};
use ml_core::{
    Batch, BatchSource, DifferentiationOracle, FederatedClient, GradientSource, LossGraph,
    MlError, ParameterSet, Result, Termination,
};
use ndarray::{Array1, Array2, ArrayD, IxDyn, array};

/// `f(θ) = ½ θᵀAθ − bᵀθ` over two scalar tensors.
#[derive(Clone)]
struct Quadratic {
    a: Array2<f64>,
    b: Array1<f64>,
}

struct QuadraticGraph {
    a: Array2<f64>,
    b: Array1<f64>,
    theta: Array1<f64>,
}

impl DifferentiationOracle for Quadratic {
    type Graph = QuadraticGraph;

    fn compute_loss(&self, params: &ParameterSet, _batch: &Batch) -> Result<QuadraticGraph> {
        Ok(QuadraticGraph {
            a: self.a.clone(),
            b: self.b.clone(),
            theta: params.flatten(),
        })
    }
}

impl LossGraph for QuadraticGraph {
    fn loss(&self) -> f64 {
        0.5 * self.theta.dot(&self.a.dot(&self.theta)) - self.b.dot(&self.theta)
    }

    fn dim(&self) -> usize {
        self.theta.len()
    }

    fn gradient(&mut self) -> Result<Array1<f64>> {
        Ok(self.a.dot(&self.theta) - &self.b)
    }

    fn hessian(&mut self) -> Result<Array2<f64>> {
        Ok(self.a.clone())
    }
}

/// An oracle whose gradient disagrees with the parameter count, or is NaN.
#[derive(Clone)]
struct Broken {
    gradient: Array1<f64>,
}

impl DifferentiationOracle for Broken {
    type Graph = BrokenGraph;

    fn compute_loss(&self, _params: &ParameterSet, _batch: &Batch) -> Result<BrokenGraph> {
        Ok(BrokenGraph {
            gradient: self.gradient.clone(),
        })
    }
}

struct BrokenGraph {
    gradient: Array1<f64>,
}

impl LossGraph for BrokenGraph {
    fn loss(&self) -> f64 {
        1.0
    }

    fn dim(&self) -> usize {
        2
    }

    fn gradient(&mut self) -> Result<Array1<f64>> {
        Ok(self.gradient.clone())
    }

    fn hessian(&mut self) -> Result<Array2<f64>> {
        Ok(Array2::eye(2))
    }
}

/// Hands out the same one-sample batch forever.
struct Fixed;

impl BatchSource for Fixed {
    fn next_batch(&mut self) -> Result<Batch> {
        Batch::new(array![[0.0]], array![0.0])
    }

    fn full_batches(&self) -> Result<Vec<Batch>> {
        Ok(vec![Batch::new(array![[0.0]], array![0.0])?])
    }
}

fn params() -> ParameterSet {
    ParameterSet::new([
        ("first", ArrayD::zeros(IxDyn(&[1]))),
        ("second", ArrayD::zeros(IxDyn(&[1]))),
    ])
    .unwrap()
}

fn config(alpha: f64, iterations: usize, curvature: Curvature) -> WorkerConfig {
    let mut config = WorkerConfig::new(alpha, NonZeroUsize::new(iterations).unwrap());
    config.curvature = curvature;
    config
}

/// `H + αI = diag(3, 2)` and, at `θ = 0`, `g = (6, 4)`.
fn diagonal_worker(curvature: Curvature) -> EdgeWorker<Quadratic, Fixed> {
    let oracle = Quadratic {
        a: array![[2.0, 0.0], [0.0, 1.0]],
        b: array![-6.0, -4.0],
    };
    EdgeWorker::new(0, config(1.0, 5, curvature), oracle, Fixed, params()).unwrap()
}

fn flat(tensors: &[ArrayD<f64>]) -> Vec<f64> {
    tensors.iter().flat_map(|t| t.iter().copied()).collect()
}

fn assert_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < tol, "{a:?} vs {b:?}");
    }
}

#[test]
fn diagonal_system_converges_to_exact_direction() {
    for curvature in [Curvature::Dense, Curvature::Operator] {
        let mut worker = diagonal_worker(curvature);

        let stats = worker.train_round().unwrap();

        assert_eq!(stats.termination(), Termination::Converged);
        assert!(stats.iterations() <= 2);
        assert!(!stats.used_tracked_gradient());
        assert_close(&flat(&worker.direction()), &[2.0, 2.0], 1e-10);
        assert_eq!(worker.rounds(), 1);
    }
}

#[test]
fn tracked_gradient_equal_to_local_changes_nothing() {
    let mut plain = diagonal_worker(Curvature::Dense);
    plain.train_round().unwrap();

    let mut tracked = diagonal_worker(Curvature::Dense);
    let same = vec![ArrayD::from_elem(IxDyn(&[1]), 6.0), ArrayD::from_elem(IxDyn(&[1]), 4.0)];
    tracked.set_tracked_gradient(GradientSource::PerTensor(same)).unwrap();
    let stats = tracked.train_round().unwrap();

    assert!(stats.used_tracked_gradient());
    assert_eq!(flat(&plain.direction()), flat(&tracked.direction()));
}

#[test]
fn tracked_gradient_replaces_the_local_one() {
    let mut worker = diagonal_worker(Curvature::Dense);

    worker
        .set_tracked_gradient(GradientSource::Flat(array![3.0, 3.0]))
        .unwrap();
    worker
        .set_tracked_gradient(GradientSource::Flat(array![3.0, 2.0]))
        .unwrap();
    worker.train_round().unwrap();

    // diag(3, 2)⁻¹ · (3, 2), the first injection must not be added in
    assert_close(&flat(&worker.direction()), &[1.0, 1.0], 1e-10);

    worker.clear_tracked_gradient();
    worker.train_round().unwrap();
    assert_close(&flat(&worker.direction()), &[2.0, 2.0], 1e-10);
}

#[test]
fn failing_round_keeps_the_previous_direction() {
    let mut worker = diagonal_worker(Curvature::Dense);
    worker.train_round().unwrap();
    let before = worker.direction();

    let poisoned = vec![ArrayD::from_elem(IxDyn(&[1]), f64::NAN), ArrayD::zeros(IxDyn(&[1]))];
    worker.set_parameters(&poisoned).unwrap();
    let err = worker.train_round().unwrap_err();

    assert!(matches!(
        err,
        WorkerErr::Training { worker: 0, round: 1, source: MlError::NonFinite { .. } }
    ));
    assert_eq!(worker.direction(), before);
    assert_eq!(worker.rounds(), 1);
}

#[test]
fn insufficient_regularization_reports_negative_curvature() {
    // eigenvalues 1 and -3, α = 1 leaves diag(2, -2)
    let oracle = Quadratic {
        a: array![[1.0, 0.0], [0.0, -3.0]],
        b: array![0.0, -1.0],
    };
    let mut worker =
        EdgeWorker::new(4, config(1.0, 5, Curvature::Dense), oracle.clone(), Fixed, params())
            .unwrap();

    let err = worker.train_round().unwrap_err();
    assert!(matches!(
        err.ml_error(),
        Some(MlError::NonPositiveCurvature { iteration: 1, .. })
    ));
    assert!(flat(&worker.direction()).iter().all(|&v| v == 0.0));

    // α = 4 > 3 makes the system positive definite: diag(5, 1)
    let mut worker =
        EdgeWorker::new(4, config(4.0, 5, Curvature::Dense), oracle, Fixed, params()).unwrap();
    worker.train_round().unwrap();
    assert_close(&flat(&worker.direction()), &[0.0, 1.0], 1e-10);
}

#[test]
fn iteration_cap_is_not_an_error() {
    let oracle = Quadratic {
        a: array![[3.0, 1.0], [1.0, 2.0]],
        b: array![-1.0, -2.0],
    };
    let mut worker =
        EdgeWorker::new(0, config(0.5, 1, Curvature::Dense), oracle, Fixed, params()).unwrap();

    let stats = worker.train_round().unwrap();

    assert_eq!(stats.iterations(), 1);
    assert_eq!(stats.termination(), Termination::MaxIterations);
    assert!(stats.residual_norm() > 1e-8);
    assert!(flat(&worker.direction()).iter().any(|&v| v != 0.0));
}

#[test]
fn invalid_alpha_is_rejected_at_construction() {
    let oracle = Quadratic {
        a: Array2::eye(2),
        b: Array1::zeros(2),
    };
    let result = EdgeWorker::new(0, config(0.0, 3, Curvature::Dense), oracle, Fixed, params());
    assert!(matches!(result, Err(WorkerErr::InvalidConfig(_))));
}

#[test]
fn full_gradient_and_evaluate_use_the_local_model() {
    let worker = diagonal_worker(Curvature::Dense);

    let g = worker.full_gradient().unwrap();
    assert_eq!(g, array![6.0, 4.0]);

    let batches = worker.source().full_batches().unwrap();
    assert_eq!(worker.evaluate(&batches).unwrap(), 0.0);
    assert!(worker.evaluate(&[]).is_err());
}

#[test]
fn malformed_oracle_gradient_is_rejected_everywhere() {
    let oracle = Broken {
        gradient: array![1.0, 2.0, 3.0],
    };
    let mut worker =
        EdgeWorker::new(0, config(1.0, 3, Curvature::Dense), oracle, Fixed, params()).unwrap();

    let err = worker.train_round().unwrap_err();
    assert!(matches!(
        err.ml_error(),
        Some(MlError::ShapeMismatch { what: "gradient", got: 3, expected: 2 })
    ));
    let err = worker.full_gradient().unwrap_err();
    assert!(matches!(
        err,
        WorkerErr::Ml(MlError::ShapeMismatch { what: "gradient", got: 3, expected: 2 })
    ));

    let oracle = Broken {
        gradient: array![1.0, f64::NAN],
    };
    let worker =
        EdgeWorker::new(0, config(1.0, 3, Curvature::Dense), oracle, Fixed, params()).unwrap();
    assert!(matches!(
        worker.full_gradient(),
        Err(WorkerErr::Ml(MlError::NonFinite { what: "gradient", index: 1, .. }))
    ));
}
