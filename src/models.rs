/*!
# Models

A benchmarked model comes in one of two representations, captured by [`ModelKind`]:

- [`ClassicalModel`]: a builder that turns a whole [`Dataset`] into a plain [`Target`] over a
  parameter vector. Sampled by the Metropolis–Hastings engine, once per
  [`ClassicalSampler`] variant.
- [`KernelModel`]: a batched autodiff log-density whose declared arguments are bound to
  same-named dataset columns. Sampled by the data-parallel HMC engine.

Both built-in linear-regression models describe the same posterior over
`(intercept, slope, log_sigma)`, so their draws can be compared.
*/

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::distributions::{GradientTarget, Target};
use crate::error::{Error, Result};

/// Autodiff backend the kernel engine runs on.
pub type KernelBackend = Autodiff<NdArray>;

/// Kernel arguments after binding: argument name to column values.
pub type BoundArgs = BTreeMap<String, Vec<f64>>;

pub type ClassicalTarget = Arc<dyn Target<f64> + Send + Sync>;
pub type ClassicalBuilder = Arc<dyn Fn(&Dataset) -> Result<ClassicalTarget> + Send + Sync>;
pub type KernelTarget = Box<dyn GradientTarget<KernelBackend>>;
pub type KernelBuilder = Arc<dyn Fn(&BoundArgs) -> Result<KernelTarget> + Send + Sync>;

/// Random-walk Metropolis variants run for every classical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassicalSampler {
    /// Fixed proposal scale.
    Metropolis,
    /// Proposal scale tuned during warm-up.
    Adaptive,
}

impl ClassicalSampler {
    pub const ALL: [ClassicalSampler; 2] = [ClassicalSampler::Metropolis, ClassicalSampler::Adaptive];

    pub fn name(&self) -> &'static str {
        match self {
            ClassicalSampler::Metropolis => "metropolis",
            ClassicalSampler::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for ClassicalSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A model built from the whole dataset as a log-density over parameters.
#[derive(Clone)]
pub struct ClassicalModel {
    pub param_names: Vec<String>,
    pub initial_state: Vec<f64>,
    /// Starting standard deviation of the random-walk proposal.
    pub proposal_scale: f64,
    build: ClassicalBuilder,
}

impl ClassicalModel {
    pub fn new<F>(param_names: Vec<String>, initial_state: Vec<f64>, build: F) -> Self
    where
        F: Fn(&Dataset) -> Result<ClassicalTarget> + Send + Sync + 'static,
    {
        Self {
            param_names,
            initial_state,
            proposal_scale: 0.1,
            build: Arc::new(build),
        }
    }

    pub fn with_proposal_scale(mut self, scale: f64) -> Self {
        self.proposal_scale = scale;
        self
    }

    pub fn build(&self, data: &Dataset) -> Result<ClassicalTarget> {
        (self.build)(data)
    }
}

/// A batched, differentiable model whose arguments are dataset columns.
#[derive(Clone)]
pub struct KernelModel {
    /// Argument names, each bound to the dataset column of the same name.
    pub args: Vec<String>,
    pub param_names: Vec<String>,
    pub initial_state: Vec<f64>,
    pub step_size: f64,
    pub n_leapfrog: usize,
    build: KernelBuilder,
}

impl KernelModel {
    pub fn new<F>(
        args: Vec<String>,
        param_names: Vec<String>,
        initial_state: Vec<f64>,
        build: F,
    ) -> Self
    where
        F: Fn(&BoundArgs) -> Result<KernelTarget> + Send + Sync + 'static,
    {
        Self {
            args,
            param_names,
            initial_state,
            step_size: 0.01,
            n_leapfrog: 10,
            build: Arc::new(build),
        }
    }

    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_leapfrog(mut self, n_leapfrog: usize) -> Self {
        self.n_leapfrog = n_leapfrog;
        self
    }

    /// Binds every declared argument to the same-named column of `data`.
    pub fn bind(&self, data: &Dataset) -> Result<BoundArgs> {
        self.args
            .iter()
            .map(|arg| Ok((arg.clone(), data.column(arg)?.to_vec())))
            .collect()
    }

    pub fn build(&self, args: &BoundArgs) -> Result<KernelTarget> {
        (self.build)(args)
    }
}

/// The two model representations the dispatcher understands.
#[derive(Clone)]
pub enum ModelKind {
    Classical(ClassicalModel),
    Kernel(KernelModel),
}

impl ModelKind {
    pub fn param_names(&self) -> &[String] {
        match self {
            ModelKind::Classical(m) => &m.param_names,
            ModelKind::Kernel(m) => &m.param_names,
        }
    }
}

/// Parameter names of the built-in linear regression.
pub const LINEAR_PARAMS: [&str; 3] = ["intercept", "slope", "log_sigma"];

/// Prior standard deviation of intercept and slope.
const COEF_PRIOR_SD: f64 = 10.0;
/// Prior standard deviation of `log_sigma`.
const LOG_SIGMA_PRIOR_SD: f64 = 2.0;

fn linear_param_names() -> Vec<String> {
    LINEAR_PARAMS.iter().map(|s| s.to_string()).collect()
}

/// `y ~ N(intercept + slope·x, exp(log_sigma)²)` with independent normal priors.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LinearRegression {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(Error::ColumnLength {
                column: "y".to_string(),
                expected: x.len(),
                got: y.len(),
            });
        }
        Ok(Self { x, y })
    }
}

impl Target<f64> for LinearRegression {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let (a, b, log_sigma) = (theta[0], theta[1], theta[2]);
        let sigma = log_sigma.exp();
        let sq: f64 = self
            .x
            .iter()
            .zip(&self.y)
            .map(|(x, y)| ((y - a - b * x) / sigma).powi(2))
            .sum();
        let loglik = -0.5 * sq - self.x.len() as f64 * log_sigma;
        let prior = -0.5 * (a * a + b * b) / COEF_PRIOR_SD.powi(2)
            - 0.5 * log_sigma * log_sigma / LOG_SIGMA_PRIOR_SD.powi(2);
        loglik + prior
    }
}

/// The classical linear regression, reading columns `x` and `y`.
pub fn linear_regression_classical() -> ClassicalModel {
    ClassicalModel::new(linear_param_names(), vec![0.0; 3], |data: &Dataset| {
        let model = LinearRegression::new(data.column("x")?.to_vec(), data.column("y")?.to_vec())?;
        Ok(Arc::new(model) as ClassicalTarget)
    })
    .with_proposal_scale(0.05)
}

/// Tensor form of [`LinearRegression`] for a batch of parameter rows.
#[derive(Debug, Clone)]
pub struct LinearRegressionKernel<B: Backend> {
    /// `[2, n]`: a row of ones above the `x` row.
    design: Tensor<B, 2>,
    /// `[1, n]`
    y: Tensor<B, 2>,
    n: usize,
}

impl<B: Backend> LinearRegressionKernel<B> {
    pub fn new(x: &[f64], y: &[f64], device: &B::Device) -> Result<Self> {
        let n = x.len();
        if y.len() != n {
            return Err(Error::ColumnLength {
                column: "y".to_string(),
                expected: n,
                got: y.len(),
            });
        }
        let design: Vec<f64> = std::iter::repeat(1.0).take(n).chain(x.iter().copied()).collect();
        let design = Tensor::from_data(
            TensorData::new(design, [2, n]).convert::<B::FloatElem>(),
            device,
        );
        let y = Tensor::from_data(
            TensorData::new(y.to_vec(), [1, n]).convert::<B::FloatElem>(),
            device,
        );
        Ok(Self { design, y, n })
    }
}

impl<B: AutodiffBackend> GradientTarget<B> for LinearRegressionKernel<B> {
    fn log_prob_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1> {
        let [n_chains, _] = positions.dims();
        let device = positions.device();
        let coef = positions.clone().slice([0..n_chains, 0..2]);
        let log_sigma = positions.slice([0..n_chains, 2..3]);

        // Broadcast through outer products with ones: [n_chains, n].
        let mu = coef.clone().matmul(self.design.clone());
        let y = Tensor::<B, 2>::ones([n_chains, 1], &device).matmul(self.y.clone());
        let sigma = log_sigma
            .clone()
            .exp()
            .matmul(Tensor::<B, 2>::ones([1, self.n], &device));

        let z = (y - mu).div(sigma);
        let loglik = z.powf_scalar(2.0).sum_dim(1).mul_scalar(-0.5)
            - log_sigma.clone().mul_scalar(self.n as f64);
        let prior = coef
            .powf_scalar(2.0)
            .sum_dim(1)
            .mul_scalar(-0.5 / COEF_PRIOR_SD.powi(2))
            + log_sigma
                .powf_scalar(2.0)
                .mul_scalar(-0.5 / LOG_SIGMA_PRIOR_SD.powi(2));
        (loglik + prior).squeeze(1)
    }
}

/// The kernel linear regression with arguments `x` and `y`.
pub fn linear_regression_kernel() -> KernelModel {
    KernelModel::new(
        vec!["x".to_string(), "y".to_string()],
        linear_param_names(),
        vec![0.0; 3],
        |args: &BoundArgs| {
            let column = |name: &str| {
                args.get(name)
                    .ok_or_else(|| Error::UnknownColumn(name.to_string()))
            };
            let device = <KernelBackend as Backend>::Device::default();
            let kernel = LinearRegressionKernel::<KernelBackend>::new(
                column("x")?,
                column("y")?,
                &device,
            )?;
            Ok(Box::new(kernel) as KernelTarget)
        },
    )
    .with_step_size(0.01)
    .with_leapfrog(10)
}
