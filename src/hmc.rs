//! A data-parallel Hamiltonian Monte Carlo sampler using the `burn` crate for autodiff.
//!
//! This is the kernel engine. All chains move together: their positions form one
//! `[n_chains, D]` batch, the target's log density is evaluated once per batch, and
//! `burn` supplies the gradient of that batch. The leapfrog integrator and the
//! accept/reject step run on the host over `ndarray` arrays.
//!
//! During warm-up the step size is nudged towards a target mean acceptance probability.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, Array3, Axis, Zip};
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::distributions::GradientTarget;
use crate::error::{Error, Result};
use crate::stats::RhatMulti;

/// Default mean acceptance probability aimed at while tuning the step size.
pub const DEFAULT_TARGET_ACCEPT: f64 = 0.8;

/// Learning rate of the warm-up step-size update.
const ADAPT_RATE: f64 = 0.5;

/// A data-parallel HMC sampler over a [`GradientTarget`].
///
/// # Type Parameters
///
/// * `B`: Autodiff backend from the `burn` crate.
/// * `G`: The target distribution type.
#[derive(Clone)]
pub struct HMC<B, G>
where
    B: AutodiffBackend,
{
    /// The target distribution which provides batched log densities.
    pub target: G,
    /// The step size of the leapfrog integrator.
    pub step_size: f64,
    /// The number of leapfrog steps per update.
    pub n_leapfrog: usize,
    /// Mean acceptance probability aimed at during warm-up.
    pub target_accept: f64,
    positions: Array2<f64>,
    cache: Option<(Array1<f64>, Array2<f64>)>,
    rng: SmallRng,
    device: B::Device,
}

impl<B, G> HMC<B, G>
where
    B: AutodiffBackend,
    G: GradientTarget<B>,
{
    /// Creates a sampler with one chain per entry of `initial_positions` (`[n_chains][D]`).
    ///
    /// # Errors
    ///
    /// Fails if the initial positions do not all have the same length.
    pub fn new(
        target: G,
        initial_positions: Vec<Vec<f64>>,
        step_size: f64,
        n_leapfrog: usize,
    ) -> Result<Self> {
        let n_chains = initial_positions.len();
        let dim = initial_positions.first().map_or(0, Vec::len);
        let flat: Vec<f64> = initial_positions.into_iter().flatten().collect();
        let positions = Array2::from_shape_vec((n_chains, dim), flat)?;
        Ok(Self {
            target,
            step_size,
            n_leapfrog,
            target_accept: DEFAULT_TARGET_ACCEPT,
            positions,
            cache: None,
            rng: SmallRng::seed_from_u64(thread_rng().gen::<u64>()),
            device: B::Device::default(),
        })
    }

    /// Sets a new random seed for momenta and accept/reject draws.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn positions(&self) -> &Array2<f64> {
        &self.positions
    }

    /// Evaluates the batched log density and its gradient at `positions`.
    pub fn logp_and_grad(&self, positions: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
        let (n_chains, dim) = positions.dim();
        let flat: Vec<f64> = positions.iter().copied().collect();
        let td = TensorData::new(flat, [n_chains, dim]).convert::<B::FloatElem>();
        let pos = Tensor::<B, 2>::from_data(td, &self.device).require_grad();

        let logp = self.target.log_prob_batch(pos.clone());
        let grads = logp.clone().sum().backward();
        let grad = pos
            .grad(&grads)
            .ok_or_else(|| Error::Sampler("target does not depend on positions".to_string()))?;

        let logp: Vec<f64> = logp
            .into_data()
            .convert::<f64>()
            .to_vec()
            .map_err(|e| Error::Sampler(format!("reading log densities failed: {e:?}")))?;
        let grad: Vec<f64> = grad
            .into_data()
            .convert::<f64>()
            .to_vec()
            .map_err(|e| Error::Sampler(format!("reading gradients failed: {e:?}")))?;

        Ok((
            Array1::from_vec(logp),
            Array2::from_shape_vec((n_chains, dim), grad)?,
        ))
    }

    /// Perform one batched HMC update for all chains.
    ///
    /// 1) Sample momenta from a standard normal distribution.
    /// 2) Run the leapfrog integrator to propose new positions.
    /// 3) Accept or reject each chain's proposal independently.
    ///
    /// Returns the mean acceptance probability across chains.
    pub fn step(&mut self) -> Result<f64> {
        let (n_chains, dim) = self.positions.dim();
        let (logp_current, grad_current) = match self.cache.take() {
            Some(cached) => cached,
            None => self.logp_and_grad(&self.positions)?,
        };

        let momentum_0 =
            Array2::from_shape_simple_fn((n_chains, dim), || self.rng.sample(StandardNormal));
        let h_current = &logp_current.mapv(|lp| -lp) + &kinetic(&momentum_0);

        let (pos, mom, logp_proposed, grad_proposed) =
            self.leapfrog(self.positions.clone(), momentum_0, grad_current.clone())?;
        let h_proposed = &logp_proposed.mapv(|lp| -lp) + &kinetic(&mom);

        let mut new_positions = self.positions.clone();
        let mut new_logp = logp_current;
        let mut new_grad = grad_current;
        let mut accept_prob_sum = 0.0;
        for chain in 0..n_chains {
            let log_ratio = h_current[chain] - h_proposed[chain];
            let p = if log_ratio.is_nan() {
                0.0
            } else {
                log_ratio.exp().min(1.0)
            };
            accept_prob_sum += p;

            let u: f64 = self.rng.gen();
            if log_ratio.is_finite() && u.ln() < log_ratio {
                new_positions.row_mut(chain).assign(&pos.row(chain));
                new_grad.row_mut(chain).assign(&grad_proposed.row(chain));
                new_logp[chain] = logp_proposed[chain];
            }
        }

        self.positions = new_positions;
        self.cache = Some((new_logp, new_grad));
        Ok(accept_prob_sum / n_chains.max(1) as f64)
    }

    /// A warm-up update: one [`HMC::step`], then a multiplicative step-size correction
    /// towards [`HMC::target_accept`].
    pub fn tune_step(&mut self) -> Result<f64> {
        let accept = self.step()?;
        self.step_size *= (ADAPT_RATE * (accept - self.target_accept)).exp();
        Ok(accept)
    }

    /// Runs `n_leapfrog` leapfrog steps, reusing the gradient at the end of each step.
    ///
    /// Returns the new positions, momenta, log densities and gradients.
    #[allow(clippy::type_complexity)]
    fn leapfrog(
        &self,
        mut pos: Array2<f64>,
        mut mom: Array2<f64>,
        mut grad: Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>, Array1<f64>, Array2<f64>)> {
        let half = 0.5 * self.step_size;
        let mut logp = Array1::zeros(pos.nrows());
        for _ in 0..self.n_leapfrog {
            mom.scaled_add(half, &grad);
            pos.scaled_add(self.step_size, &mom);
            let (lp, g) = self.logp_and_grad(&pos)?;
            logp = lp;
            grad = g;
            mom.scaled_add(half, &grad);
        }
        if self.n_leapfrog == 0 {
            logp = self.logp_and_grad(&pos)?.0;
        }
        Ok((pos, mom, logp, grad))
    }

    /// Runs `n_discard` warm-up updates, then collects `n_collect` updates.
    ///
    /// Returns draws of shape `[n_chains, n_collect, D]`.
    pub fn run(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<f64>> {
        for _ in 0..n_discard {
            self.tune_step()?;
        }
        let (n_chains, dim) = self.positions.dim();
        let mut out = Array3::<f64>::zeros((n_chains, n_collect, dim));
        for i in 0..n_collect {
            self.step()?;
            out.index_axis_mut(Axis(1), i).assign(&self.positions);
        }
        Ok(out)
    }

    /// Like [`HMC::run`], displaying a progress bar with the acceptance probability and the
    /// running maximum potential scale reduction factor, see [Stan Reference Manual.][1]
    ///
    /// [1]: https://mc-stan.org/docs/2_18/reference-manual/notation-for-samples-chains-and-draws.html
    pub fn run_progress(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<f64>> {
        let pb = ProgressBar::new((n_discard + n_collect) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .expect("Expecting the progress template to be valid.")
                .progress_chars("=>-"),
        );
        pb.set_prefix("HMC");

        for _ in 0..n_discard {
            let accept = self.tune_step()?;
            pb.set_message(format!("warm-up p(accept)≈{accept:.2} ε≈{:.3}", self.step_size));
            pb.inc(1);
        }

        let (n_chains, dim) = self.positions.dim();
        let mut out = Array3::<f64>::zeros((n_chains, n_collect, dim));
        let mut psr = RhatMulti::new(n_chains, dim);
        for i in 0..n_collect {
            let accept = self.step()?;
            out.index_axis_mut(Axis(1), i).assign(&self.positions);
            let flat: Vec<f64> = self.positions.iter().copied().collect();
            psr.step(&flat)?;
            if i > 0 {
                pb.set_message(format!(
                    "p(accept)≈{accept:.2} max(rhat)≈{:.2}",
                    psr.max()?
                ));
            }
            pb.inc(1);
        }
        pb.finish_with_message("Done!");
        Ok(out)
    }
}

/// `0.5 · Σ_d p²` for each row of `momentum`.
fn kinetic(momentum: &Array2<f64>) -> Array1<f64> {
    let mut ke = Array1::zeros(momentum.nrows());
    Zip::from(&mut ke)
        .and(momentum.rows())
        .for_each(|k, row| *k = 0.5 * row.dot(&row));
    ke
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type BackendType = Autodiff<NdArray>;

    /// Independent normals with the given means and unit variance.
    struct ShiftedNormal {
        mean: Vec<f32>,
    }

    impl<B: AutodiffBackend> GradientTarget<B> for ShiftedNormal {
        fn log_prob_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1> {
            let [n, d] = positions.dims();
            let mean = Tensor::<B, 2>::from_data(
                TensorData::new(self.mean.clone(), [1, d]).convert::<B::FloatElem>(),
                &positions.device(),
            );
            let ones = Tensor::<B, 2>::ones([n, 1], &positions.device());
            let centred = positions - ones.matmul(mean);
            centred.powf_scalar(2.0).sum_dim(1).mul_scalar(-0.5).squeeze(1)
        }
    }

    #[test]
    fn test_gradient_matches_analytic() {
        let target = ShiftedNormal {
            mean: vec![1.0, -1.0],
        };
        let sampler =
            HMC::<BackendType, _>::new(target, vec![vec![0.0, 0.0], vec![2.0, 1.0]], 0.1, 5)
                .unwrap();
        let (logp, grad) = sampler.logp_and_grad(sampler.positions()).unwrap();
        assert!((logp[0] + 1.0).abs() < 1e-5);
        assert!((logp[1] + 2.5).abs() < 1e-5);
        // d/dx log p = -(x - mean)
        let expected = [[1.0, -1.0], [-1.0, -2.0]];
        for c in 0..2 {
            for d in 0..2 {
                assert!((grad[[c, d]] - expected[c][d]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_run_shape_and_mean() {
        let target = ShiftedNormal {
            mean: vec![1.0, -1.0],
        };
        let mut sampler = HMC::<BackendType, _>::new(target, vec![vec![0.0, 0.0]; 4], 0.3, 8)
            .unwrap()
            .set_seed(42);
        let draws = sampler.run(400, 100).unwrap();
        assert_eq!(draws.shape(), &[4, 400, 2]);

        let flat = draws.into_shape_with_order((1600, 2)).unwrap();
        let mean = flat.mean_axis(Axis(0)).unwrap();
        assert!((mean[0] - 1.0).abs() < 0.2, "mean[0] = {}", mean[0]);
        assert!((mean[1] + 1.0).abs() < 0.2, "mean[1] = {}", mean[1]);
    }

    #[test]
    fn test_progress_run() {
        let target = ShiftedNormal { mean: vec![0.0] };
        let mut sampler = HMC::<BackendType, _>::new(target, vec![vec![0.5]; 2], 0.5, 4)
            .unwrap()
            .set_seed(1);
        let draws = sampler.run_progress(50, 10).unwrap();
        assert_eq!(draws.shape(), &[2, 50, 1]);
    }

    #[test]
    fn test_warmup_shrinks_huge_step() {
        let target = ShiftedNormal { mean: vec![0.0] };
        let mut sampler = HMC::<BackendType, _>::new(target, vec![vec![0.0]; 2], 50.0, 3)
            .unwrap()
            .set_seed(5);
        sampler.run(1, 50).unwrap();
        assert!(sampler.step_size < 50.0);
    }

    #[test]
    fn test_ragged_initial_positions() {
        let target = ShiftedNormal { mean: vec![0.0] };
        let result =
            HMC::<BackendType, _>::new(target, vec![vec![0.0], vec![0.0, 1.0]], 0.1, 1);
        assert!(matches!(result, Err(Error::Shape(_))));
    }
}
