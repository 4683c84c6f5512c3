/*!
Traits describing what the sampling engines need from a model, plus the isotropic Gaussian
used both as a random-walk proposal and as a simple test target.

- [`Target`]: an unnormalized log-density over a parameter vector. Classical models implement this.
- [`Proposal`]: a candidate generator for Metropolis–Hastings, with an optional scale knob
  that warm-up tuning can turn.
- [`GradientTarget`]: a batched log-density over a `[n_chains, D]` autodiff tensor. Kernel
  models implement this and get gradients for free from `burn`.

# Examples

```rust
use mcmc_bench::distributions::{IsotropicGaussian, Proposal, Target};

let mut proposal: IsotropicGaussian<f64> = IsotropicGaussian::new(1.0).set_seed(42);
let current = vec![0.0, 0.0];
let candidate = proposal.sample(&current);
assert_eq!(candidate.len(), 2);

let target: IsotropicGaussian<f64> = IsotropicGaussian::new(1.0);
assert_eq!(target.unnorm_log_prob(&[0.0, 0.0]), 0.0);
```
*/

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use num_traits::Float;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::sync::Arc;

/// A continuous target distribution we want to sample from.
pub trait Target<T: Float> {
    /// Returns the log of the unnormalized density at `theta`.
    fn unnorm_log_prob(&self, theta: &[T]) -> T;
}

impl<T: Float, D: Target<T> + ?Sized> Target<T> for Arc<D> {
    fn unnorm_log_prob(&self, theta: &[T]) -> T {
        (**self).unnorm_log_prob(theta)
    }
}

/// Generates proposals for Metropolis–Hastings.
pub trait Proposal<T: Float> {
    /// Samples a new point from q(x' | x).
    fn sample(&mut self, current: &[T]) -> Vec<T>;

    /// Evaluates log q(x' | x).
    fn log_prob(&self, from: &[T], to: &[T]) -> T;

    /// Returns this proposal seeded with `seed`.
    fn set_seed(self, seed: u64) -> Self;

    /// Multiplies the proposal's step scale by `factor`. Fixed-scale proposals ignore this.
    fn rescale(&mut self, _factor: T) {}
}

/// A batched, differentiable target: one log-density per row of `positions`.
///
/// Gradients are taken by `burn`'s autodiff, so implementors only write the forward pass.
pub trait GradientTarget<B: AutodiffBackend> {
    /// `positions` has shape `[n_chains, D]`; the result has shape `[n_chains]`.
    fn log_prob_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1>;
}

impl<B: AutodiffBackend, G: GradientTarget<B> + ?Sized> GradientTarget<B> for Box<G> {
    fn log_prob_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1> {
        (**self).log_prob_batch(positions)
    }
}

/**
An isotropic Gaussian: adds independent `N(0, std²)` noise to each coordinate when used as a
proposal, and evaluates the centred density when used as a target.
*/
#[derive(Debug, Clone)]
pub struct IsotropicGaussian<T: Float> {
    pub std: T,
    rng: SmallRng,
}

impl<T: Float> IsotropicGaussian<T> {
    /// Creates a new isotropic Gaussian with the given standard deviation.
    pub fn new(std: T) -> Self {
        Self {
            std,
            rng: SmallRng::from_entropy(),
        }
    }
}

impl<T: Float> Proposal<T> for IsotropicGaussian<T>
where
    rand_distr::StandardNormal: Distribution<T>,
{
    fn sample(&mut self, current: &[T]) -> Vec<T> {
        let normal = Normal::new(T::zero(), self.std)
            .expect("Expecting creation of normal distribution to succeed.");
        current
            .iter()
            .map(|&x| x + normal.sample(&mut self.rng))
            .collect()
    }

    fn log_prob(&self, from: &[T], to: &[T]) -> T {
        let two = T::from(2.0).unwrap();
        let var = self.std * self.std;
        let d = T::from(from.len()).unwrap();
        let sq: T = from
            .iter()
            .zip(to)
            .fold(T::zero(), |acc, (&f, &t)| acc + (t - f) * (t - f));
        -sq / (two * var) - d / two * (two * T::from(PI).unwrap() * var).ln()
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    fn rescale(&mut self, factor: T) {
        self.std = self.std * factor;
    }
}

impl<T: Float> Target<T> for IsotropicGaussian<T> {
    fn unnorm_log_prob(&self, theta: &[T]) -> T {
        let sum = theta.iter().fold(T::zero(), |acc, &x| acc + x * x);
        -T::from(0.5).unwrap() * sum / (self.std * self.std)
    }
}
