/*!
Convergence and efficiency statistics for MCMC draws.

All post-hoc statistics take draws for one parameter as a `[n_chains, n_draws]` view and follow
the split-chain conventions of ArviZ:

- [`split_rhat`]: potential scale reduction over split chains.
- [`ess_mean`]: effective sample size of the mean, from FFT autocovariances and Geyer's initial
  monotone sequence.
- [`ess_tail`]: minimum of the effective sample sizes of the 5% and 95% quantile indicators.
- [`mcse_mean`]: Monte Carlo standard error of the mean.

[`RhatMulti`] is the online variant used by progress bars while sampling.

# Examples

```rust
use mcmc_bench::stats::{ess_mean, split_rhat};
use ndarray::array;

let draws = array![
    [0.1, -0.3, 0.7, 0.2, -0.5, 0.4, -0.1, 0.3],
    [0.0, 0.6, -0.2, -0.4, 0.3, 0.1, 0.5, -0.6]
];
let rhat = split_rhat(draws.view());
let ess = ess_mean(draws.view());
assert!(rhat.is_finite());
assert!(ess > 0.0);
```
*/

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use num_traits::{Num, ToPrimitive};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{Error, Result};
use crate::posterior::Posterior;

/// Fewest draws per chain for which split statistics are defined.
pub const MIN_DRAWS: usize = 4;

/// Online, per-parameter R-hat over a fixed set of chains. Feed it one `[n_chains, n_params]`
/// state per iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RhatMulti {
    n: usize,
    mean: Array2<f64>,    // n_chains x n_params
    mean_sq: Array2<f64>, // n_chains x n_params
    n_chains: usize,
    n_params: usize,
}

impl RhatMulti {
    pub fn new(n_chains: usize, n_params: usize) -> Self {
        let mean_sq = Array2::<f64>::zeros((n_chains, n_params));
        Self {
            n: 0,
            mean: Array2::<f64>::zeros((n_chains, n_params)),
            mean_sq,
            n_chains,
            n_params,
        }
    }

    pub fn step<T>(&mut self, x: &[T]) -> Result<()>
    where
        T: Num + ToPrimitive + Clone,
    {
        self.n += 1;

        let n = self.n as f64;
        let x_arr = ArrayView2::<T>::from_shape((self.n_chains, self.n_params), x)?
            .mapv(|x| x.to_f64().unwrap_or(f64::NAN));

        self.mean = (self.mean.clone() * (n - 1.0) + x_arr.clone()) / n;
        if self.n == 1 {
            self.mean_sq = x_arr.pow2();
        } else {
            self.mean_sq = (self.mean_sq.clone() * (n - 1.0) + (x_arr.pow2())) / n;
        };
        Ok(())
    }

    pub fn all(&self) -> Result<Array1<f64>> {
        let mean_chain = self
            .mean
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::Sampler("R-hat needs at least one chain".to_string()))?;
        let n_chains = self.mean.shape()[0] as f64;
        let n = self.n as f64;
        let fac = n / (n_chains - 1.0);
        let between = (self.mean.clone() - mean_chain.insert_axis(Axis(0)))
            .pow2()
            .sum_axis(Axis(0))
            * fac;
        let sm2 = (self.mean_sq.clone() - self.mean.pow2()) * n / (n - 1.0);
        let within = sm2
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::Sampler("R-hat needs at least one chain".to_string()))?;
        let var = within.clone() * ((n - 1.0) / n) + between * (1.0 / n);
        let rhat = (var / within).sqrt();
        Ok(rhat)
    }

    /// Largest R-hat across parameters, ignoring undefined ones.
    pub fn max(&self) -> Result<f64> {
        let all: Array1<f64> = self.all()?;
        Ok(*all.max_skipnan())
    }
}

/// Splits each chain into its first and last halves, dropping the middle draw of odd lengths.
pub fn split_chains(draws: ArrayView2<f64>) -> Array2<f64> {
    let (n_chains, n_draws) = draws.dim();
    let half = n_draws / 2;
    let mut out = Array2::zeros((2 * n_chains, half));
    for (c, chain) in draws.outer_iter().enumerate() {
        out.row_mut(2 * c)
            .assign(&chain.slice(s![..half]));
        out.row_mut(2 * c + 1)
            .assign(&chain.slice(s![n_draws - half..]));
    }
    out
}

/// Biased autocovariance of `x` at lags `0..x.len()`, computed via FFT.
pub fn autocov(x: ArrayView1<f64>) -> Array1<f64> {
    let n = x.len();
    if n == 0 {
        return Array1::zeros(0);
    }
    let mean = x.sum() / n as f64;
    let fft_len = (2 * n).next_power_of_two();

    let mut buffer: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex::new(v - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(fft_len).process(&mut buffer);
    buffer.iter_mut().for_each(|z| *z = Complex::new(z.norm_sqr(), 0.0));
    planner.plan_fft_inverse(fft_len).process(&mut buffer);

    buffer
        .iter()
        .take(n)
        .map(|z| z.re / fft_len as f64 / n as f64)
        .collect()
}

fn chain_means(draws: ArrayView2<f64>) -> Array1<f64> {
    draws.outer_iter().map(|c| c.mean().unwrap_or(0.0)).collect()
}

fn is_constant(draws: ArrayView2<f64>) -> bool {
    let min = draws.iter().copied().fold(f64::INFINITY, f64::min);
    let max = draws.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max - min < 1e-15
}

/// Effective sample size of `[n_chains, n_draws]` draws, treating each row as a chain.
fn ess_raw(draws: ArrayView2<f64>) -> f64 {
    let (n_chains, n_draws) = draws.dim();
    if n_chains == 0 || n_draws < MIN_DRAWS || draws.iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    if is_constant(draws) {
        return (n_chains * n_draws) as f64;
    }

    let acov: Vec<Array1<f64>> = draws.outer_iter().map(autocov).collect();
    let mean_acov = |lag: usize| acov.iter().map(|a| a[lag]).sum::<f64>() / n_chains as f64;
    let nd = n_draws as f64;

    let mean_var = mean_acov(0) * nd / (nd - 1.0);
    let mut var_plus = mean_var * (nd - 1.0) / nd;
    if n_chains > 1 {
        var_plus += chain_means(draws).var(1.0);
    }

    let mut rho_hat = vec![0.0; n_draws];
    let mut rho_even = 1.0;
    let mut rho_odd = 1.0 - (mean_var - mean_acov(1)) / var_plus;
    rho_hat[0] = rho_even;
    rho_hat[1] = rho_odd;

    // Geyer's initial positive sequence
    let mut t = 1;
    while t + 3 < n_draws && rho_even + rho_odd > 0.0 {
        rho_even = 1.0 - (mean_var - mean_acov(t + 1)) / var_plus;
        rho_odd = 1.0 - (mean_var - mean_acov(t + 2)) / var_plus;
        if rho_even + rho_odd >= 0.0 {
            rho_hat[t + 1] = rho_even;
            rho_hat[t + 2] = rho_odd;
        }
        t += 2;
    }
    let max_t = t as isize - 2;
    if rho_even > 0.0 {
        rho_hat[(max_t + 1) as usize] = rho_even;
    }

    // Geyer's initial monotone sequence
    let mut t = 1;
    while (t as isize) <= max_t - 2 {
        if rho_hat[t + 1] + rho_hat[t + 2] > rho_hat[t - 1] + rho_hat[t] {
            rho_hat[t + 1] = (rho_hat[t - 1] + rho_hat[t]) / 2.0;
            rho_hat[t + 2] = rho_hat[t + 1];
        }
        t += 2;
    }

    let ess = (n_chains * n_draws) as f64;
    let head = (max_t + 1) as usize;
    let tau_hat = -1.0 + 2.0 * rho_hat[..head].iter().sum::<f64>() + rho_hat[head];
    let tau_hat = tau_hat.max(1.0 / ess.log10());
    if rho_hat.iter().any(|r| r.is_nan()) {
        return f64::NAN;
    }
    ess / tau_hat
}

/// Split-chain effective sample size of the mean.
pub fn ess_mean(draws: ArrayView2<f64>) -> f64 {
    ess_raw(split_chains(draws).view())
}

/// Split-chain effective sample size of the tails: the smaller of the ESS of `x ≤ q₀.₀₅` and
/// `x ≤ q₀.₉₅`.
pub fn ess_tail(draws: ArrayView2<f64>) -> f64 {
    if draws.is_empty() || draws.iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    let all: Vec<f64> = draws.iter().copied().collect();
    let indicator = |q: f64| {
        let cut = quantile(&all, q);
        draws.mapv(|x| if x <= cut { 1.0 } else { 0.0 })
    };
    let lower = ess_mean(indicator(0.05).view());
    let upper = ess_mean(indicator(0.95).view());
    lower.min(upper)
}

/// Split R-hat: `sqrt(((n-1)/n · W + B/n) / W)` over split chains.
///
/// Identical constant chains give exactly 1.0; fewer than [`MIN_DRAWS`] draws give NaN.
pub fn split_rhat(draws: ArrayView2<f64>) -> f64 {
    let (n_chains, n_draws) = draws.dim();
    if n_chains == 0 || n_draws < MIN_DRAWS || draws.iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    if is_constant(draws) {
        return 1.0;
    }
    let split = split_chains(draws);
    let n = split.ncols() as f64;
    let between = n * chain_means(split.view()).var(1.0);
    let within = split
        .outer_iter()
        .map(|c| c.var(1.0))
        .sum::<f64>()
        / split.nrows() as f64;
    ((between / within + n - 1.0) / n).sqrt()
}

/// Sample standard deviation over all draws (`ddof = 1`); NaN for fewer than two draws.
pub fn sd(draws: ArrayView2<f64>) -> f64 {
    if draws.len() < 2 {
        return f64::NAN;
    }
    draws.std(1.0)
}

/// Monte Carlo standard error of the mean: `sd / sqrt(ess_mean)`, or 0 for constant draws.
pub fn mcse_mean(draws: ArrayView2<f64>) -> f64 {
    let sd = sd(draws);
    if sd == 0.0 {
        return 0.0;
    }
    sd / ess_mean(draws).sqrt()
}

/// Linear-interpolation quantile of unsorted values.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// One row of a posterior summary table.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub mcse_mean: f64,
    pub ess_mean: f64,
    pub ess_tail: f64,
    pub r_hat: f64,
}

/// Summary statistics for every parameter of `posterior`, in parameter order.
pub fn summarize(posterior: &Posterior) -> Vec<Summary> {
    posterior
        .param_names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let draws = posterior.param(i);
            Summary {
                name: name.clone(),
                mean: draws.mean().unwrap_or(f64::NAN),
                sd: sd(draws),
                mcse_mean: mcse_mean(draws),
                ess_mean: ess_mean(draws),
                ess_tail: ess_tail(draws),
                r_hat: split_rhat(draws),
            }
        })
        .collect()
}
