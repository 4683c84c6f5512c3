/*!
# Metropolis–Hastings Sampler

The classical sampling engine. A generic Metropolis–Hastings sampler that works with any
target `D` and proposal `Q` implementing [`Target`] and [`Proposal`]. The sampler runs
multiple independent chains in parallel, all starting from the same state. A global seed is
used for reproducibility, and each chain gets `seed + i`.

With [`MetropolisHastings::adaptive`] enabled, warm-up steps retune the proposal scale every
[`TUNE_INTERVAL`] iterations from the observed acceptance rate; collected draws always use a
frozen scale.

## Example Usage

```rust
use mcmc_bench::core::ChainRunner;
use mcmc_bench::distributions::IsotropicGaussian;
use mcmc_bench::metropolis_hastings::MetropolisHastings;

let target = IsotropicGaussian::new(1.0);
let proposal = IsotropicGaussian::new(1.0);
let mut mh = MetropolisHastings::new(target, proposal, &[0.0, 0.0], 2).set_seed(42);

let draws = mh.run(100, 50).unwrap();
assert_eq!(draws.shape(), &[2, 100, 2]);
```
*/

use num_traits::Float;
use rand::prelude::*;
use std::marker::PhantomData;

use crate::core::{HasChains, MarkovChain};
use crate::distributions::{Proposal, Target};

/// Number of warm-up steps between proposal-scale updates.
pub const TUNE_INTERVAL: usize = 100;

/// The Metropolis–Hastings sampler: a set of independent [`MHMarkovChain`]s sharing one
/// target and proposal family.
#[derive(Debug, Clone)]
pub struct MetropolisHastings<T: Float, D: Clone, Q: Clone> {
    /// The target distribution we want to sample from.
    pub target: D,
    /// The proposal distribution used to generate candidate states.
    pub proposal: Q,
    /// The vector of independent Markov chains.
    pub chains: Vec<MHMarkovChain<T, D, Q>>,
    /// The global random seed.
    pub seed: u64,
}

/// A single Markov chain for the Metropolis–Hastings algorithm.
///
/// Each chain stores its own copy of the target and proposal, its current state, and a
/// chain-specific random number generator.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<T, D, Q> {
    pub target: D,
    pub proposal: Q,
    pub current_state: Vec<T>,
    pub seed: u64,
    pub rng: SmallRng,
    /// Whether warm-up steps retune the proposal scale.
    pub adaptive: bool,
    current_lp: Option<T>,
    tune_steps: usize,
    tune_accepted: usize,
    phantom: PhantomData<T>,
}

impl<T, D, Q> MetropolisHastings<T, D, Q>
where
    D: Target<T> + Clone + Send,
    Q: Proposal<T> + Clone + Send,
    T: Float + Send,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    /// Creates `n_chains` chains, all starting at `initial_state`.
    pub fn new(target: D, proposal: Q, initial_state: &[T], n_chains: usize) -> Self {
        let chains = (0..n_chains)
            .map(|_| MHMarkovChain::new(target.clone(), proposal.clone(), initial_state))
            .collect();
        let seed = thread_rng().gen::<u64>();

        Self {
            target,
            proposal,
            chains,
            seed,
        }
    }

    /// Sets a new global seed; chain `i` gets `seed + i` (wrapping) for both its accept/reject
    /// RNG and its proposal.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed.wrapping_add(i as u64);
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
            chain.proposal = chain.proposal.clone().set_seed(chain_seed);
        }
        self
    }

    /// Enables or disables proposal-scale tuning during warm-up for every chain.
    pub fn adaptive(mut self, adaptive: bool) -> Self {
        self.chains.iter_mut().for_each(|c| c.adaptive = adaptive);
        self
    }
}

impl<T, D, Q> HasChains<T> for MetropolisHastings<T, D, Q>
where
    D: Target<T> + Clone + Send,
    Q: Proposal<T> + Clone + Send,
    T: Float + Send,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    type Chain = MHMarkovChain<T, D, Q>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

impl<T, D, Q> MHMarkovChain<T, D, Q>
where
    D: Target<T> + Clone,
    Q: Proposal<T> + Clone,
    T: Float,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    pub fn new(target: D, proposal: Q, initial_state: &[T]) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            proposal,
            current_state: initial_state.to_vec(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
            adaptive: false,
            current_lp: None,
            tune_steps: 0,
            tune_accepted: 0,
            phantom: PhantomData,
        }
    }

    /// One Metropolis–Hastings update; returns whether the proposal was accepted.
    ///
    /// The acceptance ratio in log-space is
    /// `[log p(x') + log q(x | x')] - [log p(x) + log q(x' | x)]`.
    fn propose(&mut self) -> bool {
        let proposed = self.proposal.sample(&self.current_state);
        let current_lp = match self.current_lp {
            Some(lp) => lp,
            None => self.target.unnorm_log_prob(&self.current_state),
        };
        let proposed_lp = self.target.unnorm_log_prob(&proposed);
        let log_q_forward = self.proposal.log_prob(&self.current_state, &proposed);
        let log_q_backward = self.proposal.log_prob(&proposed, &self.current_state);
        let log_accept_ratio = (proposed_lp + log_q_backward) - (current_lp + log_q_forward);

        let u: T = self.rng.gen();
        if log_accept_ratio > u.ln() {
            self.current_state = proposed;
            self.current_lp = Some(proposed_lp);
            true
        } else {
            self.current_lp = Some(current_lp);
            false
        }
    }
}

/// Scale factor for the proposal given the acceptance rate of the last tuning window.
///
/// Shrinks aggressively when almost nothing is accepted and widens when almost everything is.
pub fn tune_factor(acceptance: f64) -> f64 {
    if acceptance < 0.001 {
        0.1
    } else if acceptance < 0.05 {
        0.5
    } else if acceptance < 0.2 {
        0.9
    } else if acceptance > 0.95 {
        10.0
    } else if acceptance > 0.75 {
        2.0
    } else if acceptance > 0.5 {
        1.1
    } else {
        1.0
    }
}

impl<T, D, Q> MarkovChain<T> for MHMarkovChain<T, D, Q>
where
    D: Target<T> + Clone,
    Q: Proposal<T> + Clone,
    T: Float,
    rand_distr::Standard: rand_distr::Distribution<T>,
{
    fn step(&mut self) -> &[T] {
        self.propose();
        &self.current_state
    }

    fn tune_step(&mut self) -> &[T] {
        let accepted = self.propose();
        if self.adaptive {
            self.tune_steps += 1;
            self.tune_accepted += accepted as usize;
            if self.tune_steps == TUNE_INTERVAL {
                let rate = self.tune_accepted as f64 / TUNE_INTERVAL as f64;
                self.proposal
                    .rescale(T::from(tune_factor(rate)).unwrap_or_else(T::one));
                self.tune_steps = 0;
                self.tune_accepted = 0;
            }
        }
        &self.current_state
    }

    fn current_state(&self) -> &[T] {
        &self.current_state
    }
}
