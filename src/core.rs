//! Chain plumbing shared by the classical sampler: the [`MarkovChain`] step trait and a
//! [`ChainRunner`] that drives every chain of a sampler in parallel, with optional progress bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use num_traits::Zero;
use rayon::prelude::*;

use crate::error::Result;

pub trait MarkovChain<T> {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> &[T];

    /// One warm-up iteration. Chains that adapt their tuning parameters override this.
    fn tune_step(&mut self) -> &[T] {
        self.step()
    }

    /// The current state without stepping.
    fn current_state(&self) -> &[T];
}

/// Runs `n_discard` warm-up steps, then collects `n_collect` states into a `[n_collect, D]` array.
pub fn run_chain<T, M>(chain: &mut M, n_collect: usize, n_discard: usize) -> Array2<T>
where
    M: MarkovChain<T>,
    T: Clone + Zero,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<T>::zeros((n_collect, dim));

    (0..n_discard).for_each(|_| {
        chain.tune_step();
    });
    for mut row in out.axis_iter_mut(Axis(0)) {
        let state = chain.step();
        row.iter_mut().zip(state).for_each(|(o, s)| *o = s.clone());
    }

    out
}

pub fn run_chain_with_progress<T, M>(
    chain: &mut M,
    n_collect: usize,
    n_discard: usize,
    pb: &ProgressBar,
) -> Array2<T>
where
    M: MarkovChain<T>,
    T: Clone + Zero,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<T>::zeros((n_collect, dim));

    pb.set_length((n_discard + n_collect) as u64);
    for _ in 0..n_discard {
        chain.tune_step();
        pb.inc(1);
    }
    for mut row in out.axis_iter_mut(Axis(0)) {
        let state = chain.step();
        row.iter_mut().zip(state).for_each(|(o, s)| *o = s.clone());
        pb.inc(1);
    }

    out
}

/// Anything that owns multiple [`MarkovChain`]s.
pub trait HasChains<T> {
    type Chain: MarkovChain<T> + Send;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

pub trait ChainRunner<T>: HasChains<T>
where
    T: Clone + Zero + Send + Sync + 'static,
{
    /// Runs all chains in parallel on the current rayon pool, discarding warm-up.
    ///
    /// Returns the draws with shape `[n_chains, n_collect, D]`.
    fn run(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<T>> {
        let results: Vec<Array2<T>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_collect, n_discard))
            .collect();
        stack_chains(&results)
    }

    /// Like [`ChainRunner::run`], with one progress bar per chain.
    fn run_progress(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<T>> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix:8} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("Expecting the progress template to be valid.")
            .progress_chars("=>-");

        let results: Vec<Array2<T>> = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new((n_discard + n_collect) as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());
                let sample = run_chain_with_progress(chain, n_collect, n_discard, &pb);
                pb.finish_with_message("Done!");
                sample
            })
            .collect();
        stack_chains(&results)
    }
}

impl<T, R> ChainRunner<T> for R
where
    T: Clone + Zero + Send + Sync + 'static,
    R: HasChains<T>,
{
}

fn stack_chains<T: Clone>(chains: &[Array2<T>]) -> Result<Array3<T>> {
    let views: Vec<ArrayView2<T>> = chains.iter().map(|c| c.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}
