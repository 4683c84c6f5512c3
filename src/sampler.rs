/*!
The sampler dispatcher: runs one model over every dataset, with the engine chosen by the
model's [`ModelKind`].

- [`ModelKind::Classical`]: the model is built once per dataset, then every configured
  [`ClassicalSampler`] variant runs Metropolis–Hastings on it. Chains run on a rayon pool of
  `min(available CPUs, chains)` threads.
- [`ModelKind::Kernel`]: the model's arguments are bound to dataset columns and all chains run
  together in the batched HMC engine. The sampler name is always [`KERNEL_SAMPLER`].

Every run is wrapped in [`monitor`], so each [`SampleResult`] carries its [`PerfMetrics`].
*/

use rayon::ThreadPoolBuilder;
use std::collections::BTreeMap;
use std::thread::available_parallelism;
use tracing::{info, warn};

use crate::config::SamplingConfig;
use crate::core::ChainRunner;
use crate::dataset::Dataset;
use crate::distributions::IsotropicGaussian;
use crate::error::{Error, Result};
use crate::hmc::HMC;
use crate::metropolis_hastings::MetropolisHastings;
use crate::models::{ClassicalModel, ClassicalSampler, KernelBackend, KernelModel, ModelKind};
use crate::monitor::{monitor, PerfMetrics};
use crate::posterior::Posterior;

/// Sampler name reported for kernel runs.
pub const KERNEL_SAMPLER: &str = "default";

/// One sampling run of one sampler on one dataset.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub sampler: String,
    /// Row count of the dataset, which is also its key.
    pub size: usize,
    pub posterior: Posterior,
    pub metrics: PerfMetrics,
}

pub struct Sampler {
    datasets: BTreeMap<usize, Dataset>,
    classical_samplers: Vec<ClassicalSampler>,
}

impl Sampler {
    pub fn new(datasets: BTreeMap<usize, Dataset>) -> Self {
        Self {
            datasets,
            classical_samplers: ClassicalSampler::ALL.to_vec(),
        }
    }

    /// Sets the variants run for classical models.
    pub fn with_classical_samplers(mut self, samplers: Vec<ClassicalSampler>) -> Self {
        self.classical_samplers = samplers;
        self
    }

    pub fn datasets(&self) -> &BTreeMap<usize, Dataset> {
        &self.datasets
    }

    /// Samples `model` on every dataset, in ascending size order.
    pub fn fit(&self, model: &ModelKind, sampling: &SamplingConfig) -> Result<Vec<SampleResult>> {
        match model {
            ModelKind::Classical(m) => self.fit_classical(m, sampling),
            ModelKind::Kernel(m) => self.fit_kernel(m, sampling),
        }
    }

    fn fit_classical(
        &self,
        model: &ClassicalModel,
        sampling: &SamplingConfig,
    ) -> Result<Vec<SampleResult>> {
        let threads = available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(sampling.chains)
            .max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Sampler(format!("building thread pool failed: {e}")))?;

        let mut results = Vec::new();
        for (&size, data) in &self.datasets {
            let target = model.build(data)?;
            for &variant in &self.classical_samplers {
                let proposal = IsotropicGaussian::new(model.proposal_scale);
                let mut mh = MetropolisHastings::new(
                    target.clone(),
                    proposal,
                    &model.initial_state,
                    sampling.chains,
                )
                .set_seed(sampling.seed)
                .adaptive(variant == ClassicalSampler::Adaptive);

                let (draws, metrics) = monitor(|| {
                    pool.install(|| {
                        if sampling.progress {
                            mh.run_progress(sampling.draws, sampling.tune)
                        } else {
                            mh.run(sampling.draws, sampling.tune)
                        }
                    })
                });
                let draws = finished(variant.name(), size, draws, &metrics)?;
                results.push(SampleResult {
                    sampler: variant.name().to_string(),
                    size,
                    posterior: Posterior::new(model.param_names.clone(), draws)?,
                    metrics,
                });
            }
        }
        Ok(results)
    }

    fn fit_kernel(&self, model: &KernelModel, sampling: &SamplingConfig) -> Result<Vec<SampleResult>> {
        let mut results = Vec::new();
        for (&size, data) in &self.datasets {
            let args = model.bind(data)?;
            let target = model.build(&args)?;
            let init = vec![model.initial_state.clone(); sampling.chains];
            let mut hmc = HMC::<KernelBackend, _>::new(target, init, model.step_size, model.n_leapfrog)?
                .set_seed(sampling.seed);

            let (draws, metrics) = monitor(|| {
                if sampling.progress {
                    hmc.run_progress(sampling.draws, sampling.tune)
                } else {
                    hmc.run(sampling.draws, sampling.tune)
                }
            });
            let draws = finished(KERNEL_SAMPLER, size, draws, &metrics)?;
            results.push(SampleResult {
                sampler: KERNEL_SAMPLER.to_string(),
                size,
                posterior: Posterior::new(model.param_names.clone(), draws)?,
                metrics,
            });
        }
        Ok(results)
    }
}

/// Logs the outcome of a monitored run and passes its result through.
fn finished<T>(sampler: &str, size: usize, result: Result<T>, metrics: &PerfMetrics) -> Result<T> {
    match &result {
        Ok(_) => info!(
            sampler,
            size,
            elapsed = metrics.elapsed_time,
            peak_bytes = metrics.peak_memory,
            "sampling finished"
        ),
        Err(e) => warn!(
            sampler,
            size,
            elapsed = metrics.elapsed_time,
            peak_bytes = metrics.peak_memory,
            error = %e,
            "sampling failed"
        ),
    }
    result
}
