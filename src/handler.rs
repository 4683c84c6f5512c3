/*!
Runs every model over every dataset and persists the outcome.

[`Handler::execute`] stores each run's posterior under `{library}_{sampler}_{size}`, writes it
to `<output>/<key>.csv`, upserts the run into the results table and finally writes
`<output>/results.csv`. Each call starts a fresh table and overwrites `results.csv`, so the
table only ever describes the runs it returned posteriors for.

[`run_benchmark`] is the whole pipeline: datasets from a [`BenchConfig`], execution,
diagnostics, ESS/s and the optional chart.
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{BenchConfig, SamplingConfig};
use crate::dataset::generate_datasets;
use crate::diagnostics::{dist_validator, rhat_validator, DistReport, RhatReport};
use crate::error::Result;
use crate::models::ModelKind;
use crate::plots::plot_ess_per_second;
use crate::posterior::Posterior;
use crate::results::{result_key, ResultsTable};
use crate::sampler::Sampler;

pub const RESULTS_FILE: &str = "results.csv";

pub struct Handler {
    sampler: Sampler,
    output_dir: PathBuf,
}

impl Handler {
    pub fn new(sampler: Sampler, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            sampler,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Samples every `(library, model)` pair and persists posteriors and results.
    pub fn execute(
        &self,
        models: &[(String, ModelKind)],
        sampling: &SamplingConfig,
    ) -> Result<(BTreeMap<String, Posterior>, ResultsTable)> {
        fs::create_dir_all(&self.output_dir)?;
        let mut results = ResultsTable::new();

        let mut posteriors = BTreeMap::new();
        for (library, model) in models {
            info!(library = %library, datasets = self.sampler.datasets().len(), "sampling model");
            for run in self.sampler.fit(model, sampling)? {
                let key = result_key(library, &run.sampler, run.size);
                run.posterior
                    .save_csv(self.output_dir.join(format!("{key}.csv")))?;
                results.upsert(library, &run.sampler, run.size, &run.metrics);
                posteriors.insert(key, run.posterior);
            }
        }

        results.save_csv(self.output_dir.join(RESULTS_FILE))?;
        Ok((posteriors, results))
    }
}

/// Everything a benchmark run produces.
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub posteriors: BTreeMap<String, Posterior>,
    pub results: ResultsTable,
    pub dist: DistReport,
    pub rhat: RhatReport,
}

/// Generates the datasets described by `config`, executes `models` on them, validates the
/// posteriors, adds ESS/s to the results and, if configured, draws the ESS/s chart.
pub fn run_benchmark(config: &BenchConfig, models: &[(String, ModelKind)]) -> Result<BenchReport> {
    config.validate()?;
    let source = config.data.source_dataset(config.sampling.seed)?;
    let datasets = generate_datasets(
        &source,
        &config.data.sizes,
        &config.data.filters,
        &config.data.noise_columns,
        config.sampling.seed,
    )?;
    info!(sizes = ?datasets.keys().collect::<Vec<_>>(), "datasets ready");

    let sampler = Sampler::new(datasets).with_classical_samplers(config.samplers.classical.clone());
    let handler = Handler::new(sampler, &config.output.dir);
    let (posteriors, mut results) = handler.execute(models, &config.sampling)?;

    let dist = dist_validator(&posteriors, config.diagnostics.reference_seed)?
        .with_pass_threshold(config.diagnostics.pass_threshold);
    let rhat = rhat_validator(&dist.summaries, config.diagnostics.rhat_threshold);

    results.add_ess_per_second(&dist.summaries);
    results.save_csv(handler.output_dir().join(RESULTS_FILE))?;

    if let Some(plot) = &config.output.plot {
        plot_ess_per_second(&results, plot)?;
    }

    Ok(BenchReport {
        posteriors,
        results,
        dist,
        rhat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::models::linear_regression_classical;
    use tempfile::tempdir;

    fn sampling() -> SamplingConfig {
        SamplingConfig {
            draws: 30,
            tune: 30,
            chains: 2,
            seed: 1,
            progress: false,
        }
    }

    #[test]
    fn test_execute_persists_runs() {
        let dir = tempdir().unwrap();
        let datasets: BTreeMap<usize, Dataset> =
            [(12, Dataset::synthetic_linear(12, 0.0, 1.0, 0.3, 4).unwrap())].into();
        let handler = Handler::new(Sampler::new(datasets), dir.path().join("out"));
        let models = vec![(
            "classical".to_string(),
            ModelKind::Classical(linear_regression_classical()),
        )];

        let (posteriors, results) = handler.execute(&models, &sampling()).unwrap();
        let keys: Vec<&String> = posteriors.keys().collect();
        assert_eq!(keys, vec!["classical_adaptive_12", "classical_metropolis_12"]);
        assert_eq!(results.len(), 2);

        let out = dir.path().join("out");
        assert!(out.join(RESULTS_FILE).exists());
        let loaded = Posterior::load_csv(out.join("classical_adaptive_12.csv")).unwrap();
        assert_eq!(&loaded, &posteriors["classical_adaptive_12"]);

        let (_, results) = handler.execute(&models, &sampling()).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_execute_replaces_previous_results() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let models = vec![(
            "classical".to_string(),
            ModelKind::Classical(linear_regression_classical()),
        )];
        let handler_for = |size: usize| {
            let datasets: BTreeMap<usize, Dataset> =
                [(size, Dataset::synthetic_linear(size, 0.0, 1.0, 0.3, 4).unwrap())].into();
            Handler::new(Sampler::new(datasets), &out)
        };

        handler_for(12).execute(&models, &sampling()).unwrap();
        let (posteriors, results) = handler_for(15).execute(&models, &sampling()).unwrap();

        let keys: Vec<&str> = results.rows().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["classical_metropolis_15", "classical_adaptive_15"]);
        assert!(keys.iter().all(|k| posteriors.contains_key(*k)));

        let saved = ResultsTable::load_csv(out.join(RESULTS_FILE)).unwrap();
        assert_eq!(saved, results);
    }
}
