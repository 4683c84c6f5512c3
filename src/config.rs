//! Benchmark configuration, loadable from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) runs the built-in
//! comparison:
//!
//! ```toml
//! [sampling]
//! draws = 1000
//! tune = 1000
//! chains = 4
//!
//! [data]
//! sizes = [100, 1000]
//! noise_columns = ["x"]
//!
//! [output]
//! dir = "results"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::models::ClassicalSampler;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BenchConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub samplers: SamplersConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Settings shared by every sampling run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingConfig {
    /// Kept draws per chain.
    #[serde(default = "default_draws")]
    pub draws: usize,
    /// Warm-up iterations per chain, discarded.
    #[serde(default = "default_tune")]
    pub tune: usize,
    #[serde(default = "default_chains")]
    pub chains: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Show progress bars while sampling.
    #[serde(default)]
    pub progress: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            draws: default_draws(),
            tune: default_tune(),
            chains: default_chains(),
            seed: default_seed(),
            progress: false,
        }
    }
}

fn default_draws() -> usize {
    1000
}
fn default_tune() -> usize {
    1000
}
fn default_chains() -> usize {
    4
}
fn default_seed() -> u64 {
    42
}

/// Where the source data comes from and which datasets are derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    /// CSV file with the source data. When absent, a synthetic linear dataset is generated.
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    /// Row counts to resample the source to.
    #[serde(default = "default_sizes")]
    pub sizes: Vec<usize>,
    /// Filter expressions; when non-empty they replace `sizes`.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Columns that receive noise on synthetic rows.
    #[serde(default)]
    pub noise_columns: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: None,
            synthetic: SyntheticConfig::default(),
            sizes: default_sizes(),
            filters: Vec::new(),
            noise_columns: Vec::new(),
        }
    }
}

fn default_sizes() -> Vec<usize> {
    vec![100, 1000]
}

impl DataConfig {
    /// Loads the configured CSV, or generates the synthetic source.
    pub fn source_dataset(&self, seed: u64) -> Result<Dataset> {
        match &self.source {
            Some(path) => Dataset::from_csv(path),
            None => Dataset::synthetic_linear(
                self.synthetic.rows,
                self.synthetic.intercept,
                self.synthetic.slope,
                self.synthetic.sigma,
                seed,
            ),
        }
    }
}

/// Parameters of `y = intercept + slope·x + N(0, sigma²)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticConfig {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_intercept")]
    pub intercept: f64,
    #[serde(default = "default_slope")]
    pub slope: f64,
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            intercept: default_intercept(),
            slope: default_slope(),
            sigma: default_sigma(),
        }
    }
}

fn default_rows() -> usize {
    200
}
fn default_intercept() -> f64 {
    1.0
}
fn default_slope() -> f64 {
    2.0
}
fn default_sigma() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplersConfig {
    /// Variants run for classical models, e.g. `["metropolis", "adaptive"]`.
    #[serde(default = "default_classical")]
    pub classical: Vec<ClassicalSampler>,
}

impl Default for SamplersConfig {
    fn default() -> Self {
        Self {
            classical: default_classical(),
        }
    }
}

fn default_classical() -> Vec<ClassicalSampler> {
    ClassicalSampler::ALL.to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticsConfig {
    /// Seed for picking the reference run.
    #[serde(default)]
    pub reference_seed: u64,
    #[serde(default = "default_rhat_threshold")]
    pub rhat_threshold: f64,
    /// Fraction of parameters that must agree with the reference for a run to pass.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            reference_seed: 0,
            rhat_threshold: default_rhat_threshold(),
            pass_threshold: default_pass_threshold(),
        }
    }
}

fn default_rhat_threshold() -> f64 {
    1.05
}
fn default_pass_threshold() -> f64 {
    0.95
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// PNG path for the ESS/s chart.
    #[serde(default)]
    pub plot: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            plot: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl BenchConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling.chains == 0 {
            return Err(Error::Config("sampling.chains must be at least 1".to_string()));
        }
        if self.sampling.draws == 0 {
            return Err(Error::Config("sampling.draws must be at least 1".to_string()));
        }
        if self.data.sizes.is_empty() && self.data.filters.is_empty() {
            return Err(Error::Config(
                "data needs at least one size or filter".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.sampling.chains, 4);
        assert_eq!(config.data.sizes, vec![100, 1000]);
        assert_eq!(config.diagnostics.rhat_threshold, 1.05);
        assert_eq!(config.samplers.classical.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [sampling]
            draws = 200
            progress = true

            [data]
            filters = ["x > 0.5"]

            [samplers]
            classical = ["adaptive"]
        "#;

        let config: BenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sampling.draws, 200);
        assert!(config.sampling.progress);
        assert_eq!(config.data.filters, vec!["x > 0.5".to_string()]);
        assert_eq!(config.samplers.classical, vec![ClassicalSampler::Adaptive]);
        // Defaults should still apply
        assert_eq!(config.sampling.tune, 1000);
        assert_eq!(config.output.dir, PathBuf::from("results"));
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[sampling]\nchains = 0").unwrap();
        assert!(matches!(BenchConfig::load(file.path()), Err(Error::Config(_))));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[sampling\n").unwrap();
        assert!(matches!(
            BenchConfig::load(file.path()),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_synthetic_source() {
        let data = DataConfig::default().source_dataset(1).unwrap();
        assert_eq!(data.len(), 200);
        assert!(data.column("y").is_ok());
    }
}
