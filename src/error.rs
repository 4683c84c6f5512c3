//! Error type shared by every stage of the benchmark pipeline.

use thiserror::Error;

/// Errors raised while generating datasets, sampling, or persisting results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("malformed filter expression `{expr}`: {reason}")]
    Filter { expr: String, reason: String },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("cannot parse `{value}` in column `{column}`")]
    Parse { column: String, value: String },

    #[error("cannot resample an empty dataset to {0} rows")]
    EmptyDataset(usize),

    #[error("column `{column}` has {got} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("reference run `{0}` not found")]
    MissingReference(String),

    #[error("shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("sampler failed: {0}")]
    Sampler(String),

    #[error("plotting failed: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, Error>;
