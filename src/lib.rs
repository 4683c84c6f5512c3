pub mod alloc;
pub mod config;
pub mod core;
pub mod dataset;
pub mod diagnostics;
pub mod distributions;
pub mod error;
pub mod filter;
pub mod handler;
pub mod hmc;
pub mod metropolis_hastings;
pub mod models;
pub mod monitor;
pub mod plots;
pub mod posterior;
pub mod results;
pub mod sampler;
pub mod stats;

pub use error::{Error, Result};
