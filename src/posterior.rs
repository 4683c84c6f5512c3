/*!
# Posterior Draws

[`Posterior`] pairs a `[chain, draw, parameter]` array of draws with the parameter names, and
persists it as CSV.

The CSV file has a header row `chain,draw,<param_0>,<param_1>,…` and one row per draw of each
chain, chains in order.

```rust
use mcmc_bench::posterior::Posterior;
use ndarray::arr3;

let draws = arr3(&[[[1.0, 2.0], [3.0, 4.0]], [[10.0, 20.0], [30.0, 40.0]]]);
let posterior = Posterior::new(vec!["a".into(), "b".into()], draws).unwrap();
assert_eq!(posterior.n_chains(), 2);
assert_eq!(posterior.param(1).row(0).to_vec(), vec![2.0, 4.0]);
```
*/

use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Posterior {
    param_names: Vec<String>,
    draws: Array3<f64>,
}

impl Posterior {
    /// Wraps `draws` of shape `[n_chains, n_draws, n_params]`.
    ///
    /// # Errors
    ///
    /// Fails if the last axis does not match the number of names.
    pub fn new(param_names: Vec<String>, draws: Array3<f64>) -> Result<Self> {
        if draws.shape()[2] != param_names.len() {
            return Err(Error::ColumnLength {
                column: "parameters".to_string(),
                expected: param_names.len(),
                got: draws.shape()[2],
            });
        }
        Ok(Self { param_names, draws })
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn draws(&self) -> &Array3<f64> {
        &self.draws
    }

    pub fn n_chains(&self) -> usize {
        self.draws.shape()[0]
    }

    /// Draws of parameter `i` as `[n_chains, n_draws]`.
    pub fn param(&self, i: usize) -> ArrayView2<'_, f64> {
        self.draws.index_axis(Axis(2), i)
    }

    /// Draws of the parameter called `name`, if there is one.
    pub fn param_by_name(&self, name: &str) -> Option<ArrayView2<'_, f64>> {
        self.param_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.param(i))
    }

    /// Writes the draws as CSV, see the module docs for the layout.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = Writer::from_writer(File::create(path)?);

        let mut header: Vec<String> = vec!["chain".to_string(), "draw".to_string()];
        header.extend(self.param_names.iter().cloned());
        wtr.write_record(&header)?;

        for (chain_idx, chain) in self.draws.axis_iter(Axis(0)).enumerate() {
            for (draw_idx, draw) in chain.axis_iter(Axis(0)).enumerate() {
                let mut row = vec![chain_idx.to_string(), draw_idx.to_string()];
                row.extend(draw.iter().map(|v| v.to_string()));
                wtr.write_record(&row)?;
            }
        }

        wtr.flush()?;
        Ok(())
    }

    /// Reads draws written by [`Posterior::save_csv`].
    ///
    /// Every chain must have the same number of draws.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.len() < 2 || headers[0] != "chain" || headers[1] != "draw" {
            return Err(Error::Parse {
                column: "header".to_string(),
                value: headers.join(","),
            });
        }
        let param_names = headers[2..].to_vec();
        let n_params = param_names.len();

        let mut chains: Vec<Vec<f64>> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let chain: usize = record[0].trim().parse().map_err(|_| Error::Parse {
                column: "chain".to_string(),
                value: record[0].to_string(),
            })?;
            if chain >= chains.len() {
                chains.resize_with(chain + 1, Vec::new);
            }
            for (i, field) in record.iter().enumerate().skip(2) {
                let value = field.trim().parse::<f64>().map_err(|_| Error::Parse {
                    column: headers[i].clone(),
                    value: field.to_string(),
                })?;
                chains[chain].push(value);
            }
        }

        let n_chains = chains.len();
        let per_chain = chains.first().map_or(0, Vec::len);
        for (i, chain) in chains.iter().enumerate() {
            if chain.len() != per_chain {
                return Err(Error::ColumnLength {
                    column: format!("chain {i}"),
                    expected: per_chain / n_params.max(1),
                    got: chain.len() / n_params.max(1),
                });
            }
        }
        let n_draws = if n_params == 0 { 0 } else { per_chain / n_params };
        let flat: Vec<f64> = chains.into_iter().flatten().collect();
        let draws = Array3::from_shape_vec((n_chains, n_draws, n_params), flat)?;
        Self::new(param_names, draws)
    }

    /// All draws of all chains stacked into `[n_chains * n_draws, n_params]`.
    pub fn flattened(&self) -> Result<Array2<f64>> {
        let (c, d, p) = self.draws.dim();
        Ok(self
            .draws
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((c * d, p))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr3;
    use std::fs;
    use tempfile::NamedTempFile;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_checks_param_count() {
        let draws = Array3::<f64>::zeros((1, 3, 2));
        assert!(Posterior::new(names(&["a"]), draws).is_err());
    }

    #[test]
    fn test_save_csv_multi_chain() {
        let draws = arr3(&[[[1.0, 2.0], [3.0, 4.0]], [[10.0, 20.0], [30.0, 40.0]]]);
        let posterior = Posterior::new(names(&["alpha", "beta"]), draws).unwrap();
        let file = NamedTempFile::new().expect("Could not create temp file");

        posterior.save_csv(file.path()).unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        let expected = "\
chain,draw,alpha,beta
0,0,1,2
0,1,3,4
1,0,10,20
1,1,30,40";
        assert_eq!(contents.trim(), expected);
    }

    #[test]
    fn test_load_csv_reads_back() {
        let draws = arr3(&[[[0.5], [1.25], [-2.0]], [[3.0], [4.5], [5.0]]]);
        let posterior = Posterior::new(names(&["mu"]), draws).unwrap();
        let file = NamedTempFile::new().expect("Could not create temp file");
        posterior.save_csv(file.path()).unwrap();

        let loaded = Posterior::load_csv(file.path()).unwrap();
        assert_eq!(loaded, posterior);
    }

    #[test]
    fn test_load_csv_rejects_uneven_chains() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        fs::write(file.path(), "chain,draw,mu\n0,0,1\n0,1,2\n1,0,3\n").unwrap();
        assert!(matches!(
            Posterior::load_csv(file.path()),
            Err(Error::ColumnLength { .. })
        ));
    }

    #[test]
    fn test_load_csv_rejects_bad_header() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        fs::write(file.path(), "x,y\n1,2\n").unwrap();
        assert!(matches!(
            Posterior::load_csv(file.path()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_param_views() {
        let draws = arr3(&[[[1.0, 2.0], [3.0, 4.0]]]);
        let posterior = Posterior::new(names(&["a", "b"]), draws).unwrap();
        assert_eq!(posterior.param_by_name("b").unwrap().row(0).to_vec(), vec![2.0, 4.0]);
        assert!(posterior.param_by_name("c").is_none());
        assert_eq!(posterior.flattened().unwrap().shape(), &[2, 2]);
    }
}
