/*!
# Datasets of Varying Size

A [`Dataset`] is a small column-oriented table of `f64` columns, each row tagged as
*original* (taken from the source data) or *synthetic* (produced by resampling).

The benchmark needs the same data at several scales, so this module provides:

- [`Dataset::resample`]: shrink by random subset, or grow by replicating the whole table
  and topping up with a random sample. Appended rows are flagged non-original.
- [`Dataset::apply_noise`]: jitter selected columns of the synthetic rows with
  `N(0, 0.05 · sd)` noise so that replicated rows are not exact duplicates.
- [`generate_datasets`]: the two entry points above driven by a list of sizes or filters.

## Example

```rust
use mcmc_bench::dataset::Dataset;
use rand::{rngs::SmallRng, SeedableRng};

let data = Dataset::new(vec![
    ("x".to_string(), vec![1.0, 2.0, 3.0]),
    ("y".to_string(), vec![2.0, 4.0, 6.0]),
])
.unwrap();

let mut rng = SmallRng::seed_from_u64(42);
let bigger = data.resample(7, &mut rng).unwrap();
assert_eq!(bigger.len(), 7);
assert_eq!(&bigger.original()[..3], &[true, true, true]);
assert!(bigger.original()[3..].iter().all(|&o| !o));
```
*/

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::ArrayView1;
use rand::rngs::SmallRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};
use crate::filter::Filter;

/// Name of the flag column written to and read from CSV files.
pub const ORIGINAL_COLUMN: &str = "original";

/// Fraction of a column's standard deviation used as the noise scale.
pub const NOISE_FRACTION: f64 = 0.05;

/// A table of named `f64` columns with a per-row original/synthetic flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    original: Vec<bool>,
}

impl Dataset {
    /// Builds a dataset from `(name, values)` pairs. All rows are flagged original.
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, |(_, v)| v.len());
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (name, col) in columns {
            if col.len() != n_rows {
                return Err(Error::ColumnLength {
                    column: name,
                    expected: n_rows,
                    got: col.len(),
                });
            }
            names.push(name);
            values.push(col);
        }
        Ok(Self {
            names,
            columns: values,
            original: vec![true; n_rows],
        })
    }

    /// Draws `n` rows of `y = intercept + slope · x + ε` with `x ~ N(0, 1)` and `ε ~ N(0, sigma)`.
    pub fn synthetic_linear(
        n: usize,
        intercept: f64,
        slope: f64,
        sigma: f64,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, sigma)
            .map_err(|e| Error::Config(format!("invalid noise scale {sigma}: {e}")))?;
        let x: Vec<f64> = (0..n).map(|_| rng.sample(rand_distr::StandardNormal)).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| intercept + slope * xi + noise.sample(&mut rng))
            .collect();
        Ok(Self {
            names: vec!["x".to_string(), "y".to_string()],
            columns: vec![x, y],
            original: vec![true; n],
        })
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Returns the values of the named column.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.column_index(name).map(|i| self.columns[i].as_slice())
    }

    /// The per-row original flags; `false` marks rows produced by resampling.
    pub fn original(&self) -> &[bool] {
        &self.original
    }

    /// Returns row `i` as a vector of column values, in column order.
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[i]).collect()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    fn take_rows(&self, rows: &[usize], original: Option<bool>) -> Self {
        Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| rows.iter().map(|&r| c[r]).collect())
                .collect(),
            original: rows
                .iter()
                .map(|&r| original.unwrap_or(self.original[r]))
                .collect(),
        }
    }

    fn append(&mut self, other: Self) {
        for (col, extra) in self.columns.iter_mut().zip(other.columns) {
            col.extend(extra);
        }
        self.original.extend(other.original);
    }

    /// Keeps only the rows matching every clause of `filter`.
    pub fn filter(&self, filter: &Filter) -> Result<Self> {
        let mut checks = Vec::with_capacity(filter.clauses().len());
        for clause in filter.clauses() {
            checks.push((self.column(&clause.column)?, clause));
        }
        let rows: Vec<usize> = (0..self.len())
            .filter(|&r| checks.iter().all(|(col, clause)| clause.matches(col[r])))
            .collect();
        Ok(self.take_rows(&rows, None))
    }

    /**
    Returns a dataset with exactly `size` rows.

    All source rows are first flagged as original. Then:

    - `size == len`: the data is returned as is.
    - `size < len`: a random subset of `size` rows (without replacement).
    - `size > len`: the source rows, followed by `size / len - 1` full copies and a random
      top-up sample of `size % len` rows. Every appended row is flagged non-original.

    # Errors

    Returns [`Error::EmptyDataset`] when growing an empty table.
    */
    pub fn resample<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Result<Self> {
        let mut data = self.clone();
        data.original.iter_mut().for_each(|o| *o = true);
        let len = data.len();

        if len == size {
            return Ok(data);
        }
        if len > size {
            let rows = index::sample(rng, len, size).into_vec();
            return Ok(data.take_rows(&rows, None));
        }
        if len == 0 {
            return Err(Error::EmptyDataset(size));
        }

        let copies = size / len;
        let all_rows: Vec<usize> = (0..len).collect();
        for _ in 1..copies {
            let copy = data.take_rows(&all_rows, Some(false));
            data.append(copy);
        }
        let top_up = index::sample(rng, len, size - copies * len).into_vec();
        let extra = self.take_rows(&top_up, Some(false));
        data.append(extra);

        Ok(data)
    }

    /**
    Adds Gaussian noise to the non-original rows of each named column.

    The noise scale of a column is [`NOISE_FRACTION`] times the sample standard deviation
    (`ddof = 1`) of that column over the non-original rows. Original rows are never touched.
    With fewer than two synthetic rows there is no spread to scale by, and the column is
    left unchanged.
    */
    pub fn apply_noise<R: Rng + ?Sized>(&mut self, columns: &[String], rng: &mut R) -> Result<()> {
        let synthetic: Vec<usize> = (0..self.len()).filter(|&r| !self.original[r]).collect();
        for name in columns {
            let idx = self.column_index(name)?;
            let values: Vec<f64> = synthetic.iter().map(|&r| self.columns[idx][r]).collect();
            let sigma = NOISE_FRACTION * sample_std(&values);
            if sigma == 0.0 || !sigma.is_finite() {
                tracing::debug!(column = %name, "no spread among synthetic rows, skipping noise");
                continue;
            }
            let normal = Normal::new(0.0, sigma)
                .map_err(|e| Error::Config(format!("invalid noise scale for `{name}`: {e}")))?;
            for &r in &synthetic {
                self.columns[idx][r] += normal.sample(rng);
            }
        }
        Ok(())
    }

    /// Reads a dataset from a CSV file with a header row. An `original` column, if present,
    /// becomes the row flags; every other column must be numeric.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let flag_idx = headers.iter().position(|h| h == ORIGINAL_COLUMN);

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
        let mut original = Vec::new();
        for record in rdr.records() {
            let record = record?;
            for (i, field) in record.iter().enumerate() {
                if Some(i) == flag_idx {
                    original.push(parse_flag(field)?);
                    continue;
                }
                let value = field.trim().parse::<f64>().map_err(|_| Error::Parse {
                    column: headers[i].clone(),
                    value: field.to_string(),
                })?;
                columns[i].push(value);
            }
            if flag_idx.is_none() {
                original.push(true);
            }
        }

        let (names, columns): (Vec<String>, Vec<Vec<f64>>) = headers
            .into_iter()
            .zip(columns)
            .enumerate()
            .filter(|(i, _)| Some(*i) != flag_idx)
            .map(|(_, pair)| pair)
            .unzip();
        Ok(Self {
            names,
            columns,
            original,
        })
    }

    /// Writes the dataset as CSV, with the flag column last.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        let mut header = self.names.clone();
        header.push(ORIGINAL_COLUMN.to_string());
        wtr.write_record(&header)?;
        for r in 0..self.len() {
            let mut row: Vec<String> = self.columns.iter().map(|c| c[r].to_string()).collect();
            row.push(self.original[r].to_string());
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn parse_flag(field: &str) -> Result<bool> {
    match field.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(Error::Parse {
            column: ORIGINAL_COLUMN.to_string(),
            value: other.to_string(),
        }),
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    ArrayView1::from(values).std(1.0)
}

/**
Generates the datasets the benchmark runs on, keyed by row count.

- With `filters`, each expression selects a subset of `data`; later subsets with the same
  row count replace earlier ones.
- Otherwise, `data` is resampled to each entry of `sizes`.

If `noise_columns` is non-empty, [`Dataset::apply_noise`] is applied to every result.

# Errors

Fails on malformed filters, unknown columns, or when neither sizes nor filters are given.
*/
pub fn generate_datasets(
    data: &Dataset,
    sizes: &[usize],
    filters: &[String],
    noise_columns: &[String],
    seed: u64,
) -> Result<BTreeMap<usize, Dataset>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut datasets = BTreeMap::new();

    if !filters.is_empty() {
        for expr in filters {
            let filter = Filter::parse(expr)?;
            let subset = data.filter(&filter)?;
            tracing::debug!(filter = %filter.source(), rows = subset.len(), "filtered dataset");
            datasets.insert(subset.len(), subset);
        }
    } else if !sizes.is_empty() {
        for &size in sizes {
            datasets.insert(size, data.resample(size, &mut rng)?);
        }
    } else {
        return Err(Error::Config(
            "either dataset sizes or filters must be given".to_string(),
        ));
    }

    if !noise_columns.is_empty() {
        for d in datasets.values_mut() {
            d.apply_noise(noise_columns, &mut rng)?;
        }
    }

    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn small() -> Dataset {
        Dataset::new(vec![
            ("x".to_string(), vec![0.0, 1.0, 2.0, 3.0]),
            ("y".to_string(), vec![10.0, 11.0, 12.0, 13.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let result = Dataset::new(vec![
            ("x".to_string(), vec![0.0, 1.0]),
            ("y".to_string(), vec![0.0]),
        ]);
        assert!(matches!(result, Err(Error::ColumnLength { .. })));
    }

    #[test]
    fn test_resample_same_size_is_unchanged() {
        let data = small();
        let mut rng = SmallRng::seed_from_u64(1);
        let out = data.resample(4, &mut rng).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out, data);
        assert!(out.original().iter().all(|&o| o));
    }

    #[test]
    fn test_resample_marks_every_source_row_original() {
        let mut data = small();
        data.original = vec![false; 4];
        let mut rng = SmallRng::seed_from_u64(1);
        let out = data.resample(4, &mut rng).unwrap();
        assert!(out.original().iter().all(|&o| o));
    }

    #[test]
    fn test_resample_down_is_subset() {
        let data = small();
        let mut rng = SmallRng::seed_from_u64(7);
        let out = data.resample(3, &mut rng).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.original().iter().all(|&o| o));
        let mut xs: Vec<f64> = out.column("x").unwrap().to_vec();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        xs.dedup();
        assert_eq!(xs.len(), 3, "Expected rows drawn without replacement");
        for r in 0..out.len() {
            let row = out.row(r);
            assert_eq!(row[1], row[0] + 10.0, "Row {r} was not kept intact");
        }
    }

    #[test]
    fn test_resample_up_preserves_originals() {
        let data = small();
        let mut rng = SmallRng::seed_from_u64(3);
        for size in [5, 8, 11, 100] {
            let out = data.resample(size, &mut rng).unwrap();
            assert_eq!(out.len(), size);
            for r in 0..data.len() {
                assert_eq!(out.row(r), data.row(r));
                assert!(out.original()[r]);
            }
            assert!(out.original()[data.len()..].iter().all(|&o| !o));
            assert_eq!(
                out.original().iter().filter(|&&o| o).count(),
                data.len(),
                "Expected exactly the source rows to be original"
            );
        }
    }

    #[test]
    fn test_resample_empty_fails() {
        let data = Dataset::new(vec![("x".to_string(), vec![])]).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        assert!(matches!(
            data.resample(5, &mut rng),
            Err(Error::EmptyDataset(5))
        ));
        assert_eq!(data.resample(0, &mut rng).unwrap().len(), 0);
    }

    #[test]
    fn test_noise_leaves_originals_untouched() {
        let data = small();
        let mut rng = SmallRng::seed_from_u64(11);
        let mut out = data.resample(40, &mut rng).unwrap();
        let before = out.clone();
        out.apply_noise(&["x".to_string(), "y".to_string()], &mut rng)
            .unwrap();

        for r in 0..out.len() {
            if out.original()[r] {
                assert_eq!(out.row(r), before.row(r), "Original row {r} was modified");
            }
        }
        let changed = (0..out.len())
            .filter(|&r| !out.original()[r] && out.row(r) != before.row(r))
            .count();
        assert!(changed > 0, "Expected synthetic rows to be perturbed");
    }

    #[test]
    fn test_noise_scale_is_small() {
        let data = small();
        let mut rng = SmallRng::seed_from_u64(5);
        let mut out = data.resample(4000, &mut rng).unwrap();
        let before = out.column("x").unwrap().to_vec();
        out.apply_noise(&["x".to_string()], &mut rng).unwrap();
        let diffs: Vec<f64> = out
            .column("x")
            .unwrap()
            .iter()
            .zip(&before)
            .zip(out.original())
            .filter(|(_, &o)| !o)
            .map(|((a, b), _)| a - b)
            .collect();
        let sd = sample_std(&diffs);
        // x is 0..3 repeated, sd ≈ 1.118, so the noise sd should be ≈ 0.056.
        assert!((sd - 0.056).abs() < 0.01, "Unexpected noise sd {sd}");
    }

    #[test]
    fn test_noise_unknown_column() {
        let mut data = small();
        let mut rng = SmallRng::seed_from_u64(5);
        assert!(matches!(
            data.apply_noise(&["z".to_string()], &mut rng),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_filter_rows() {
        let data = small();
        let out = data.filter(&Filter::parse("x >= 1 and y < 13").unwrap()).unwrap();
        assert_eq!(out.column("x").unwrap(), &[1.0, 2.0]);
        assert!(matches!(
            data.filter(&Filter::parse("z > 1").unwrap()),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_generate_by_sizes_and_filters() {
        let data = small();
        let sized = generate_datasets(&data, &[2, 4, 9], &[], &[], 42).unwrap();
        assert_eq!(sized.keys().copied().collect::<Vec<_>>(), vec![2, 4, 9]);
        for (k, d) in &sized {
            assert_eq!(*k, d.len());
        }

        let filtered = generate_datasets(
            &data,
            &[100],
            &["x > 0".to_string(), "x > 2".to_string()],
            &[],
            42,
        )
        .unwrap();
        assert_eq!(filtered.keys().copied().collect::<Vec<_>>(), vec![1, 3]);

        assert!(matches!(
            generate_datasets(&data, &[], &[], &[], 42),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_csv_round_trip() {
        let data = small();
        let mut rng = SmallRng::seed_from_u64(2);
        let out = data.resample(6, &mut rng).unwrap();
        let file = NamedTempFile::new().unwrap();
        out.to_csv(file.path()).unwrap();
        let back = Dataset::from_csv(file.path()).unwrap();
        assert_eq!(back, out);
    }
}
