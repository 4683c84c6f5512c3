//! Grouped bar chart of `ess_mean/s` and `ess_tail/s` per run.

use plotters::prelude::*;
use std::path::Path;

use crate::error::{Error, Result};
use crate::results::ResultsTable;

const MEAN_COLOR: RGBColor = RGBColor(70, 130, 180);
const TAIL_COLOR: RGBColor = RGBColor(230, 120, 50);

/// One bar: `(x_start, x_end, height)` on an axis where run `i` spans `[i, i + 1)`.
type Bar = (f64, f64, f64);

/// Bars for each run with ESS/s values: mean on the left half, tail on the right.
fn bar_layout(results: &ResultsTable) -> Vec<(String, Bar, Bar)> {
    results
        .rows()
        .iter()
        .filter(|r| r.ess_mean_per_s.is_some() || r.ess_tail_per_s.is_some())
        .enumerate()
        .map(|(i, r)| {
            let x = i as f64;
            (
                r.key.clone(),
                (x + 0.1, x + 0.5, r.ess_mean_per_s.unwrap_or(0.0)),
                (x + 0.5, x + 0.9, r.ess_tail_per_s.unwrap_or(0.0)),
            )
        })
        .collect()
}

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Renders the ESS/s chart of `results` to a PNG at `path`.
///
/// # Errors
///
/// Fails when no run has ESS/s values yet, or when drawing fails.
pub fn plot_ess_per_second(results: &ResultsTable, path: &Path) -> Result<()> {
    let bars = bar_layout(results);
    if bars.is_empty() {
        return Err(Error::Plot("no ESS/s values to plot".to_string()));
    }
    let y_max = bars
        .iter()
        .flat_map(|(_, m, t)| [m.2, t.2])
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max)
        .max(1e-9)
        * 1.1;
    let labels: Vec<String> = bars.iter().map(|(k, _, _)| k.clone()).collect();

    let root = BitMapBackend::new(path, (1200, 700)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Effective samples per second", ("sans-serif", 32))
        .margin(10)
        .x_label_area_size(120)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..bars.len() as f64, 0.0..y_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len() * 2 + 1)
        .x_label_formatter(&|x| {
            let i = x.floor() as usize;
            let centred = (x - x.floor() - 0.5).abs() < 0.25;
            match labels.get(i) {
                Some(label) if centred => label.clone(),
                _ => String::new(),
            }
        })
        .y_desc("ESS / s")
        .light_line_style(WHITE.mix(0.8))
        .bold_line_style(BLACK.mix(0.3))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(bars.iter().map(|(_, (x0, x1, h), _)| {
            Rectangle::new([(*x0, 0.0), (*x1, *h)], MEAN_COLOR.filled())
        }))
        .map_err(plot_err)?
        .label("ess_mean/s")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], MEAN_COLOR.filled()));

    chart
        .draw_series(bars.iter().map(|(_, _, (x0, x1, h))| {
            Rectangle::new([(*x0, 0.0), (*x1, *h)], TAIL_COLOR.filled())
        }))
        .map_err(plot_err)?
        .label("ess_tail/s")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], TAIL_COLOR.filled()));

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.9))
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::PerfMetrics;
    use crate::stats::Summary;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn table() -> ResultsTable {
        let mut table = ResultsTable::new();
        let metrics = PerfMetrics {
            elapsed_time: 2.0,
            current_memory: 0,
            peak_memory: 0,
        };
        let a = table.upsert("classical", "metropolis", 10, &metrics);
        table.upsert("kernel", "default", 10, &metrics);
        let summary = Summary {
            name: "p".to_string(),
            mean: 0.0,
            sd: 1.0,
            mcse_mean: 0.1,
            ess_mean: 100.0,
            ess_tail: 60.0,
            r_hat: 1.0,
        };
        table.add_ess_per_second(&BTreeMap::from([(a, vec![summary])]));
        table
    }

    #[test]
    fn test_bar_layout_skips_runs_without_ess() {
        let bars = bar_layout(&table());
        assert_eq!(bars.len(), 1);
        let (key, mean, tail) = &bars[0];
        assert_eq!(key, "classical_metropolis_10");
        assert_eq!(*mean, (0.1, 0.5, 50.0));
        assert_eq!(*tail, (0.5, 0.9, 30.0));
    }

    #[test]
    fn test_plot_without_values_fails() {
        let dir = tempdir().unwrap();
        let err = plot_ess_per_second(&ResultsTable::new(), &dir.path().join("ess.png"));
        assert!(matches!(err, Err(Error::Plot(_))));
    }
}
