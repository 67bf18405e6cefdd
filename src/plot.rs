//! Plot and histogram figure types.
//!
//! The job engine produces [`Figure`] values; the UI renders them with
//! ratatui chart widgets. Scale validation lives here so both the scatter
//! and histogram paths fail fast with the offending minimum.

use crate::error::{Result, ScaleAxis, TaigaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisScale {
    #[default]
    Linear,
    Log,
}

impl AxisScale {
    pub fn toggled(self) -> Self {
        match self {
            Self::Linear => Self::Log,
            Self::Log => Self::Linear,
        }
    }

    pub fn is_log(self) -> bool {
        matches!(self, Self::Log)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Log => "log",
        }
    }
}

/// Scatter-plot configuration, kept across repeated plots in one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlotConfig {
    pub x_scale: AxisScale,
    pub y_scale: AxisScale,
}

/// Histogram configuration, kept across repeated histograms in one session.
#[derive(Debug, Clone, Copy)]
pub struct HistogramSpec {
    pub bins: usize,
    pub x_scale: AxisScale,
    pub count_scale: AxisScale,
}

impl Default for HistogramSpec {
    fn default() -> Self {
        Self {
            bins: 50,
            x_scale: AxisScale::Linear,
            count_scale: AxisScale::Linear,
        }
    }
}

/// Binned counts with their edges, ready for a bar chart.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
    pub spec: HistogramSpec,
}

impl Histogram {
    pub fn bin_centers(&self) -> Vec<f64> {
        self.edges
            .windows(2)
            .map(|w| 0.5 * (w[0] + w[1]))
            .collect()
    }
}

/// A renderable result of a plotting job.
#[derive(Debug, Clone)]
pub enum Figure {
    Scatter {
        points: Vec<(f64, f64)>,
        config: PlotConfig,
        x_label: String,
        y_label: String,
    },
    Histogram(Histogram),
}

impl Figure {
    /// Dump the figure data as CSV so it can be re-plotted elsewhere.
    pub fn save_csv(&self, path: &std::path::Path) -> Result<()> {
        use std::io::Write;
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        match self {
            Self::Scatter {
                points,
                x_label,
                y_label,
                ..
            } => {
                writeln!(out, "{},{}", x_label, y_label)?;
                for (x, y) in points {
                    writeln!(out, "{},{}", x, y)?;
                }
            }
            Self::Histogram(hist) => {
                writeln!(out, "bin_center,count")?;
                for (center, count) in hist.bin_centers().iter().zip(&hist.counts) {
                    writeln!(out, "{},{}", center, count)?;
                }
            }
        }
        Ok(())
    }
}

/// A logarithmic axis needs strictly positive data.
pub fn check_log_axis(axis: ScaleAxis, min_observed: f64) -> Result<()> {
    if min_observed <= 0.0 {
        return Err(TaigaError::IncompatibleScale { axis, min_observed });
    }
    Ok(())
}

/// Bin edges over `[min, max]`, linear or logarithmic. A degenerate range is
/// widened so every value lands in a bin.
pub fn bin_edges(min: f64, max: f64, bins: usize, scale: AxisScale) -> Result<Vec<f64>> {
    let bins = bins.max(1);
    let (mut lo, mut hi) = (min, max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    match scale {
        AxisScale::Linear => {
            let width = (hi - lo) / bins as f64;
            Ok((0..=bins).map(|i| lo + width * i as f64).collect())
        }
        AxisScale::Log => {
            check_log_axis(ScaleAxis::X, lo)?;
            let (llo, lhi) = (lo.log10(), hi.log10());
            let width = (lhi - llo) / bins as f64;
            Ok((0..=bins)
                .map(|i| 10f64.powf(llo + width * i as f64))
                .collect())
        }
    }
}

/// Bin index for `x` given sorted `edges`; the last edge is inclusive.
pub fn bin_index(edges: &[f64], x: f64) -> Option<usize> {
    if edges.len() < 2 || x < edges[0] || x > edges[edges.len() - 1] {
        return None;
    }
    let idx = edges.partition_point(|e| *e <= x);
    Some(idx.saturating_sub(1).min(edges.len() - 2))
}
