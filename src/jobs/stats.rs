//! Chunked reductions over dataset content.
//!
//! Every function here runs on a worker thread via [`super::Engine`] and
//! follows the same skeleton: validate the dataset, fold buffer by buffer,
//! poll cancellation between buffers, report `processed/total` progress.
//! Chunked datasets use the store's native chunk iterator; contiguous ones
//! are read in fixed-size slices so peak memory stays bounded and progress
//! still ticks.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ScaleAxis, TaigaError};
use crate::plot::{self, Histogram, HistogramSpec, PlotConfig};
use crate::store::{DataStore, DatasetInfo};

use super::{JobCtx, JobValue};

/// Slice length used when a dataset has no native chunking.
pub const SLICE_HINT: usize = 65_536;

/// Upper bound on scatter points handed to the renderer.
pub const MAX_POINTS: usize = 10_000;

/// Knobs shared by every reduction.
#[derive(Debug, Clone, Copy)]
pub struct FoldOptions {
    /// Process chunk-by-chunk even when the dataset fits in one read.
    pub always_chunk: bool,
    pub slice_hint: usize,
}

impl Default for FoldOptions {
    fn default() -> Self {
        Self {
            always_chunk: false,
            slice_hint: SLICE_HINT,
        }
    }
}

fn validate_numeric(store: &dyn DataStore, path: &str) -> Result<DatasetInfo> {
    let info = store.dataset_info(path)?;
    if !info.dtype.is_numeric() {
        return Err(TaigaError::NonNumericData {
            path: path.to_string(),
            dtype: info.dtype.name().to_string(),
        });
    }
    if info.size() == 0 {
        return Err(TaigaError::EmptyDataset {
            path: path.to_string(),
        });
    }
    Ok(info)
}

/// Fold every element of `path` through `f`. Returns `false` when the fold
/// stopped early because cancellation was observed.
fn fold_chunks<F>(
    store: &dyn DataStore,
    path: &str,
    info: &DatasetInfo,
    opts: FoldOptions,
    ctx: &JobCtx,
    label: &str,
    mut f: F,
) -> Result<bool>
where
    F: FnMut(&[f64]),
{
    let size = info.size();
    // Small datasets skip the chunk machinery in one read.
    if !opts.always_chunk && size <= opts.slice_hint {
        if ctx.cancelled() {
            return Ok(false);
        }
        let buffer = store.read_range(path, 0, size)?;
        f(&buffer);
        ctx.progress(1.0, format!("{}/{} elements [{}]", size, size, label));
        return Ok(true);
    }
    match info.chunk_shape {
        Some(_) => {
            let total = info.chunk_count();
            for (done, chunk) in store.iter_chunks(path)?.enumerate() {
                if ctx.cancelled() {
                    debug!(path, "fold cancelled after {} chunks", done);
                    return Ok(false);
                }
                f(&chunk?);
                ctx.progress(
                    (done + 1) as f64 / total as f64,
                    format!("{}/{} chunks [{}]", done + 1, total, label),
                );
            }
        }
        None => {
            let mut start = 0;
            while start < size {
                if ctx.cancelled() {
                    debug!(path, "fold cancelled at element {}", start);
                    return Ok(false);
                }
                let end = (start + opts.slice_hint).min(size);
                f(&store.read_range(path, start, end)?);
                ctx.progress(
                    end as f64 / size as f64,
                    format!("{}/{} elements [{}]", end, size, label),
                );
                start = end;
            }
        }
    }
    Ok(true)
}

pub fn min_max(
    store: &Arc<dyn DataStore>,
    path: &str,
    opts: FoldOptions,
    ctx: &JobCtx,
) -> Result<Option<JobValue>> {
    let info = validate_numeric(store.as_ref(), path)?;
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    let finished = fold_chunks(store.as_ref(), path, &info, opts, ctx, "min/max", |buf| {
        for &x in buf {
            min = min.min(x);
            max = max.max(x);
        }
    })?;
    if !finished {
        return Ok(None);
    }
    Ok(Some(JobValue::MinMax { min, max }))
}

/// Welford's online mean/variance accumulator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation.
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

pub fn mean(
    store: &Arc<dyn DataStore>,
    path: &str,
    opts: FoldOptions,
    ctx: &JobCtx,
) -> Result<Option<JobValue>> {
    let info = validate_numeric(store.as_ref(), path)?;
    let mut acc = Welford::default();
    let finished = fold_chunks(store.as_ref(), path, &info, opts, ctx, "mean", |buf| {
        for &x in buf {
            acc.push(x);
        }
    })?;
    if !finished {
        return Ok(None);
    }
    Ok(Some(JobValue::Mean(acc.mean())))
}

pub fn std_dev(
    store: &Arc<dyn DataStore>,
    path: &str,
    opts: FoldOptions,
    ctx: &JobCtx,
) -> Result<Option<JobValue>> {
    let info = validate_numeric(store.as_ref(), path)?;
    let mut acc = Welford::default();
    let finished = fold_chunks(store.as_ref(), path, &info, opts, ctx, "std", |buf| {
        for &x in buf {
            acc.push(x);
        }
    })?;
    if !finished {
        return Ok(None);
    }
    Ok(Some(JobValue::Std(acc.std())))
}

/// Two-pass histogram: pass 1 finds (or reuses) the value range, pass 2
/// bins. Logarithmic axes are validated against the observed minimum before
/// any binning work starts.
pub fn histogram(
    store: &Arc<dyn DataStore>,
    path: &str,
    spec: HistogramSpec,
    cached_range: Option<(f64, f64)>,
    opts: FoldOptions,
    ctx: &JobCtx,
) -> Result<Option<JobValue>> {
    let info = validate_numeric(store.as_ref(), path)?;
    let (min, max) = match cached_range {
        Some(range) => range,
        None => {
            let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
            let finished =
                fold_chunks(store.as_ref(), path, &info, opts, ctx, "histogram range", |buf| {
                    for &x in buf {
                        min = min.min(x);
                        max = max.max(x);
                    }
                })?;
            if !finished {
                return Ok(None);
            }
            (min, max)
        }
    };
    if spec.x_scale.is_log() {
        plot::check_log_axis(ScaleAxis::X, min)?;
    }
    let edges = plot::bin_edges(min, max, spec.bins, spec.x_scale)?;
    let mut counts = vec![0u64; edges.len() - 1];
    let finished = fold_chunks(store.as_ref(), path, &info, opts, ctx, "histogram", |buf| {
        for &x in buf {
            if let Some(bin) = plot::bin_index(&edges, x) {
                counts[bin] += 1;
            }
        }
    })?;
    if !finished {
        return Ok(None);
    }
    if spec.count_scale.is_log() {
        if counts.iter().any(|&c| c == 0) {
            return Err(TaigaError::IncompatibleScale {
                axis: ScaleAxis::Count,
                min_observed: 0.0,
            });
        }
    }
    Ok(Some(JobValue::Histogram(Histogram { edges, counts, spec })))
}

/// Raw elements for a half-open index range. Not a reduction; the buffers
/// still arrive in bounded slices so a huge range cannot spike memory.
pub fn value_range(
    store: &Arc<dyn DataStore>,
    path: &str,
    start: usize,
    end: usize,
    opts: FoldOptions,
    ctx: &JobCtx,
) -> Result<Option<JobValue>> {
    let info = validate_numeric(store.as_ref(), path)?;
    let end = end.min(info.size());
    let start = start.min(end);
    let mut values = Vec::with_capacity(end - start);
    let total = end - start;
    let mut at = start;
    while at < end {
        if ctx.cancelled() {
            return Ok(None);
        }
        let stop = (at + opts.slice_hint).min(end);
        values.extend(store.read_range(path, at, stop)?);
        ctx.progress(
            (stop - start) as f64 / total.max(1) as f64,
            format!("{}/{} elements [values]", stop - start, total),
        );
        at = stop;
    }
    Ok(Some(JobValue::Values { start, values }))
}

/// Paired reads for a scatter plot, downsampled to [`MAX_POINTS`]. Axis
/// scales are validated against observed minima before the points are kept.
pub fn scatter(
    store: &Arc<dyn DataStore>,
    x_path: &str,
    y_path: &str,
    config: PlotConfig,
    opts: FoldOptions,
    ctx: &JobCtx,
) -> Result<Option<JobValue>> {
    let x_info = validate_numeric(store.as_ref(), x_path)?;
    let y_info = validate_numeric(store.as_ref(), y_path)?;
    // Paired reads only make sense for 1-D datasets of the same shape; an
    // equal element count over different shapes is still incompatible.
    if x_info.ndim() != 1 || x_info.shape != y_info.shape {
        return Err(TaigaError::ShapeIncompatible {
            left: x_info.shape.clone(),
            right: y_info.shape.clone(),
        });
    }
    let size = x_info.size();
    let mut points = Vec::with_capacity(size.min(MAX_POINTS));
    let stride = size.div_ceil(MAX_POINTS).max(1);
    let (mut x_min, mut y_min) = (f64::INFINITY, f64::INFINITY);
    let mut at = 0;
    while at < size {
        if ctx.cancelled() {
            return Ok(None);
        }
        let stop = (at + opts.slice_hint).min(size);
        let xs = store.read_range(x_path, at, stop)?;
        let ys = store.read_range(y_path, at, stop)?;
        for (offset, (&x, &y)) in xs.iter().zip(&ys).enumerate() {
            x_min = x_min.min(x);
            y_min = y_min.min(y);
            if (at + offset) % stride == 0 {
                points.push((x, y));
            }
        }
        ctx.progress(
            stop as f64 / size as f64,
            format!("{}/{} elements [scatter]", stop, size),
        );
        at = stop;
    }
    if config.x_scale.is_log() {
        plot::check_log_axis(ScaleAxis::X, x_min)?;
    }
    if config.y_scale.is_log() {
        plot::check_log_axis(ScaleAxis::Y, y_min)?;
    }
    Ok(Some(JobValue::Points(points)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Engine, JobKind, JobState, StatKind};
    use crate::plot::AxisScale;
    use crate::store::MemoryStore;
    use ndarray::{Array, ArrayD};
    use std::time::Duration;

    fn run<F>(kind: JobKind, work: F) -> JobState
    where
        F: FnOnce(&JobCtx) -> Result<Option<JobValue>> + Send + 'static,
    {
        let engine = Engine::with_workers(1);
        let handle = engine.submit(kind, Box::new(work));
        for _ in 0..2000 {
            let state = handle.poll();
            if state.is_terminal() {
                return state;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("job never finished");
    }

    fn chunked_fixture(values: Vec<f64>, chunk: usize) -> Arc<dyn DataStore> {
        let store = MemoryStore::new();
        let n = values.len();
        store.add_dataset_with(
            "/ds",
            Array::from_vec(values).into_dyn(),
            Some(vec![chunk]),
            Some("gzip".to_string()),
        );
        assert!(n > 0);
        Arc::new(store)
    }

    fn in_memory(values: &[f64]) -> (f64, f64, f64, f64) {
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
        (min, max, mean, var.sqrt())
    }

    #[test]
    fn chunked_min_max_matches_full_read() {
        let values: Vec<f64> = (0..1000).map(|i| ((i * 37) % 911) as f64 - 455.0).collect();
        let (true_min, true_max, _, _) = in_memory(&values);
        let store = chunked_fixture(values, 64);
        let state = run(JobKind::Stats(StatKind::MinMax), move |ctx| {
            min_max(&store, "/ds", FoldOptions::default(), ctx)
        });
        match state {
            JobState::Done(JobValue::MinMax { min, max }) => {
                assert_eq!(min, true_min);
                assert_eq!(max, true_max);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn welford_matches_full_memory_computation() {
        let values: Vec<f64> = (0..5000)
            .map(|i| 1e6 + (i as f64).sin() * 3.0)
            .collect();
        let (_, _, true_mean, true_std) = in_memory(&values);
        let mut acc = Welford::default();
        for &x in &values {
            acc.push(x);
        }
        assert!((acc.mean() - true_mean).abs() / true_mean.abs() < 1e-9);
        assert!((acc.std() - true_std).abs() / true_std.max(1e-300) < 1e-6);
    }

    #[test]
    fn mean_over_slices_equals_chunked_mean() {
        let values: Vec<f64> = (0..300).map(|i| i as f64 * 0.5).collect();
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        // Contiguous dataset, forced through the slice path.
        let store: Arc<dyn DataStore> = {
            let s = MemoryStore::new();
            s.add_dataset("/flat", Array::from_vec(values).into_dyn());
            Arc::new(s)
        };
        let opts = FoldOptions {
            always_chunk: true,
            slice_hint: 7,
        };
        let state = run(JobKind::Stats(StatKind::Mean), move |ctx| {
            mean(&store, "/flat", opts, ctx)
        });
        match state {
            JobState::Done(JobValue::Mean(m)) => assert!((m - expected).abs() < 1e-9),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn non_numeric_dataset_is_rejected() {
        let store: Arc<dyn DataStore> = {
            let s = MemoryStore::new();
            s.add_text_dataset("/names", 4);
            Arc::new(s)
        };
        let err = validate_numeric(store.as_ref(), "/names").unwrap_err();
        assert!(matches!(err, TaigaError::NonNumericData { .. }));
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let store = MemoryStore::new();
        store.add_dataset("/empty", ArrayD::zeros(ndarray::IxDyn(&[0])));
        let err = validate_numeric(&store, "/empty").unwrap_err();
        assert!(matches!(err, TaigaError::EmptyDataset { .. }));
    }

    #[test]
    fn histogram_counts_every_element_once() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let store = chunked_fixture(values, 128);
        let spec = HistogramSpec {
            bins: 10,
            ..HistogramSpec::default()
        };
        let state = run(JobKind::Histogram, move |ctx| {
            histogram(&store, "/ds", spec, None, FoldOptions::default(), ctx)
        });
        match state {
            JobState::Done(JobValue::Histogram(hist)) => {
                assert_eq!(hist.counts.len(), 10);
                assert_eq!(hist.counts.iter().sum::<u64>(), 1000);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn histogram_reuses_cached_range() {
        let store = chunked_fixture(vec![1.0, 2.0, 3.0, 4.0], 2);
        let spec = HistogramSpec {
            bins: 4,
            ..HistogramSpec::default()
        };
        // A cached range narrower than the data drops out-of-range values.
        let state = run(JobKind::Histogram, move |ctx| {
            histogram(&store, "/ds", spec, Some((1.0, 2.0)), FoldOptions::default(), ctx)
        });
        match state {
            JobState::Done(JobValue::Histogram(hist)) => {
                assert_eq!(hist.counts.iter().sum::<u64>(), 2);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn log_x_axis_fails_fast_with_observed_minimum() {
        let store = chunked_fixture(vec![-2.0, 1.0, 5.0], 2);
        let spec = HistogramSpec {
            bins: 4,
            x_scale: AxisScale::Log,
            ..HistogramSpec::default()
        };
        let state = run(JobKind::Histogram, move |ctx| {
            histogram(&store, "/ds", spec, None, FoldOptions::default(), ctx)
        });
        match state {
            JobState::Failed(msg) => assert!(msg.contains("-2"), "{}", msg),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn log_count_axis_rejects_empty_bins() {
        // Values cluster at the ends, so middle bins are empty.
        let store = chunked_fixture(vec![1.0, 1.0, 1.0, 100.0, 100.0], 2);
        let spec = HistogramSpec {
            bins: 10,
            count_scale: AxisScale::Log,
            ..HistogramSpec::default()
        };
        let state = run(JobKind::Histogram, move |ctx| {
            histogram(&store, "/ds", spec, None, FoldOptions::default(), ctx)
        });
        assert!(matches!(state, JobState::Failed(_)));
    }

    #[test]
    fn value_range_returns_raw_elements() {
        let store = chunked_fixture((0..100).map(|i| i as f64).collect(), 16);
        let state = run(JobKind::ValueRange, move |ctx| {
            value_range(&store, "/ds", 10, 15, FoldOptions::default(), ctx)
        });
        match state {
            JobState::Done(JobValue::Values { start, values }) => {
                assert_eq!(start, 10);
                assert_eq!(values, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn scatter_rejects_mismatched_lengths() {
        let store: Arc<dyn DataStore> = {
            let s = MemoryStore::new();
            s.add_dataset("/x", Array::from_vec(vec![1.0, 2.0]).into_dyn())
                .add_dataset("/y", Array::from_vec(vec![1.0, 2.0, 3.0]).into_dyn());
            Arc::new(s)
        };
        let state = run(JobKind::Scatter, move |ctx| {
            scatter(&store, "/x", "/y", PlotConfig::default(), FoldOptions::default(), ctx)
        });
        assert!(matches!(state, JobState::Failed(_)));
    }

    #[test]
    fn scatter_rejects_equal_counts_with_different_shapes() {
        // 2x3 and 6 hold the same number of elements but are not pairable.
        let store: Arc<dyn DataStore> = {
            let s = MemoryStore::new();
            s.add_dataset("/x", ArrayD::zeros(ndarray::IxDyn(&[2, 3])))
                .add_dataset("/y", Array::from_vec(vec![1.0; 6]).into_dyn());
            Arc::new(s)
        };
        let state = run(JobKind::Scatter, move |ctx| {
            scatter(&store, "/x", "/y", PlotConfig::default(), FoldOptions::default(), ctx)
        });
        match state {
            JobState::Failed(msg) => assert!(msg.contains("Incompatible shapes"), "{}", msg),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn scatter_downsamples_large_inputs() {
        let n = 50_000;
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let store: Arc<dyn DataStore> = {
            let s = MemoryStore::new();
            s.add_dataset("/x", Array::from_vec(data.clone()).into_dyn())
                .add_dataset("/y", Array::from_vec(data).into_dyn());
            Arc::new(s)
        };
        let state = run(JobKind::Scatter, move |ctx| {
            scatter(&store, "/x", "/y", PlotConfig::default(), FoldOptions::default(), ctx)
        });
        match state {
            JobState::Done(JobValue::Points(points)) => {
                assert!(points.len() <= MAX_POINTS);
                assert!(!points.is_empty());
            }
            other => panic!("unexpected state {:?}", other),
        }
    }
}
