// src/library/matcher.rs
// 光谱库检索：重叠筛选 -> 公共轴重采样 -> 度量打分 -> 排序取前 N
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cancel::SearchObserver;
use crate::error::ConfigError;
use crate::library::entry::{Library, LibraryEntry};
use crate::library::metrics::Metric;
use crate::processing::interpolate::{interp_linear, linspace};
use crate::processing::pipeline::PreprocessingConfig;
use crate::spectrum::Spectrum;

/// Samples on the common axis both spectra are resampled to.
pub const COMMON_AXIS_POINTS: usize = 2000;
/// Entries between two calls to [`SearchObserver::on_yield`].
pub const YIELD_EVERY: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub metric: Metric,
    pub top_n: usize,
    /// Minimum axis overlap, in axis units, for an entry to be scored.
    pub min_overlap: f64,
    /// Run the query's pipeline on each library spectrum before comparing.
    pub preprocess_library: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            metric: Metric::Sad,
            top_n: 5,
            min_overlap: 3000.0,
            preprocess_library: true,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n == 0 {
            return Err(ConfigError::ZeroTopN);
        }
        Ok(())
    }
}

/// One ranked match.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchResult {
    pub component: String,
    pub url: String,
    pub id: String,
    pub identifier: String,
    pub distance_score: f64,
    pub aligned_intensity_comp: Vec<f64>,
    pub spectral_axis_comp: Vec<f64>,
    pub metric: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchOutcome {
    /// Ranked rows, best first. May be empty.
    Completed(Vec<SearchResult>),
    /// Stopped through the observer; no rows are reported.
    Cancelled,
}

impl SearchOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchOutcome::Cancelled)
    }

    /// Ranked rows; empty when cancelled.
    pub fn results(&self) -> &[SearchResult] {
        match self {
            SearchOutcome::Completed(rows) => rows,
            SearchOutcome::Cancelled => &[],
        }
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            SearchOutcome::Completed(rows) => rows,
            SearchOutcome::Cancelled => Vec::new(),
        }
    }
}

/// Length of the shared axis interval, negative when disjoint.
pub fn overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.1.min(b.1) - a.0.max(b.0)
}

/// Admission filter: the overlap must be positive and reach `min_overlap`.
pub fn admits(overlap: f64, min_overlap: f64) -> bool {
    overlap > 0.0 && overlap >= min_overlap
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Scores one entry, or `None` when it is excluded.
fn score_entry(
    query: &Spectrum,
    key: &str,
    entry: &LibraryEntry,
    pipeline: Option<&PreprocessingConfig>,
    options: &SearchOptions,
) -> Option<SearchResult> {
    let processed;
    let reference = match pipeline {
        Some(p) if options.preprocess_library => match p.apply(&entry.spectrum) {
            Ok(s) => {
                processed = s;
                &processed
            }
            Err(e) => {
                warn!("library entry '{key}' skipped: preprocessing failed: {e}");
                return None;
            }
        },
        _ => &entry.spectrum,
    };
    let q_range = query.axis_range()?;
    let r_range = reference.axis_range()?;
    let shared = overlap(q_range, r_range);
    if !admits(shared, options.min_overlap) {
        debug!("'{key}': overlap {shared:.1} below {:.1}", options.min_overlap);
        return None;
    }
    let lo = q_range.0.max(r_range.0);
    let hi = q_range.1.min(r_range.1);
    let common = linspace(lo, hi, COMMON_AXIS_POINTS);
    let q = interp_linear(&common, query.axis(), query.intensity());
    let r = interp_linear(&common, reference.axis(), reference.intensity());
    if q.iter().chain(r.iter()).any(|v| !v.is_finite()) {
        debug!("'{key}': resampling produced undefined values");
        return None;
    }
    if l2_norm(&q) == 0.0 || l2_norm(&r) == 0.0 {
        debug!("'{key}': zero-norm resampled vector");
        return None;
    }
    let score = options.metric.distance(&common, &q, &r);
    if !score.is_finite() {
        debug!("'{key}': non-finite {} score", options.metric);
        return None;
    }
    Some(SearchResult {
        component: entry.name.clone(),
        url: entry.url.clone(),
        id: key.to_string(),
        identifier: entry.identifier.clone(),
        distance_score: score,
        aligned_intensity_comp: r,
        spectral_axis_comp: common,
        metric: options.metric.name().to_string(),
    })
}

/// Ranks `library` against `query`, best (lowest distance) first.
///
/// `pipeline` is the configuration the query went through; it is re-run on
/// each entry when `options.preprocess_library` is set. The observer is asked
/// to cancel before every entry.
pub fn search(
    query: &Spectrum,
    library: &Library,
    pipeline: Option<&PreprocessingConfig>,
    options: &SearchOptions,
    observer: &mut dyn SearchObserver,
) -> Result<SearchOutcome, ConfigError> {
    options.validate()?;
    let total = library.len();
    let mut rows = Vec::new();
    info!("started search: {total} entries, metric {}", options.metric);
    for (index, (key, entry)) in library.iter().enumerate() {
        observer.on_progress(index, total);
        if observer.is_cancelled() {
            info!("search canceled by user after {index} of {total} entries");
            return Ok(SearchOutcome::Cancelled);
        }
        if let Some(row) = score_entry(query, key, entry, pipeline, options) {
            rows.push(row);
        }
        if (index + 1) % YIELD_EVERY == 0 {
            observer.on_yield();
        }
    }
    observer.on_progress(total, total);
    rows.sort_by(|a, b| a.distance_score.total_cmp(&b.distance_score));
    rows.truncate(options.top_n);
    if rows.is_empty() {
        info!("no valid search results found");
    }
    Ok(SearchOutcome::Completed(rows))
}
