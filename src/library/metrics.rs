// src/library/metrics.rs
// 相似度/距离度量：SAD, SID, MAE, MSE, IUR
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::processing::peaks::{find_peaks, width_in_samples};

const SID_EPS: f64 = 1e-12;

/// Peak thresholds and pairing tolerance for the IUR distance.
/// Widths and tolerance are in axis units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IurSettings {
    pub query_prominence: f64,
    pub query_width: f64,
    pub reference_prominence: f64,
    pub reference_width: f64,
    pub tolerance: f64,
}

impl Default for IurSettings {
    fn default() -> Self {
        Self {
            query_prominence: 0.1,
            query_width: 2.0,
            reference_prominence: 0.1,
            reference_width: 2.0,
            tolerance: 30.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Sad,
    Sid,
    Mae,
    Mse,
    Iur(IurSettings),
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Sad => "sad",
            Metric::Sid => "sid",
            Metric::Mae => "mae",
            Metric::Mse => "mse",
            Metric::Iur(_) => "iur",
        }
    }

    /// Distance between two vectors sampled on the same `axis`; lower is closer.
    pub fn distance(&self, axis: &[f64], query: &[f64], reference: &[f64]) -> f64 {
        match self {
            Metric::Sad => sad(query, reference),
            Metric::Sid => sid(query, reference),
            Metric::Mae => mae(query, reference),
            Metric::Mse => mse(query, reference),
            Metric::Iur(settings) => iur(axis, query, reference, settings),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sad" => Ok(Metric::Sad),
            "sid" => Ok(Metric::Sid),
            "mae" => Ok(Metric::Mae),
            "mse" => Ok(Metric::Mse),
            "iur" => Ok(Metric::Iur(IurSettings::default())),
            other => Err(format!("unknown metric `{other}` (expected sad, sid, mae, mse or iur)")),
        }
    }
}

pub fn sad(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

pub fn mae(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return f64::NAN;
    }
    sad(a, b) / a.len() as f64
}

pub fn mse(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return f64::NAN;
    }
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>() / a.len() as f64
}

/// Symmetric KL divergence between the two vectors read as distributions.
/// Probabilities are clamped away from zero; a non-positive total gives NaN.
pub fn sid(a: &[f64], b: &[f64]) -> f64 {
    let sa: f64 = a.iter().sum();
    let sb: f64 = b.iter().sum();
    if !(sa > 0.0 && sb > 0.0) {
        return f64::NAN;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let p = (x / sa).max(SID_EPS);
            let q = (y / sb).max(SID_EPS);
            p * (p / q).ln() + q * (q / p).ln()
        })
        .sum()
}

/// Greedy two-pointer pairing of two ascending position lists.
pub fn count_matches(query: &[f64], reference: &[f64], tolerance: f64) -> usize {
    let (mut i, mut j, mut matched) = (0, 0, 0);
    while i < query.len() && j < reference.len() {
        if (query[i] - reference[j]).abs() <= tolerance {
            matched += 1;
            i += 1;
            j += 1;
        } else if query[i] < reference[j] {
            i += 1;
        } else {
            j += 1;
        }
    }
    matched
}

/// IUR distance from peak positions: 0 when neither side has peaks, 1 when
/// nothing pairs up, otherwise `1 − matched / (total − matched)`.
pub fn iur_distance(query_peaks: &[f64], reference_peaks: &[f64], tolerance: f64) -> f64 {
    if query_peaks.is_empty() && reference_peaks.is_empty() {
        return 0.0;
    }
    let matched = count_matches(query_peaks, reference_peaks, tolerance);
    if matched < 1 {
        return 1.0;
    }
    let total = query_peaks.len() + reference_peaks.len();
    1.0 - matched as f64 / (total - matched) as f64
}

fn scale_to_max(y: &[f64]) -> Vec<f64> {
    let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 {
        y.iter().map(|v| v / max).collect()
    } else {
        y.to_vec()
    }
}

fn peak_positions(axis: &[f64], y: &[f64], prominence: f64, width_samples: f64) -> Vec<f64> {
    let mut positions: Vec<f64> = find_peaks(y, prominence, width_samples)
        .into_iter()
        .map(|p| axis[p.index])
        .collect();
    positions.sort_by(f64::total_cmp);
    positions
}

pub fn iur(axis: &[f64], query: &[f64], reference: &[f64], settings: &IurSettings) -> f64 {
    let step = if axis.len() > 1 { axis[1] - axis[0] } else { 1.0 };
    let q = scale_to_max(query);
    let r = scale_to_max(reference);
    let q_peaks = peak_positions(
        axis,
        &q,
        settings.query_prominence,
        width_in_samples(settings.query_width, step),
    );
    let r_peaks = peak_positions(
        axis,
        &r,
        settings.reference_prominence,
        width_in_samples(settings.reference_width, step),
    );
    iur_distance(&q_peaks, &r_peaks, settings.tolerance)
}
