// src/processing/peaks.rs
// 峰检测：局部极大值 + 显著性(prominence) + 半高宽过滤
use serde::{Deserialize, Serialize};

use crate::spectrum::Spectrum;

/// Thresholds for peak picking. `width` is expressed in axis units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakSettings {
    pub prominence: f64,
    pub width: f64,
}

impl Default for PeakSettings {
    fn default() -> Self {
        Self {
            prominence: 0.1,
            width: 2.0,
        }
    }
}

/// A peak located by sample index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakIndex {
    pub index: usize,
    pub prominence: f64,
    /// Width at half prominence, in samples.
    pub width: f64,
}

/// A peak on a calibrated spectrum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Peak {
    pub index: usize,
    pub position: f64,
    pub intensity: f64,
    pub prominence: f64,
    pub width: f64,
}

/// Strict local maxima; a flat top counts once, at its middle sample
/// (rounded down). Edge samples are never maxima.
pub fn local_maxima(y: &[f64]) -> Vec<usize> {
    let n = y.len();
    let mut out = Vec::new();
    if n < 3 {
        return out;
    }
    let mut i = 1;
    while i < n - 1 {
        if y[i - 1] < y[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && y[ahead] == y[i] {
                ahead += 1;
            }
            if y[ahead] < y[i] {
                out.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Topographic prominence of the peak at `peak`, with the bases it was
/// measured against.
fn prominence(y: &[f64], peak: usize) -> (f64, usize, usize) {
    let height = y[peak];
    let mut left_min = height;
    let mut left_base = peak;
    let mut i = peak;
    while i > 0 {
        i -= 1;
        if y[i] > height {
            break;
        }
        if y[i] < left_min {
            left_min = y[i];
            left_base = i;
        }
    }
    let mut right_min = height;
    let mut right_base = peak;
    let mut i = peak;
    while i + 1 < y.len() {
        i += 1;
        if y[i] > height {
            break;
        }
        if y[i] < right_min {
            right_min = y[i];
            right_base = i;
        }
    }
    (height - left_min.max(right_min), left_base, right_base)
}

/// Width at half prominence with linearly interpolated crossings.
fn half_prominence_width(y: &[f64], peak: usize, prominence: f64, left_base: usize, right_base: usize) -> f64 {
    let level = y[peak] - 0.5 * prominence;
    let mut i = peak;
    while i > left_base && y[i] > level {
        i -= 1;
    }
    let mut left = i as f64;
    if y[i] < level {
        left += (level - y[i]) / (y[i + 1] - y[i]);
    }
    let mut j = peak;
    while j < right_base && y[j] > level {
        j += 1;
    }
    let mut right = j as f64;
    if y[j] < level {
        right -= (level - y[j]) / (y[j - 1] - y[j]);
    }
    right - left
}

/// Peaks of `y` whose prominence and width (in samples) reach the thresholds.
pub fn find_peaks(y: &[f64], min_prominence: f64, min_width: f64) -> Vec<PeakIndex> {
    local_maxima(y)
        .into_iter()
        .filter_map(|index| {
            let (prominence, left, right) = prominence(y, index);
            if prominence < min_prominence {
                return None;
            }
            let width = half_prominence_width(y, index, prominence, left, right);
            (width >= min_width).then_some(PeakIndex {
                index,
                prominence,
                width,
            })
        })
        .collect()
}

/// Converts an axis-unit width to samples using the mean spacing `step`.
pub fn width_in_samples(width: f64, step: f64) -> f64 {
    if step > 0.0 {
        width / step
    } else {
        1.0
    }
}

/// Peaks of a calibrated spectrum, reported on its axis.
pub fn detect_peaks(spectrum: &Spectrum, settings: &PeakSettings) -> Vec<Peak> {
    let min_width = width_in_samples(settings.width, spectrum.mean_step());
    find_peaks(spectrum.intensity(), settings.prominence, min_width)
        .into_iter()
        .map(|p| Peak {
            index: p.index,
            position: spectrum.axis()[p.index],
            intensity: spectrum.intensity()[p.index],
            prominence: p.prominence,
            width: p.width,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::AxisUnit;

    fn gaussian(n: usize, centre: f64, sigma: f64, height: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let z = (i as f64 - centre) / sigma;
                height * (-0.5 * z * z).exp()
            })
            .collect()
    }

    #[test]
    fn plateau_resolves_to_middle() {
        let y = [0.0, 1.0, 3.0, 3.0, 3.0, 1.0, 0.0];
        assert_eq!(local_maxima(&y), vec![3]);
        let y = [0.0, 2.0, 2.0, 0.0];
        assert_eq!(local_maxima(&y), vec![1]);
        // a rising edge into the last sample is not a peak
        assert!(local_maxima(&[0.0, 1.0, 2.0]).is_empty());
    }

    #[test]
    fn prominence_uses_higher_of_two_bases() {
        let y = [0.0, 5.0, 2.0, 4.0, 1.0, 0.0];
        let peaks = find_peaks(&y, 0.0, 0.0);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].prominence, 5.0);
        assert_eq!(peaks[1].prominence, 2.0);
    }

    #[test]
    fn gaussian_width_matches_fwhm() {
        let y = gaussian(200, 100.0, 4.0, 10.0);
        let peaks = find_peaks(&y, 0.1, 2.0);
        assert_eq!(peaks.len(), 1);
        let fwhm = 2.0 * (2.0f64 * 2.0f64.ln()).sqrt() * 4.0;
        assert!((peaks[0].width - fwhm).abs() < 0.1);
        assert!(find_peaks(&y, 0.1, 12.0).is_empty());
        assert!(find_peaks(&y, 11.0, 0.0).is_empty());
    }

    #[test]
    fn width_threshold_is_in_axis_units() {
        let axis: Vec<f64> = (0..200).map(|i| 500.0 + 0.5 * i as f64).collect();
        let s = Spectrum::new(axis, gaussian(200, 80.0, 3.0, 1.0), AxisUnit::RamanShift).unwrap();
        // FWHM is about 7 samples = 3.5 axis units
        let found = detect_peaks(&s, &PeakSettings { prominence: 0.1, width: 3.0 });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].position, 540.0);
        assert!(detect_peaks(&s, &PeakSettings { prominence: 0.1, width: 4.0 }).is_empty());
    }
}
