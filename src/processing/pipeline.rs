// src/processing/pipeline.rs
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProcessingError};
use crate::processing::baseline::{remove_baseline, AslsParams};
use crate::processing::savgol::{savgol_filter, validate as validate_savgol};
use crate::spectrum::Spectrum;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormKind {
    #[default]
    MinMax,
    Vector,
}

/// One preprocessing step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Stage {
    /// Keep samples with `min <= x <= max`.
    Crop { min: f64, max: f64 },
    SavitzkyGolay { window: usize, poly_order: usize },
    BaselineAsls(AslsParams),
    Normalize { norm: NormKind },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Crop { .. } => "crop",
            Stage::SavitzkyGolay { .. } => "savitzky-golay",
            Stage::BaselineAsls(_) => "baseline-asls",
            Stage::Normalize { .. } => "normalize",
        }
    }

    /// Checks that do not depend on the spectrum being processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Stage::Crop { min, max } if !(min < max) => Err(ConfigError::InvalidRange { min, max }),
            Stage::SavitzkyGolay { window, poly_order } => validate_savgol(window, poly_order, usize::MAX),
            _ => Ok(()),
        }
    }

    fn apply(&self, spectrum: Spectrum) -> Result<Spectrum, ProcessingError> {
        let out = match *self {
            Stage::Crop { min, max } => {
                let (axis, intensity, unit) = spectrum.into_parts();
                let (axis, intensity): (Vec<f64>, Vec<f64>) = axis
                    .into_iter()
                    .zip(intensity)
                    .filter(|(x, _)| *x >= min && *x <= max)
                    .unzip();
                Spectrum::new(axis, intensity, unit)?
            }
            Stage::SavitzkyGolay { window, poly_order } => {
                let smoothed = savgol_filter(spectrum.intensity(), window, poly_order)?;
                spectrum.with_intensity(smoothed)?
            }
            Stage::BaselineAsls(params) => {
                let corrected = remove_baseline(spectrum.intensity(), &params);
                spectrum.with_intensity(corrected)?
            }
            Stage::Normalize { norm } => spectrum.with_intensity(normalize(spectrum.intensity(), norm))?,
        };
        Ok(out)
    }
}

pub fn normalize(y: &[f64], kind: NormKind) -> Vec<f64> {
    match kind {
        NormKind::MinMax => {
            let min = y.iter().copied().fold(f64::INFINITY, f64::min);
            let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let span = max - min;
            if span > 0.0 {
                y.iter().map(|v| (v - min) / span).collect()
            } else {
                vec![0.0; y.len()]
            }
        }
        NormKind::Vector => {
            let norm = y.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                y.iter().map(|v| v / norm).collect()
            } else {
                y.to_vec()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub stage: Stage,
    pub enabled: bool,
}

/// Ordered stage list. Disabled stages stay in the list and are skipped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub stages: Vec<StageConfig>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                StageConfig {
                    stage: Stage::Crop { min: 0.0, max: 4000.0 },
                    enabled: false,
                },
                StageConfig {
                    stage: Stage::SavitzkyGolay { window: 7, poly_order: 3 },
                    enabled: false,
                },
                StageConfig {
                    stage: Stage::BaselineAsls(AslsParams::default()),
                    enabled: false,
                },
                StageConfig {
                    stage: Stage::Normalize { norm: NormKind::MinMax },
                    enabled: false,
                },
            ],
        }
    }
}

impl PreprocessingConfig {
    pub fn new(stages: Vec<StageConfig>) -> Result<Self, ConfigError> {
        let config = Self { stages };
        config.validate()?;
        Ok(config)
    }

    /// Only the given stages, all enabled.
    pub fn enabled(stages: impl IntoIterator<Item = Stage>) -> Result<Self, ConfigError> {
        Self::new(
            stages
                .into_iter()
                .map(|stage| StageConfig { stage, enabled: true })
                .collect(),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stages
            .iter()
            .filter(|s| s.enabled)
            .try_for_each(|s| s.stage.validate())
    }

    pub fn active_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|s| s.enabled).map(|s| &s.stage)
    }

    /// Runs every enabled stage in order on a copy of `spectrum`.
    pub fn apply(&self, spectrum: &Spectrum) -> Result<Spectrum, ProcessingError> {
        self.validate()?;
        let mut current = spectrum.clone();
        for stage in self.active_stages() {
            current = stage.apply(current)?;
            debug!("stage {} -> {} samples", stage.name(), current.len());
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::AxisUnit;

    fn ramp(n: usize) -> Spectrum {
        let axis = (0..n).map(|i| 100.0 + i as f64).collect();
        let intensity = (0..n).map(|i| (i % 7) as f64).collect();
        Spectrum::new(axis, intensity, AxisUnit::RamanShift).unwrap()
    }

    #[test]
    fn crop_is_inclusive() {
        let p = PreprocessingConfig::enabled([Stage::Crop { min: 110.0, max: 119.0 }]).unwrap();
        let out = p.apply(&ramp(50)).unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(out.axis()[0], 110.0);
        assert_eq!(out.axis()[9], 119.0);
    }

    #[test]
    fn disabled_stages_are_skipped_but_kept() {
        let config = PreprocessingConfig::default();
        let s = ramp(30);
        assert_eq!(config.apply(&s).unwrap(), s);
        assert_eq!(config.stages.len(), 4);
    }

    #[test]
    fn invalid_stage_rejected_up_front() {
        assert!(PreprocessingConfig::enabled([Stage::Crop { min: 5.0, max: 5.0 }]).is_err());
        assert!(PreprocessingConfig::enabled([Stage::SavitzkyGolay { window: 4, poly_order: 2 }]).is_err());
    }

    #[test]
    fn window_longer_than_cropped_spectrum_fails() {
        let p = PreprocessingConfig::enabled([
            Stage::Crop { min: 100.0, max: 104.0 },
            Stage::SavitzkyGolay { window: 7, poly_order: 3 },
        ])
        .unwrap();
        assert_eq!(
            p.apply(&ramp(40)),
            Err(ProcessingError::Config(ConfigError::WindowTooLong { window: 7, len: 5 }))
        );
    }

    #[test]
    fn normalization_modes() {
        assert_eq!(normalize(&[2.0, 4.0, 6.0], NormKind::MinMax), vec![0.0, 0.5, 1.0]);
        assert_eq!(normalize(&[3.0, 3.0], NormKind::MinMax), vec![0.0, 0.0]);
        assert_eq!(normalize(&[3.0, 4.0], NormKind::Vector), vec![0.6, 0.8]);
        assert_eq!(normalize(&[0.0, 0.0], NormKind::Vector), vec![0.0, 0.0]);
    }

    #[test]
    fn order_matters() {
        let s = ramp(40);
        let a = PreprocessingConfig::enabled([
            Stage::Normalize { norm: NormKind::MinMax },
            Stage::Crop { min: 101.0, max: 103.0 },
        ])
        .unwrap();
        let b = PreprocessingConfig::enabled([
            Stage::Crop { min: 101.0, max: 103.0 },
            Stage::Normalize { norm: NormKind::MinMax },
        ])
        .unwrap();
        assert_ne!(a.apply(&s).unwrap(), b.apply(&s).unwrap());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = PreprocessingConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PreprocessingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
