// src/spectrum.rs
use serde::{Deserialize, Serialize};

use crate::error::SpectrumError;

/// Physical meaning of a spectrum's x values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisUnit {
    #[default]
    Pixel,
    WavelengthNm,
    RamanShift,
}

impl AxisUnit {
    pub fn label(self) -> &'static str {
        match self {
            AxisUnit::Pixel => "Pixel",
            AxisUnit::WavelengthNm => "Wavelength (nm)",
            AxisUnit::RamanShift => "Raman shift (cm-1)",
        }
    }
}

#[derive(Deserialize)]
struct SpectrumData {
    axis: Vec<f64>,
    intensity: Vec<f64>,
    #[serde(default)]
    unit: AxisUnit,
}

/// Intensities sampled on a strictly monotonic axis.
///
/// The axis may run in either direction; equal lengths and strict
/// monotonicity are checked on every construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpectrumData")]
pub struct Spectrum {
    axis: Vec<f64>,
    intensity: Vec<f64>,
    unit: AxisUnit,
}

impl TryFrom<SpectrumData> for Spectrum {
    type Error = SpectrumError;

    fn try_from(data: SpectrumData) -> Result<Self, Self::Error> {
        Spectrum::new(data.axis, data.intensity, data.unit)
    }
}

fn check_monotonic(axis: &[f64]) -> Result<(), SpectrumError> {
    if let Some(i) = axis.iter().position(|v| !v.is_finite()) {
        return Err(SpectrumError::NonMonotonicAxis(i));
    }
    if axis.len() < 2 {
        return Ok(());
    }
    let increasing = axis[1] > axis[0];
    for (i, pair) in axis.windows(2).enumerate() {
        let ok = if increasing { pair[1] > pair[0] } else { pair[1] < pair[0] };
        if !ok {
            return Err(SpectrumError::NonMonotonicAxis(i + 1));
        }
    }
    Ok(())
}

impl Spectrum {
    pub fn new(axis: Vec<f64>, intensity: Vec<f64>, unit: AxisUnit) -> Result<Self, SpectrumError> {
        if axis.len() != intensity.len() {
            return Err(SpectrumError::LengthMismatch {
                axis: axis.len(),
                intensity: intensity.len(),
            });
        }
        check_monotonic(&axis)?;
        Ok(Self { axis, intensity, unit })
    }

    /// Raw counts on the pixel axis `0..len`.
    pub fn from_pixels(counts: Vec<f64>) -> Self {
        let axis = (0..counts.len()).map(|i| i as f64).collect();
        Self {
            axis,
            intensity: counts,
            unit: AxisUnit::Pixel,
        }
    }

    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn unit(&self) -> AxisUnit {
        self.unit
    }

    pub fn len(&self) -> usize {
        self.axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    pub fn is_increasing(&self) -> bool {
        self.axis.len() < 2 || self.axis[1] > self.axis[0]
    }

    /// `(min, max)` of the axis, `None` when empty.
    pub fn axis_range(&self) -> Option<(f64, f64)> {
        let first = *self.axis.first()?;
        let last = *self.axis.last()?;
        Some((first.min(last), first.max(last)))
    }

    /// Mean absolute spacing between neighbouring axis samples.
    pub fn mean_step(&self) -> f64 {
        match self.axis_range() {
            Some((lo, hi)) if self.len() > 1 => (hi - lo) / (self.len() - 1) as f64,
            _ => 0.0,
        }
    }

    /// Same axis, new intensities.
    pub fn with_intensity(&self, intensity: Vec<f64>) -> Result<Self, SpectrumError> {
        Self::new(self.axis.clone(), intensity, self.unit)
    }

    /// New axis, intensities untouched.
    pub fn with_axis(&self, axis: Vec<f64>, unit: AxisUnit) -> Result<Self, SpectrumError> {
        Self::new(axis, self.intensity.clone(), unit)
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>, AxisUnit) {
        (self.axis, self.intensity, self.unit)
    }
}
