// src/calibration.rs
// 轴标定：像素 -> 波长 -> 拉曼位移 -> 软件二次校正
use std::fmt;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DataFileError, SpectrumError};
use crate::processing::interpolate::linspace;
use crate::processing::linalg::{polyfit, polyval};
use crate::spectrum::{AxisUnit, Spectrum};

/// Coefficient groups stored in the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationGroup {
    Wavelength = 1,
    RamanShift = 2,
    Analog = 3,
}

impl CalibrationGroup {
    pub const ALL: [CalibrationGroup; 3] = [
        CalibrationGroup::Wavelength,
        CalibrationGroup::RamanShift,
        CalibrationGroup::Analog,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn index(self) -> usize {
        self as usize - 1
    }

    pub fn label(self) -> &'static str {
        match self {
            CalibrationGroup::Wavelength => "Wavelength",
            CalibrationGroup::RamanShift => "Raman Shift",
            CalibrationGroup::Analog => "Analog/Light Source",
        }
    }
}

impl TryFrom<u8> for CalibrationGroup {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CalibrationGroup::Wavelength),
            2 => Ok(CalibrationGroup::RamanShift),
            3 => Ok(CalibrationGroup::Analog),
            other => Err(ConfigError::UnknownCalibrationGroup(other)),
        }
    }
}

impl fmt::Display for CalibrationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.label())
    }
}

/// Device-side cubic `f0·p³ + f1·p² + f2·p + f3` over the pixel index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCoefficients {
    pub group: CalibrationGroup,
    pub coeffs: [f64; 4],
}

/// Summary of a coefficient group evaluated over the sensor.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisPreview {
    pub group: CalibrationGroup,
    pub axis: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean_step: f64,
}

impl CalibrationCoefficients {
    pub fn new(group: CalibrationGroup, coeffs: [f64; 4]) -> Self {
        Self { group, coeffs }
    }

    pub fn zero(group: CalibrationGroup) -> Self {
        Self::new(group, [0.0; 4])
    }

    /// Tiny cubic and quadratic terms are treated as a straight line.
    pub fn is_linear(&self) -> bool {
        self.coeffs[0].abs() < 1e-12 && self.coeffs[1].abs() < 1e-9
    }

    pub fn evaluate(&self, pixel: f64) -> f64 {
        if self.is_linear() {
            self.coeffs[2] * pixel + self.coeffs[3]
        } else {
            polyval(&self.coeffs, pixel)
        }
    }

    pub fn preview(&self, pixels: usize) -> AxisPreview {
        let axis: Vec<f64> = (0..pixels).map(|p| self.evaluate(p as f64)).collect();
        let min = axis.iter().copied().fold(f64::INFINITY, f64::min);
        let max = axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_step = if pixels > 1 { (max - min) / (pixels - 1) as f64 } else { 0.0 };
        AxisPreview {
            group: self.group,
            axis,
            min,
            max,
            mean_step,
        }
    }
}

/// `1e7/excitation − 1e7/wavelength`, in cm⁻¹.
pub fn wavelength_to_raman(wavelength_nm: f64, excitation_nm: f64) -> f64 {
    1e7 / excitation_nm - 1e7 / wavelength_nm
}

/// Quadratic correction `a·s² + b·s + c` applied on top of the Raman shift.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftCalibration {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl SoftCalibration {
    pub const MIN_POINTS: usize = 3;

    /// Least-squares quadratic through `(observed, expected)` pairs.
    pub fn fit(points: &[(f64, f64)]) -> Result<Self, ConfigError> {
        if points.len() < Self::MIN_POINTS {
            return Err(ConfigError::InsufficientCalibrationPoints {
                required: Self::MIN_POINTS,
                actual: points.len(),
            });
        }
        let (observed, expected): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
        let coeffs = polyfit(&observed, &expected, 2).ok_or(ConfigError::SingularFit)?;
        Ok(Self {
            a: coeffs[0],
            b: coeffs[1],
            c: coeffs[2],
        })
    }

    pub fn apply(&self, shift: f64) -> f64 {
        self.a * shift * shift + self.b * shift + self.c
    }

    /// First three numeric values of a headerless CSV file, read row by row.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self, DataFileError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path.as_ref())?;
        let mut values = Vec::with_capacity(3);
        for record in reader.records() {
            let record = record?;
            values.extend(record.iter().filter_map(|field| field.trim().parse::<f64>().ok()));
            if values.len() >= 3 {
                break;
            }
        }
        if values.len() < 3 {
            return Err(ConfigError::ShortCalibrationFile(values.len()).into());
        }
        let soft = Self {
            a: values[0],
            b: values[1],
            c: values[2],
        };
        info!("loaded calibration {} -> [{}, {}, {}]", path.as_ref().display(), soft.a, soft.b, soft.c);
        Ok(soft)
    }

    /// One coefficient per row, no header.
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<(), DataFileError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path.as_ref())?;
        for value in [self.a, self.b, self.c] {
            writer.write_record([value.to_string()])?;
        }
        writer.flush()?;
        info!("saved calibration to {}", path.as_ref().display());
        Ok(())
    }
}

/// Axis parameters. Defaults match the stock 2048-pixel NIR sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisSettings {
    pub wavelength_min: f64,
    pub wavelength_max: f64,
    pub excitation_nm: f64,
    pub raman: bool,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            wavelength_min: 796.0,
            wavelength_max: 1119.0,
            excitation_nm: 785.0,
            raman: false,
        }
    }
}

impl AxisSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.wavelength_min < self.wavelength_max) {
            return Err(ConfigError::InvalidRange {
                min: self.wavelength_min,
                max: self.wavelength_max,
            });
        }
        if !(self.excitation_nm > 0.0) {
            return Err(ConfigError::InvalidExcitation(self.excitation_nm));
        }
        Ok(())
    }
}

/// Builds the physical axis for raw pixel data. Never touches intensities.
#[derive(Clone, Debug, Default)]
pub struct AxisCalibrator {
    settings: AxisSettings,
    soft: Option<SoftCalibration>,
}

impl AxisCalibrator {
    pub fn new(settings: AxisSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings, soft: None })
    }

    pub fn settings(&self) -> &AxisSettings {
        &self.settings
    }

    pub fn soft_calibration(&self) -> Option<&SoftCalibration> {
        self.soft.as_ref()
    }

    pub fn set_wavelength_range(&mut self, min: f64, max: f64) -> Result<(), ConfigError> {
        let next = AxisSettings {
            wavelength_min: min,
            wavelength_max: max,
            ..self.settings.clone()
        };
        next.validate()?;
        self.settings = next;
        info!("updated wavelength range: {min} - {max}");
        Ok(())
    }

    pub fn set_excitation(&mut self, excitation_nm: f64) -> Result<(), ConfigError> {
        let next = AxisSettings {
            excitation_nm,
            ..self.settings.clone()
        };
        next.validate()?;
        self.settings = next;
        Ok(())
    }

    pub fn set_raman(&mut self, raman: bool) {
        self.settings.raman = raman;
    }

    /// Installs a software correction and switches to Raman mode.
    pub fn install_soft_calibration(&mut self, soft: SoftCalibration) {
        self.soft = Some(soft);
        self.settings.raman = true;
    }

    pub fn clear_soft_calibration(&mut self) {
        self.soft = None;
    }

    pub fn fit_soft_calibration(&mut self, points: &[(f64, f64)]) -> Result<SoftCalibration, ConfigError> {
        let soft = SoftCalibration::fit(points)?;
        info!("fitted calibration coeffs: [{}, {}, {}]", soft.a, soft.b, soft.c);
        self.install_soft_calibration(soft);
        Ok(soft)
    }

    pub fn wavelength_axis(&self, n: usize) -> Vec<f64> {
        linspace(self.settings.wavelength_min, self.settings.wavelength_max, n)
    }

    pub fn unit(&self) -> AxisUnit {
        if self.settings.raman {
            AxisUnit::RamanShift
        } else {
            AxisUnit::WavelengthNm
        }
    }

    /// Current axis for `n` pixels.
    pub fn axis(&self, n: usize) -> Vec<f64> {
        let wavelengths = self.wavelength_axis(n);
        if !self.settings.raman {
            return wavelengths;
        }
        let excitation = self.settings.excitation_nm;
        wavelengths
            .into_iter()
            .map(|wl| {
                let shift = wavelength_to_raman(wl, excitation);
                match &self.soft {
                    Some(soft) => soft.apply(shift),
                    None => shift,
                }
            })
            .collect()
    }

    /// Attaches the current axis to raw counts.
    pub fn calibrate(&self, counts: Vec<f64>) -> Result<Spectrum, SpectrumError> {
        let axis = self.axis(counts.len());
        Spectrum::new(axis, counts, self.unit())
    }

    /// Recomputes the axis of an existing spectrum, intensities untouched.
    pub fn recalibrate(&self, spectrum: &Spectrum) -> Result<Spectrum, SpectrumError> {
        spectrum.with_axis(self.axis(spectrum.len()), self.unit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PIXEL_COUNT;
    use tempfile::tempdir;

    #[test]
    fn wavelength_axis_endpoints_exact() {
        let cal = AxisCalibrator::new(AxisSettings::default()).unwrap();
        let axis = cal.axis(PIXEL_COUNT);
        assert_eq!(axis.len(), 2048);
        assert_eq!(axis[0], 796.0);
        assert_eq!(axis[2047], 1119.0);
        assert!(axis.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn invalid_range_is_rejected_without_mutation() {
        let mut cal = AxisCalibrator::default();
        assert!(cal.set_wavelength_range(900.0, 900.0).is_err());
        assert_eq!(cal.settings().wavelength_min, 796.0);
        assert!(AxisCalibrator::new(AxisSettings { excitation_nm: 0.0, ..Default::default() }).is_err());
    }

    #[test]
    fn raman_shift_conversion() {
        assert!((wavelength_to_raman(785.0, 785.0)).abs() < 1e-9);
        let s = wavelength_to_raman(850.0, 785.0);
        assert!((s - (1e7 / 785.0 - 1e7 / 850.0)).abs() < 1e-9);
        let mut cal = AxisCalibrator::default();
        cal.set_raman(true);
        let axis = cal.axis(2048);
        assert!((axis[0] - wavelength_to_raman(796.0, 785.0)).abs() < 1e-9);
    }

    #[test]
    fn quadratic_fit_recovers_coefficients() {
        let truth = SoftCalibration { a: 1.5e-5, b: 0.98, c: 3.2 };
        let points: Vec<(f64, f64)> = [200.0, 520.0, 1001.0, 1450.0, 1602.0]
            .iter()
            .map(|&s| (s, truth.apply(s)))
            .collect();
        let fit = SoftCalibration::fit(&points).unwrap();
        assert!((fit.a - truth.a).abs() < 1e-10);
        assert!((fit.b - truth.b).abs() < 1e-7);
        assert!((fit.c - truth.c).abs() < 1e-4);
    }

    #[test]
    fn three_exact_points_give_the_quadratic() {
        let truth = SoftCalibration { a: -2.0e-4, b: 1.1, c: -7.5 };
        let points: Vec<(f64, f64)> = [300.0, 900.0, 1500.0].iter().map(|&s| (s, truth.apply(s))).collect();
        let fit = SoftCalibration::fit(&points).unwrap();
        assert!((fit.a - truth.a).abs() < 1e-10);
        assert!((fit.b - truth.b).abs() < 1e-7);
        assert!((fit.c - truth.c).abs() < 1e-4);
    }

    #[test]
    fn fit_needs_three_points_and_leaves_state() {
        let mut cal = AxisCalibrator::default();
        let err = cal.fit_soft_calibration(&[(1.0, 1.0), (2.0, 2.0)]).unwrap_err();
        assert_eq!(err, ConfigError::InsufficientCalibrationPoints { required: 3, actual: 2 });
        assert!(cal.soft_calibration().is_none());
        assert!(!cal.settings().raman);
    }

    #[test]
    fn fitting_enables_raman_and_changes_axis_only() {
        let mut cal = AxisCalibrator::default();
        let raw = Spectrum::from_pixels(vec![1.0; 16]);
        cal.fit_soft_calibration(&[(100.0, 102.0), (500.0, 505.0), (1000.0, 1009.0)]).unwrap();
        let s = cal.recalibrate(&raw).unwrap();
        assert_eq!(s.unit(), AxisUnit::RamanShift);
        assert_eq!(s.intensity(), raw.intensity());
    }

    #[test]
    fn calibration_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calibration_cur.csv");
        let soft = SoftCalibration { a: -2.5e-6, b: 1.01, c: -4.0 };
        soft.save_csv(&path).unwrap();
        assert_eq!(SoftCalibration::load_csv(&path).unwrap(), soft);
    }

    #[test]
    fn short_calibration_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.csv");
        std::fs::write(&path, "1.0\n2.0\n").unwrap();
        assert!(matches!(
            SoftCalibration::load_csv(&path),
            Err(DataFileError::Config(ConfigError::ShortCalibrationFile(2)))
        ));
    }

    #[test]
    fn preview_uses_linear_form_for_tiny_terms() {
        let coeffs = CalibrationCoefficients::new(CalibrationGroup::Wavelength, [1e-13, 1e-10, 0.5, 100.0]);
        assert!(coeffs.is_linear());
        let preview = coeffs.preview(2048);
        assert_eq!(preview.min, 100.0);
        assert_eq!(preview.max, 100.0 + 0.5 * 2047.0);
        assert!((preview.mean_step - 0.5).abs() < 1e-12);
    }
}
