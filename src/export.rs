// src/export.rs
// CSV 导出：光谱、峰列表、检索结果
use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::info;

use crate::error::DataFileError;
use crate::library::SearchResult;
use crate::processing::Peak;
use crate::spectrum::{AxisUnit, Spectrum};

/// `x,Intensity` rows, one per sample.
pub fn write_spectrum<W: Write>(out: W, spectrum: &Spectrum) -> Result<(), DataFileError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["x", "Intensity"])?;
    for (x, y) in spectrum.axis().iter().zip(spectrum.intensity()) {
        writer.write_record([x.to_string(), y.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Peak positions and intensities, in axis order.
pub fn write_peaks<W: Write>(out: W, peaks: &[Peak]) -> Result<(), DataFileError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["Raman Shifts", "Intensities"])?;
    for peak in peaks {
        writer.write_record([peak.position.to_string(), peak.intensity.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Ranked search results; the resampled arrays are left out.
pub fn write_results<W: Write>(out: W, results: &[SearchResult]) -> Result<(), DataFileError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["rank", "component", "identifier", "id", "url", "metric", "distance_score"])?;
    for (rank, row) in results.iter().enumerate() {
        writer.write_record([
            (rank + 1).to_string(),
            row.component.clone(),
            row.identifier.clone(),
            row.id.clone(),
            row.url.clone(),
            row.metric.clone(),
            row.distance_score.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a two-column `x,Intensity` file written by [`save_spectrum`].
/// Rows whose first field is not numeric (headers) are skipped.
pub fn load_spectrum(path: impl AsRef<Path>, unit: AxisUnit) -> Result<Spectrum, DataFileError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;
    let mut axis = Vec::new();
    let mut intensity = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let (Some(x), Some(y)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let Ok(x) = x.trim().parse::<f64>() else {
            if axis.is_empty() {
                continue;
            }
            return Err(DataFileError::BadNumber { line, value: x.to_string() });
        };
        let y = y.trim().parse::<f64>().map_err(|_| DataFileError::BadNumber {
            line,
            value: y.to_string(),
        })?;
        axis.push(x);
        intensity.push(y);
    }
    Ok(Spectrum::new(axis, intensity, unit)?)
}

fn create(path: &Path) -> Result<File, DataFileError> {
    Ok(File::create(path)?)
}

pub fn save_spectrum(path: impl AsRef<Path>, spectrum: &Spectrum) -> Result<(), DataFileError> {
    let path = path.as_ref();
    write_spectrum(create(path)?, spectrum)?;
    info!("data saved to {}", path.display());
    Ok(())
}

pub fn save_peaks(path: impl AsRef<Path>, peaks: &[Peak]) -> Result<(), DataFileError> {
    let path = path.as_ref();
    write_peaks(create(path)?, peaks)?;
    info!("{} peaks saved to {}", peaks.len(), path.display());
    Ok(())
}

pub fn save_results(path: impl AsRef<Path>, results: &[SearchResult]) -> Result<(), DataFileError> {
    let path = path.as_ref();
    write_results(create(path)?, results)?;
    info!("search results saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrum_rows_follow_header() {
        let s = Spectrum::new(vec![1.0, 2.5], vec![10.0, -3.0], AxisUnit::RamanShift).unwrap();
        let mut out = Vec::new();
        write_spectrum(&mut out, &s).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x,Intensity\n1,10\n2.5,-3\n");
    }

    #[test]
    fn saved_spectrum_loads_back() {
        let s = Spectrum::new(vec![400.0, 401.0, 402.0], vec![1.0, 5.0, 2.0], AxisUnit::RamanShift).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        save_spectrum(&path, &s).unwrap();
        assert_eq!(load_spectrum(&path, AxisUnit::RamanShift).unwrap(), s);
    }

    #[test]
    fn peaks_use_shift_columns() {
        let peaks = [Peak {
            index: 4,
            position: 1001.5,
            intensity: 0.75,
            prominence: 0.5,
            width: 3.0,
        }];
        let mut out = Vec::new();
        write_peaks(&mut out, &peaks).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Raman Shifts,Intensities\n1001.5,0.75\n");
    }

    #[test]
    fn results_are_ranked_from_one() {
        let row = SearchResult {
            component: "Ethanol".into(),
            url: String::new(),
            id: "k1".into(),
            identifier: "Ethanol".into(),
            distance_score: 0.25,
            aligned_intensity_comp: vec![1.0],
            spectral_axis_comp: vec![2.0],
            metric: "sad".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save_results(&path, &[row]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("rank,component,identifier,id,url,metric,distance_score"));
        assert_eq!(lines.next(), Some("1,Ethanol,Ethanol,k1,,sad,0.25"));
    }
}
