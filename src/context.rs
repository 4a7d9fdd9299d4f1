// src/context.rs
// 应用上下文：取代全局状态，持有会话、标定、背景、光谱库与当前光谱
use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::calibration::{AxisCalibrator, SoftCalibration};
use crate::cancel::{CancellationToken, SearchObserver};
use crate::config::AppConfig;
use crate::error::{AcquisitionError, ConfigError, DataFileError, SpectrumError};
use crate::library::{search, Library, SearchOptions, SearchOutcome, SearchResult};
use crate::processing::peaks::{detect_peaks, Peak, PeakSettings};
use crate::processing::pipeline::PreprocessingConfig;
use crate::protocol::{DeviceSession, RawSpectrum, PIXEL_COUNT};
use crate::spectrum::Spectrum;

/// Frames-per-second over roughly one-second windows.
#[derive(Debug)]
pub struct FpsCounter {
    frames: u32,
    since: Instant,
    last: Option<f64>,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
            last: None,
        }
    }
}

impl FpsCounter {
    /// Counts a frame; returns a fresh rate once a full second has passed.
    pub fn tick(&mut self) -> Option<f64> {
        self.frames += 1;
        let elapsed = self.since.elapsed();
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.since = Instant::now();
        self.last = Some(fps);
        Some(fps)
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

/// Where the spectrum being worked on came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpectrumSource {
    Device,
    Library(String),
    External,
}

pub struct SpectrometerContext {
    pub session: DeviceSession,
    calibrator: AxisCalibrator,
    processing: PreprocessingConfig,
    peak_detection: Option<PeakSettings>,
    search_options: SearchOptions,
    library: Library,
    background: Option<Vec<f64>>,
    raw_counts: Option<Vec<f64>>,
    source: SpectrumSource,
    original: Option<Spectrum>,
    current: Option<Spectrum>,
    processed: bool,
    peaks: Vec<Peak>,
    results: Vec<SearchResult>,
    acquisitions: u64,
    fps: FpsCounter,
}

impl SpectrometerContext {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            session: DeviceSession::new(config.device.session.clone()),
            calibrator: AxisCalibrator::new(config.axis.clone())?,
            processing: config.processing.clone(),
            peak_detection: config.peaks.enabled.then_some(config.peaks.settings),
            search_options: config.search.clone(),
            library: Library::new(),
            background: None,
            raw_counts: None,
            source: SpectrumSource::Device,
            original: None,
            current: None,
            processed: false,
            peaks: Vec::new(),
            results: Vec::new(),
            acquisitions: 0,
            fps: FpsCounter::default(),
        })
    }

    pub fn calibrator(&self) -> &AxisCalibrator {
        &self.calibrator
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut Library {
        &mut self.library
    }

    /// Replaces the whole library; previous search results are dropped.
    pub fn set_library(&mut self, library: Library) {
        self.library = library;
        self.results.clear();
    }

    pub fn processing(&self) -> &PreprocessingConfig {
        &self.processing
    }

    pub fn set_processing(&mut self, config: PreprocessingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.processing = config;
        Ok(())
    }

    pub fn set_peak_detection(&mut self, settings: Option<PeakSettings>) {
        self.peak_detection = settings;
    }

    pub fn search_options(&self) -> &SearchOptions {
        &self.search_options
    }

    pub fn set_search_options(&mut self, options: SearchOptions) -> Result<(), ConfigError> {
        options.validate()?;
        self.search_options = options;
        Ok(())
    }

    pub fn original(&self) -> Option<&Spectrum> {
        self.original.as_ref()
    }

    pub fn current(&self) -> Option<&Spectrum> {
        self.current.as_ref()
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn source(&self) -> &SpectrumSource {
        &self.source
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps.last()
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    /// Single acquisition kept as background when the read was valid.
    pub fn acquire_background(&mut self) -> Result<bool, AcquisitionError> {
        let raw = self.session.acquire()?;
        if raw.valid {
            self.background = Some(raw.counts);
            info!("background is acquired");
            Ok(true)
        } else {
            warn!("background acquisition failed");
            Ok(false)
        }
    }

    pub fn clear_background(&mut self) {
        self.background = None;
        info!("background cleared");
    }

    fn subtract_background(&self, mut counts: Vec<f64>, clamp: bool) -> Vec<f64> {
        if let Some(bg) = &self.background {
            if bg.len() == counts.len() {
                for (c, b) in counts.iter_mut().zip(bg) {
                    *c -= b;
                    if clamp && *c < 0.0 {
                        *c = 0.0;
                    }
                }
            } else {
                warn!("background has {} samples, spectrum {}; not subtracted", bg.len(), counts.len());
            }
        }
        counts
    }

    fn install_raw(&mut self, raw: RawSpectrum, clamp: bool) -> Result<&Spectrum, AcquisitionError> {
        let counts = self.subtract_background(raw.counts, clamp);
        let spectrum = self.calibrator.calibrate(counts.clone())?;
        self.raw_counts = Some(counts);
        self.source = SpectrumSource::Device;
        self.original = Some(spectrum.clone());
        self.processed = false;
        self.peaks.clear();
        self.acquisitions += 1;
        if let Some(fps) = self.fps.tick() {
            info!("FPS: {}", fps as u32);
        }
        Ok(self.current.insert(spectrum))
    }

    /// One single-shot acquisition. The background is subtracted as is;
    /// values may go negative.
    pub fn acquire_single(&mut self) -> Result<&Spectrum, AcquisitionError> {
        let raw = self.session.acquire()?;
        self.install_raw(raw, false)
    }

    /// One iteration of continuous acquisition: background-subtracted values
    /// are clamped at zero.
    pub fn acquire_frame(&mut self) -> Result<&Spectrum, AcquisitionError> {
        let raw = self.session.acquire()?;
        self.install_raw(raw, true)
    }

    /// Acquires frames until `cancel` fires or `max_frames` were taken, then
    /// sends stop. Returns the number of frames.
    pub fn run_continuous(
        &mut self,
        cancel: &CancellationToken,
        max_frames: Option<usize>,
        mut on_frame: impl FnMut(&Spectrum),
    ) -> Result<usize, AcquisitionError> {
        self.session.begin_acquisition()?;
        let mut frames = 0;
        let outcome = loop {
            if cancel.is_cancelled() || max_frames.is_some_and(|max| frames >= max) {
                break Ok(frames);
            }
            match self.acquire_frame() {
                Ok(spectrum) => on_frame(spectrum),
                Err(e) => break Err(e),
            }
            frames += 1;
            std::thread::yield_now();
        };
        if let Err(e) = self.session.stop() {
            warn!("stop after continuous acquisition failed: {e}");
        }
        outcome
    }

    /// Rebuilds the axis of a device spectrum after a calibration change.
    /// Processing is discarded.
    pub fn recalibrate(&mut self) -> Result<(), AcquisitionError> {
        if self.source != SpectrumSource::Device {
            return Ok(());
        }
        if let Some(counts) = &self.raw_counts {
            let spectrum = self.calibrator.calibrate(counts.clone())?;
            self.original = Some(spectrum.clone());
            self.current = Some(spectrum);
            self.processed = false;
            self.peaks.clear();
        }
        Ok(())
    }

    /// Installs `candidate` only if it yields a valid axis; the working
    /// spectrum of a device reading is rebuilt on the new axis.
    fn commit_calibrator(&mut self, candidate: AxisCalibrator) -> Result<(), SpectrumError> {
        let rebuilt = match (&self.source, &self.raw_counts) {
            (SpectrumSource::Device, Some(counts)) => Some(candidate.calibrate(counts.clone())?),
            _ => {
                candidate.calibrate(vec![0.0; PIXEL_COUNT])?;
                None
            }
        };
        self.calibrator = candidate;
        if let Some(spectrum) = rebuilt {
            self.original = Some(spectrum.clone());
            self.current = Some(spectrum);
            self.processed = false;
            self.peaks.clear();
        }
        Ok(())
    }

    pub fn set_wavelength_range(&mut self, min: f64, max: f64) -> Result<(), AcquisitionError> {
        let mut candidate = self.calibrator.clone();
        candidate.set_wavelength_range(min, max)?;
        Ok(self.commit_calibrator(candidate)?)
    }

    pub fn set_raman(&mut self, raman: bool) -> Result<(), AcquisitionError> {
        let mut candidate = self.calibrator.clone();
        candidate.set_raman(raman);
        Ok(self.commit_calibrator(candidate)?)
    }

    pub fn set_excitation(&mut self, excitation_nm: f64) -> Result<(), AcquisitionError> {
        let mut candidate = self.calibrator.clone();
        candidate.set_excitation(excitation_nm)?;
        Ok(self.commit_calibrator(candidate)?)
    }

    /// Fits and installs a software calibration. A fit whose axis is not
    /// monotonic is rejected and the calibrator is left as it was.
    pub fn fit_calibration(&mut self, points: &[(f64, f64)]) -> Result<SoftCalibration, AcquisitionError> {
        let mut candidate = self.calibrator.clone();
        let soft = candidate.fit_soft_calibration(points)?;
        self.commit_calibrator(candidate)?;
        Ok(soft)
    }

    /// Loads a software calibration file and switches to Raman mode.
    pub fn load_calibration(&mut self, path: impl AsRef<Path>) -> Result<SoftCalibration, DataFileError> {
        let soft = SoftCalibration::load_csv(path)?;
        let mut candidate = self.calibrator.clone();
        candidate.install_soft_calibration(soft);
        self.commit_calibrator(candidate)?;
        Ok(soft)
    }

    pub fn save_calibration(&self, path: impl AsRef<Path>) -> Result<bool, DataFileError> {
        match self.calibrator.soft_calibration() {
            Some(soft) => soft.save_csv(path).map(|_| true),
            None => {
                warn!("no calibration to save");
                Ok(false)
            }
        }
    }

    /// Makes a library spectrum the working spectrum.
    pub fn use_library_spectrum(&mut self, key: &str) -> Result<&Spectrum, AcquisitionError> {
        let spectrum = self
            .library
            .get(key)
            .map(|e| e.spectrum.clone())
            .ok_or(AcquisitionError::NoSpectrum("unknown library key"))?;
        Ok(self.set_spectrum(spectrum, SpectrumSource::Library(key.to_string())))
    }

    /// Installs a spectrum from outside the device (a file, another tool).
    pub fn load_spectrum(&mut self, spectrum: Spectrum) -> &Spectrum {
        self.set_spectrum(spectrum, SpectrumSource::External)
    }

    fn set_spectrum(&mut self, spectrum: Spectrum, source: SpectrumSource) -> &Spectrum {
        self.source = source;
        self.raw_counts = None;
        self.original = Some(spectrum.clone());
        self.processed = false;
        self.peaks.clear();
        self.current.insert(spectrum)
    }

    /// Runs the configured pipeline on the unprocessed spectrum, then picks
    /// peaks when enabled. Repeated calls never stack stages.
    pub fn apply_processing(&mut self) -> Result<&Spectrum, AcquisitionError> {
        let original = self
            .original
            .as_ref()
            .ok_or(AcquisitionError::NoSpectrum("nothing acquired yet"))?;
        let processed = self.processing.apply(original)?;
        self.peaks = match &self.peak_detection {
            Some(settings) => detect_peaks(&processed, settings),
            None => Vec::new(),
        };
        if !self.peaks.is_empty() {
            info!("peaks found at {:?}", self.peaks.iter().map(|p| p.position).collect::<Vec<_>>());
        }
        self.processed = true;
        Ok(self.current.insert(processed))
    }

    /// Restores the unprocessed spectrum.
    pub fn revert_processing(&mut self) {
        if let Some(original) = &self.original {
            self.current = Some(original.clone());
            self.processed = false;
            self.peaks.clear();
        }
    }

    /// Adds the working spectrum to the library under `name`.
    pub fn add_current_to_library(&mut self, name: &str) -> Result<String, AcquisitionError> {
        let spectrum = self
            .current
            .clone()
            .ok_or(AcquisitionError::NoSpectrum("no spectrum to add"))?;
        self.library
            .add_spectrum(name, spectrum)
            .ok_or(AcquisitionError::NoSpectrum("blank spectrum name"))
    }

    /// Searches the library with the working spectrum. Completed rankings are
    /// kept; a cancelled search leaves the previous results untouched.
    pub fn search(&mut self, observer: &mut dyn SearchObserver) -> Result<SearchOutcome, AcquisitionError> {
        let query = self
            .current
            .as_ref()
            .ok_or(AcquisitionError::NoSpectrum("no spectrum to search with"))?;
        if self.library.is_empty() {
            info!("library is empty - skipping search");
        }
        // Library entries only go through the pipeline the query went through.
        let pipeline = self.processed.then_some(&self.processing);
        let outcome = search(query, &self.library, pipeline, &self.search_options, observer)?;
        match &outcome {
            SearchOutcome::Completed(rows) => self.results = rows.clone(),
            SearchOutcome::Cancelled => info!("search canceled"),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::encode_spectrum_reply;
    use crate::protocol::{ScriptedTransport, SessionConfig};
    use crate::processing::pipeline::Stage;

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.device.session = SessionConfig {
            reply_timeout_ms: 20,
            read_timeout_ms: 20,
            settle_ms: 0,
            average: 1,
        };
        config
    }

    fn reply(level: u16) -> Vec<u8> {
        encode_spectrum_reply(&vec![level; PIXEL_COUNT])
    }

    fn connected(replies: Vec<Vec<u8>>) -> SpectrometerContext {
        let mut ctx = SpectrometerContext::new(&fast_config()).unwrap();
        ctx.session.attach(Box::new(ScriptedTransport::with_replies(replies)));
        ctx
    }

    #[test]
    fn acquisition_without_port_is_an_error() {
        let mut ctx = SpectrometerContext::new(&fast_config()).unwrap();
        assert!(ctx.acquire_single().is_err());
        assert!(ctx.current().is_none());
    }

    #[test]
    fn background_single_vs_continuous() {
        let mut ctx = connected(vec![reply(100), reply(60), reply(60)]);
        assert!(ctx.acquire_background().unwrap());
        let single = ctx.acquire_single().unwrap();
        assert_eq!(single.intensity()[0], -40.0);
        let frame = ctx.acquire_frame().unwrap();
        assert_eq!(frame.intensity()[0], 0.0);
        assert_eq!(ctx.acquisitions(), 2);
    }

    #[test]
    fn processing_restarts_from_original() {
        let mut ctx = connected(vec![reply(10)]);
        ctx.acquire_single().unwrap();
        ctx.set_processing(
            PreprocessingConfig::enabled([Stage::Crop { min: 800.0, max: 900.0 }]).unwrap(),
        )
        .unwrap();
        let first = ctx.apply_processing().unwrap().len();
        let second = ctx.apply_processing().unwrap().len();
        assert_eq!(first, second);
        assert!(first < PIXEL_COUNT);
        ctx.revert_processing();
        assert_eq!(ctx.current().unwrap().len(), PIXEL_COUNT);
        assert!(!ctx.is_processed());
    }

    #[test]
    fn raman_toggle_rebuilds_axis_only() {
        let mut ctx = connected(vec![reply(7)]);
        ctx.acquire_single().unwrap();
        ctx.set_raman(true).unwrap();
        let s = ctx.current().unwrap();
        assert_eq!(s.unit(), crate::spectrum::AxisUnit::RamanShift);
        assert!(s.intensity().iter().all(|v| *v == 7.0));
    }

    #[test]
    fn library_spectrum_becomes_working_spectrum() {
        let mut ctx = SpectrometerContext::new(&fast_config()).unwrap();
        let s = Spectrum::new(vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 0.0], crate::spectrum::AxisUnit::RamanShift).unwrap();
        let key = ctx.library_mut().add_spectrum("Quartz", s.clone()).unwrap();
        assert_eq!(ctx.use_library_spectrum(&key).unwrap(), &s);
        assert_eq!(ctx.source(), &SpectrumSource::Library(key));
        assert!(ctx.use_library_spectrum("missing").is_err());
        assert!(ctx.recalibrate().is_ok());
        assert_eq!(ctx.current(), Some(&s));
    }

    #[test]
    fn continuous_run_stops_after_limit() {
        let mut ctx = connected(vec![reply(1), reply(2), reply(3)]);
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let n = ctx
            .run_continuous(&cancel, Some(3), |s| seen.push(s.intensity()[0]))
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(seen, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn cancelled_continuous_run_takes_no_frames() {
        let mut ctx = connected(vec![reply(1)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(ctx.run_continuous(&cancel, None, |_| {}).unwrap(), 0);
    }

    fn bands() -> Spectrum {
        let axis: Vec<f64> = (0..400).map(|i| 400.0 + i as f64).collect();
        let intensity = axis
            .iter()
            .map(|x| {
                let z = (x - 600.0) / 8.0;
                200.0 + 5000.0 * (-0.5 * z * z).exp()
            })
            .collect();
        Spectrum::new(axis, intensity, crate::spectrum::AxisUnit::RamanShift).unwrap()
    }

    #[test]
    fn unprocessed_query_matches_unprocessed_library() {
        let mut config = fast_config();
        config.processing = PreprocessingConfig::enabled([Stage::Normalize {
            norm: crate::processing::NormKind::MinMax,
        }])
        .unwrap();
        config.search.min_overlap = 100.0;
        let mut ctx = SpectrometerContext::new(&config).unwrap();
        ctx.library_mut().add_spectrum("Same", bands()).unwrap();
        ctx.load_spectrum(bands());
        let outcome = ctx.search(&mut crate::cancel::NoProgress).unwrap();
        let rows = outcome.results();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].distance_score.abs() < 1e-6, "{}", rows[0].distance_score);

        ctx.apply_processing().unwrap();
        let outcome = ctx.search(&mut crate::cancel::NoProgress).unwrap();
        assert!(outcome.results()[0].distance_score.abs() < 1e-6);
    }

    #[test]
    fn rejected_fit_leaves_calibrator_unchanged() {
        let mut ctx = connected(vec![reply(5), reply(6)]);
        ctx.acquire_single().unwrap();
        let before = ctx.current().unwrap().clone();
        let err = ctx
            .fit_calibration(&[(500.0, 500.0), (1000.0, 1200.0), (1500.0, 1000.0)])
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Spectrum(_)));
        assert!(ctx.calibrator().soft_calibration().is_none());
        assert!(!ctx.calibrator().settings().raman);
        assert_eq!(ctx.current(), Some(&before));
        assert!(ctx.acquire_single().is_ok());
    }

    #[test]
    fn rejected_excitation_is_a_config_error() {
        let mut ctx = SpectrometerContext::new(&fast_config()).unwrap();
        let err = ctx.set_excitation(-1.0).unwrap_err();
        assert!(matches!(err, AcquisitionError::Config(_)));
        assert_eq!(ctx.calibrator().settings().excitation_nm, 785.0);
    }

    #[test]
    fn non_monotonic_calibration_file_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration_cur.csv");
        SoftCalibration { a: -1.0e-3, b: 1.0, c: 0.0 }.save_csv(&path).unwrap();
        let mut ctx = SpectrometerContext::new(&fast_config()).unwrap();
        assert!(ctx.load_calibration(&path).is_err());
        assert!(ctx.calibrator().soft_calibration().is_none());
        assert!(!ctx.calibrator().settings().raman);
    }
}
