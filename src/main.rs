// src/main.rs
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};

use lumispec::calibration::{CalibrationCoefficients, CalibrationGroup, SoftCalibration};
use lumispec::cancel::{CancellationToken, NoProgress};
use lumispec::config::AppConfig;
use lumispec::context::SpectrometerContext;
use lumispec::export;
use lumispec::library::{load_library, save_library, Library, Metric};
use lumispec::plot::{render_spectrum_png, Overlay, PlotStyle};
use lumispec::processing::PeakSettings;
use lumispec::protocol::{available_ports, BaudRate, SerialTransport, SimulatedSpectrometer, Transport, PIXEL_COUNT};
use lumispec::spectrum::AxisUnit;

#[derive(Parser, Debug)]
#[command(name = "lumispec", version, about = "Line-array spectrometer control and spectral library matching")]
struct Cli {
    /// JSON configuration; missing file means defaults.
    #[arg(long, short, global = true, default_value = "lumispec.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Acquire spectra from the device (or the simulator)
    Acquire(AcquireArgs),
    /// Rank library entries against a spectrum file
    Search(SearchArgs),
    /// Inspect or edit a spectral library
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Fit the quadratic Raman-shift correction from `observed:expected` pairs
    FitCalibration {
        #[arg(required = true, value_parser = parse_pair)]
        points: Vec<(f64, f64)>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Evaluate device calibration coefficients over the sensor
    PreviewCalibration {
        /// 1 = wavelength, 2 = Raman shift, 3 = analog
        #[arg(long, default_value_t = 1)]
        group: u8,
        /// f0 f1 f2 f3 (cubic first)
        #[arg(num_args = 4, required = true, allow_negative_numbers = true)]
        coeffs: Vec<f64>,
    },
}

#[derive(Args, Debug)]
struct AcquireArgs {
    /// Use the built-in simulated spectrometer
    #[arg(long)]
    simulate: bool,
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
    /// Number of frames; more than one runs continuous acquisition
    #[arg(long, default_value_t = 1)]
    frames: usize,
    /// Acquire a background first and subtract it
    #[arg(long)]
    background: bool,
    #[arg(long)]
    integration_ms: Option<u16>,
    /// Run the configured preprocessing on the last frame
    #[arg(long)]
    process: bool,
    /// Show Raman shift instead of wavelength
    #[arg(long)]
    raman: bool,
    /// Soft calibration file to apply (enables Raman shift)
    #[arg(long)]
    calibration: Option<PathBuf>,
    #[arg(long, short)]
    output: Option<PathBuf>,
    #[arg(long)]
    peaks_output: Option<PathBuf>,
    #[arg(long)]
    png: Option<PathBuf>,
    /// Add the result to the library under this name and save it
    #[arg(long)]
    add_to_library: Option<String>,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// `x,Intensity` CSV of the query spectrum
    input: PathBuf,
    #[arg(long, value_enum, default_value_t = UnitArg::Raman)]
    unit: UnitArg,
    #[arg(long)]
    library: Option<PathBuf>,
    #[arg(long)]
    metric: Option<Metric>,
    #[arg(long)]
    top_n: Option<usize>,
    #[arg(long)]
    min_overlap: Option<f64>,
    /// Compare library spectra as stored
    #[arg(long)]
    raw_library: bool,
    /// Preprocess the query with the configured pipeline first
    #[arg(long)]
    process: bool,
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Overlay the best match in a PNG
    #[arg(long)]
    png: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum LibraryAction {
    List {
        #[arg(long)]
        library: Option<PathBuf>,
        /// Case-insensitive name filter
        #[arg(long)]
        find: Option<String>,
    },
    Add {
        name: String,
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = UnitArg::Raman)]
        unit: UnitArg,
        #[arg(long)]
        library: Option<PathBuf>,
    },
    Remove {
        key: String,
        #[arg(long)]
        library: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UnitArg {
    Pixel,
    Wavelength,
    Raman,
}

impl From<UnitArg> for AxisUnit {
    fn from(value: UnitArg) -> Self {
        match value {
            UnitArg::Pixel => AxisUnit::Pixel,
            UnitArg::Wavelength => AxisUnit::WavelengthNm,
            UnitArg::Raman => AxisUnit::RamanShift,
        }
    }
}

fn parse_pair(text: &str) -> Result<(f64, f64), String> {
    let (a, b) = text
        .split_once(':')
        .ok_or_else(|| format!("`{text}` is not observed:expected"))?;
    let a = a.trim().parse().map_err(|_| format!("bad number `{a}`"))?;
    let b = b.trim().parse().map_err(|_| format!("bad number `{b}`"))?;
    Ok((a, b))
}

fn load_or_empty(path: &Path) -> Result<Library> {
    if !path.exists() {
        warn!("library {} not found, starting empty", path.display());
        return Ok(Library::new());
    }
    load_library(path).with_context(|| format!("loading library {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    match cli.command {
        Command::Ports => {
            let ports = available_ports()?;
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for port in ports {
                println!("{port}");
            }
        }
        Command::Acquire(args) => acquire(config, args)?,
        Command::Search(args) => search(config, args)?,
        Command::Library { action } => library(config, action)?,
        Command::FitCalibration { points, output } => {
            let soft = SoftCalibration::fit(&points)?;
            println!("a = {:e}\nb = {:e}\nc = {:e}", soft.a, soft.b, soft.c);
            let path = output.unwrap_or(config.paths.calibration);
            soft.save_csv(&path)?;
        }
        Command::PreviewCalibration { group, coeffs } => {
            let group = CalibrationGroup::try_from(group)?;
            let coeffs: [f64; 4] = coeffs
                .try_into()
                .map_err(|_| anyhow::anyhow!("exactly four coefficients are needed"))?;
            let preview = CalibrationCoefficients::new(group, coeffs).preview(PIXEL_COUNT);
            println!(
                "{group}: min {:.4}, max {:.4}, mean step {:.6}",
                preview.min, preview.max, preview.mean_step
            );
        }
    }
    Ok(())
}

fn acquire(mut config: AppConfig, args: AcquireArgs) -> Result<()> {
    if let Some(baud) = args.baud {
        config.device.baud = BaudRate::try_from(baud)?;
    }
    if let Some(port) = args.port {
        config.device.port = port;
    }
    if args.raman {
        config.axis.raman = true;
    }
    let mut ctx = SpectrometerContext::new(&config)?;
    let transport: Box<dyn Transport> = if args.simulate {
        Box::new(SimulatedSpectrometer::new(rand::random()))
    } else {
        if config.device.port.is_empty() {
            bail!("no serial port given; use --port or --simulate");
        }
        Box::new(SerialTransport::open(&config.device.port, config.device.baud)?)
    };
    ctx.session.connect(transport);
    if let Some(ms) = args.integration_ms {
        ctx.session.set_integration_time(ms)?;
    }
    if let Some(path) = &args.calibration {
        ctx.load_calibration(path)?;
    }
    if args.background && !ctx.acquire_background()? {
        warn!("no background stored");
    }

    if args.frames <= 1 {
        ctx.acquire_single()?;
    } else {
        let cancel = CancellationToken::new();
        let frames = ctx.run_continuous(&cancel, Some(args.frames), |_| {})?;
        info!("{frames} frames, {} acquisitions", ctx.acquisitions());
        if let Some(fps) = ctx.fps() {
            info!("FPS: {fps:.1}");
        }
    }
    if args.process {
        ctx.set_peak_detection(Some(if config.peaks.enabled {
            config.peaks.settings
        } else {
            PeakSettings::default()
        }));
        ctx.apply_processing()?;
        for peak in ctx.peaks() {
            println!("peak at {:.2} ({:.4})", peak.position, peak.intensity);
        }
    }

    let spectrum = ctx
        .current()
        .context("no spectrum was acquired")?
        .clone();
    if let Some(path) = &args.output {
        export::save_spectrum(path, &spectrum)?;
    }
    if let Some(path) = &args.peaks_output {
        export::save_peaks(path, ctx.peaks())?;
    }
    if let Some(path) = &args.png {
        let png = render_spectrum_png(&spectrum, None, ctx.peaks(), &PlotStyle::default())?;
        std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(name) = &args.add_to_library {
        let path = config.paths.library.clone();
        ctx.set_library(load_or_empty(&path)?);
        let key = ctx.add_current_to_library(name)?;
        save_library(ctx.library(), &path)?;
        println!("added {key} to {}", path.display());
    }
    ctx.session.disconnect();
    Ok(())
}

fn search(mut config: AppConfig, args: SearchArgs) -> Result<()> {
    if let Some(metric) = args.metric {
        config.search.metric = metric;
    }
    if let Some(top_n) = args.top_n {
        config.search.top_n = top_n;
    }
    if let Some(min_overlap) = args.min_overlap {
        config.search.min_overlap = min_overlap;
    }
    if args.raw_library {
        config.search.preprocess_library = false;
    }
    let query = export::load_spectrum(&args.input, args.unit.into())
        .with_context(|| format!("reading {}", args.input.display()))?;
    let library_path = args.library.unwrap_or_else(|| config.paths.library.clone());
    let mut ctx = SpectrometerContext::new(&config)?;
    ctx.set_library(load_or_empty(&library_path)?);
    ctx.load_spectrum(query);
    if args.process {
        ctx.apply_processing()?;
    }
    let outcome = ctx.search(&mut NoProgress)?;
    for (rank, row) in outcome.results().iter().enumerate() {
        println!("{:>2}. {:<40} {:>14.6} ({})", rank + 1, row.component, row.distance_score, row.metric);
    }
    if outcome.results().is_empty() {
        println!("no matches");
    }
    if let Some(path) = &args.output {
        export::save_results(path, outcome.results())?;
    }
    if let (Some(path), Some(best), Some(query)) = (&args.png, outcome.results().first(), ctx.current()) {
        let reference = ctx
            .library()
            .get(&best.id)
            .map(|entry| entry.spectrum.clone())
            .context("best match vanished from the library")?;
        let overlay = Overlay {
            label: &best.component,
            spectrum: &reference,
        };
        let png = render_spectrum_png(query, Some(overlay), &[], &PlotStyle::default())?;
        std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn library(config: AppConfig, action: LibraryAction) -> Result<()> {
    match action {
        LibraryAction::List { library, find } => {
            let path = library.unwrap_or(config.paths.library);
            let lib = load_or_empty(&path)?;
            match find {
                Some(query) => {
                    for (key, entry) in lib.find_by_name(&query) {
                        println!("{key}\t{}", entry.name);
                    }
                }
                None => {
                    for (name, key) in lib.display_names() {
                        println!("{key}\t{name}");
                    }
                }
            }
            println!("{} entries", lib.len());
        }
        LibraryAction::Add { name, input, unit, library } => {
            let path = library.unwrap_or(config.paths.library);
            let mut lib = load_or_empty(&path)?;
            let spectrum = export::load_spectrum(&input, unit.into())?;
            let key = lib
                .add_spectrum(&name, spectrum)
                .context("library entry name must not be blank")?;
            save_library(&lib, &path)?;
            println!("added {key}");
        }
        LibraryAction::Remove { key, library } => {
            let path = library.unwrap_or(config.paths.library);
            let mut lib = load_or_empty(&path)?;
            let removed = lib.remove(&key)?;
            save_library(&lib, &path)?;
            println!("removed {} ({key})", removed.name);
        }
    }
    Ok(())
}
