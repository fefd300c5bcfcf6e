//! psvtrace CLI: peak systolic velocity extraction from the command line.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use psvtrace::{
    BatchInputs, CalibrationMarkers, ImageInputs, PsvAnalyzer, PsvConfig, RefPoint, ReportStatus,
    Roi, ThresholdMode, VelocityScale,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "psvtrace")]
#[command(about = "Measure peak systolic velocity in spectral Doppler ultrasound images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single image.
    Analyze(CliAnalyzeArgs),

    /// Analyze every .jpg/.jpeg/.png image in a folder.
    Batch(CliBatchArgs),

    /// Print the effective configuration as JSON.
    PrintConfig(CliConfigArgs),
}

#[derive(Debug, Clone, Args)]
struct CliAnalyzeArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    inputs: CliInputArgs,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args)]
struct CliBatchArgs {
    /// JSON file with batch-wide and per-image ROI / scale markers.
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// Analyze images on all cores.
    #[arg(long)]
    parallel: bool,

    // Batch-wide ROI / markers; with --inputs they become the default.
    #[command(flatten)]
    image_inputs: CliInputArgs,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args, Default)]
struct CliInputArgs {
    /// Region of interest as x0,y0,x1,y1 in normalized image pixels.
    #[arg(long, value_parser = parse_roi)]
    roi: Option<Roi>,

    /// Two time markers as pixel:value,pixel:value (image columns).
    #[arg(long, value_parser = parse_marker_pair)]
    time_markers: Option<MarkerPair>,

    /// Two velocity markers as pixel:value,pixel:value (image rows).
    #[arg(long, value_parser = parse_marker_pair, conflicts_with = "velocity_range")]
    velocity_markers: Option<MarkerPair>,

    /// Velocity at the ROI bottom and top edge as bottom,top. The edges are
    /// taken after the ROI is clamped to the image.
    #[arg(long, value_parser = parse_value_range)]
    velocity_range: Option<ValueRange>,
}

#[derive(Debug, Clone, Args, Default)]
struct CliConfigArgs {
    /// JSON configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder scanned for input images.
    #[arg(long)]
    input_folder: Option<PathBuf>,

    /// Folder receiving all artifacts.
    #[arg(long)]
    output_folder: Option<PathBuf>,

    /// Canonical image width in pixels.
    #[arg(long)]
    target_width: Option<u32>,

    /// Envelope band height in rows (odd).
    #[arg(long)]
    band_width: Option<u32>,

    /// Minimum column distance between peaks.
    #[arg(long)]
    dist_min: Option<usize>,

    /// Minimum prominence as a multiple of the signal std.
    #[arg(long)]
    prominence_factor: Option<f64>,

    /// Minimum height as a fraction of the signal range.
    #[arg(long)]
    height_factor: Option<f64>,

    /// Background intensity cutoff (0-255).
    #[arg(long)]
    brightness_threshold: Option<u8>,

    /// Baseline formula for the minimum peak height.
    #[arg(long, value_enum)]
    threshold_mode: Option<ThresholdModeArg>,

    /// Also write the cropped region.
    #[arg(long)]
    save_cropped: bool,

    /// Also write the full report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThresholdModeArg {
    Range,
    MeanStd,
}

impl ThresholdModeArg {
    fn to_core(self) -> ThresholdMode {
        match self {
            Self::Range => ThresholdMode::Range,
            Self::MeanStd => ThresholdMode::MeanStd,
        }
    }
}

type MarkerPair = [RefPoint; 2];

#[derive(Debug, Clone, Copy)]
struct ValueRange {
    bottom: f64,
    top: f64,
}

// ── argument parsing ───────────────────────────────────────────────────

fn parse_numbers<const N: usize>(s: &str, sep: char) -> Result<[f64; N], String> {
    let parts: Vec<&str> = s.split(sep).map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {} values separated by '{}', got '{}'", N, sep, s));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|e| format!("invalid number '{}': {}", part, e))?;
    }
    Ok(out)
}

fn parse_roi(s: &str) -> Result<Roi, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected x0,y0,x1,y1, got '{}'", s));
    }
    let mut v = [0i64; 4];
    for (slot, part) in v.iter_mut().zip(parts) {
        *slot = part
            .parse::<i64>()
            .map_err(|e| format!("invalid coordinate '{}': {}", part, e))?;
    }
    Ok(Roi::new(v[0], v[1], v[2], v[3]))
}

fn parse_marker_pair(s: &str) -> Result<MarkerPair, String> {
    let points: Vec<&str> = s.split(',').collect();
    if points.len() != 2 {
        return Err(format!("expected pixel:value,pixel:value, got '{}'", s));
    }
    let a = parse_numbers::<2>(points[0], ':')?;
    let b = parse_numbers::<2>(points[1], ':')?;
    Ok([RefPoint::new(a[0], a[1]), RefPoint::new(b[0], b[1])])
}

fn parse_value_range(s: &str) -> Result<ValueRange, String> {
    let [bottom, top] = parse_numbers::<2>(s, ',')?;
    Ok(ValueRange { bottom, top })
}

// ── configuration ──────────────────────────────────────────────────────

impl CliConfigArgs {
    fn to_config(&self) -> CliResult<PsvConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("Loading config: {}", path.display());
                PsvConfig::from_json_file(path)?
            }
            None => PsvConfig::default(),
        };

        if let Some(v) = &self.input_folder {
            config.input_folder = v.clone();
        }
        if let Some(v) = &self.output_folder {
            config.output_folder = v.clone();
        }
        if let Some(v) = self.target_width {
            config.normalize.target_width = v;
        }
        if let Some(v) = self.band_width {
            config.envelope.band_width = v;
        }
        if let Some(v) = self.brightness_threshold {
            config.envelope.brightness_threshold = v;
        }
        if let Some(v) = self.dist_min {
            config.peaks.min_distance = v;
        }
        if let Some(v) = self.prominence_factor {
            config.peaks.prominence_factor = v;
        }
        if let Some(v) = self.height_factor {
            config.peaks.height_factor = v;
        }
        if let Some(v) = self.threshold_mode {
            config.peaks.threshold_mode = v.to_core();
        }
        config.output.save_cropped |= self.save_cropped;
        config.output.write_json |= self.json;

        config.validate()?;
        Ok(config)
    }
}

impl CliInputArgs {
    fn is_empty(&self) -> bool {
        self.roi.is_none()
            && self.time_markers.is_none()
            && self.velocity_markers.is_none()
            && self.velocity_range.is_none()
    }

    fn to_inputs(&self) -> CliResult<ImageInputs> {
        let roi = self.roi.ok_or("missing --roi")?;
        let time = match self.time_markers {
            Some(m) => m,
            None => {
                tracing::warn!("no --time-markers; time is reported in image columns");
                [RefPoint::new(0.0, 0.0), RefPoint::new(1.0, 1.0)]
            }
        };
        let velocity = match (self.velocity_markers, self.velocity_range) {
            (Some(m), _) => VelocityScale::Markers(m),
            (None, Some(r)) => VelocityScale::RegionExtent {
                bottom: r.bottom,
                top: r.top,
            },
            (None, None) => return Err("missing --velocity-markers or --velocity-range".into()),
        };
        Ok(ImageInputs {
            roi,
            markers: CalibrationMarkers { time, velocity },
        })
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(&args),
        Commands::Batch(args) => run_batch(&args),
        Commands::PrintConfig(args) => run_print_config(&args),
    }
}

// ── print-config ───────────────────────────────────────────────────────

fn run_print_config(args: &CliConfigArgs) -> CliResult<()> {
    let config = args.to_config()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

// ── analyze ────────────────────────────────────────────────────────────

fn run_analyze(args: &CliAnalyzeArgs) -> CliResult<()> {
    let config = args.config.to_config()?;
    let inputs = args.inputs.to_inputs()?;

    tracing::info!("Loading image: {}", args.image.display());
    let analyzer = PsvAnalyzer::new(config);
    let analysis = analyzer.analyze_file(&args.image, &inputs)?;
    let config = analyzer.config();

    std::fs::create_dir_all(&config.output_folder)?;
    let ext = image_extension(&args.image);
    let written =
        psvtrace::write_artifacts(&config.output_folder, &ext, &analysis, &config.output)?;

    let report = &analysis.report;
    match report.status {
        ReportStatus::Measured => {
            for m in &report.measurements {
                println!(
                    "cycle {:>2}: column {:>5}  t={:.3}  psv={:.2}",
                    m.cycle, m.column, m.time, m.velocity
                );
            }
            println!(
                "PSV mean {}  std {}  (n={})",
                fmt_stat(report.summary.mean),
                fmt_stat(report.summary.std_dev),
                report.summary.count
            );
        }
        ReportStatus::NoPeaksDetected => println!("no peaks detected"),
    }
    for path in &written {
        tracing::info!("Wrote {}", path.display());
    }
    Ok(())
}

// ── batch ──────────────────────────────────────────────────────────────

fn run_batch(args: &CliBatchArgs) -> CliResult<()> {
    let mut config = args.config.to_config()?;
    config.parallel |= args.parallel;

    let mut provider = match &args.inputs {
        Some(path) => {
            tracing::info!("Loading inputs: {}", path.display());
            BatchInputs::from_json_file(path)?
        }
        None => BatchInputs::default(),
    };
    if !args.image_inputs.is_empty() {
        provider.default = Some(args.image_inputs.to_inputs()?);
    }
    if provider.default.is_none() && provider.images.is_empty() {
        return Err("no ROI / scale markers: pass --inputs or --roi with markers".into());
    }

    let summary = psvtrace::run_batch(&config, &provider)?;
    println!(
        "{} analyzed ({} without peaks), {} skipped",
        summary.n_succeeded(),
        summary.n_no_peaks(),
        summary.n_skipped()
    );
    for s in &summary.skipped {
        println!("  skipped {} [{:?}]: {}", s.file.display(), s.kind, s.reason);
    }
    Ok(())
}

fn image_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string())
}

fn fmt_stat(v: Option<f64>) -> String {
    v.map_or_else(|| "NaN".to_string(), |v| format!("{:.2}", v))
}
