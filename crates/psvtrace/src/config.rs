//! Pipeline configuration.
//!
//! [`PsvConfig`] is loaded once before a batch starts and then only read.
//! Every stage receives the sub-structure it needs by reference.
//!
//! The JSON form is flat. Both snake_case keys (`band_width`) and the
//! upper-case option names (`BAND_WIDTH`) are accepted.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const DEFAULT_TARGET_WIDTH: u32 = 1024;
const DEFAULT_BAND_WIDTH: u32 = 7;
const DEFAULT_BRIGHTNESS_THRESHOLD: u8 = 5;
const DEFAULT_DIST_MIN: usize = 60;
const DEFAULT_PROMINENCE_FACTOR: f64 = 1.0;
const DEFAULT_HEIGHT_FACTOR: f64 = 0.3;

const UPPER_CASE_ALIASES: &[&str] = &[
    "TARGET_WIDTH",
    "BAND_WIDTH",
    "BRIGHTNESS_THRESHOLD",
    "DIST_MIN",
    "PROMINENCE_FACTOR",
    "HEIGHT_FACTOR",
    "INPUT_FOLDER",
    "OUTPUT_FOLDER",
];

/// Canonical-width resize parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Output width in pixels; height follows the aspect ratio.
    #[serde(alias = "TARGET_WIDTH")]
    pub target_width: u32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
        }
    }
}

/// Envelope extraction parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Height (rows) of the band below the trace boundary used for the
    /// weighted centroid. Must be odd.
    #[serde(alias = "BAND_WIDTH")]
    pub band_width: u32,
    /// Pixels at or below this intensity are treated as background.
    #[serde(alias = "BRIGHTNESS_THRESHOLD")]
    pub brightness_threshold: u8,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            band_width: DEFAULT_BAND_WIDTH,
            brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
        }
    }
}

/// How the adaptive minimum height is derived from signal statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// `min + height_factor * (max - min)`.
    #[default]
    Range,
    /// `mean + height_factor * std`.
    MeanStd,
}

/// Peak detection parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum column distance between two accepted peaks.
    #[serde(alias = "DIST_MIN")]
    pub min_distance: usize,
    /// Minimum prominence as a multiple of the signal standard deviation.
    #[serde(alias = "PROMINENCE_FACTOR")]
    pub prominence_factor: f64,
    /// Minimum height as a fraction of the signal range (or of std, see
    /// [`ThresholdMode`]).
    #[serde(alias = "HEIGHT_FACTOR")]
    pub height_factor: f64,
    /// Baseline formula for the minimum height.
    pub threshold_mode: ThresholdMode,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_distance: DEFAULT_DIST_MIN,
            prominence_factor: DEFAULT_PROMINENCE_FACTOR,
            height_factor: DEFAULT_HEIGHT_FACTOR,
            threshold_mode: ThresholdMode::Range,
        }
    }
}

/// Which optional artifacts are written next to the mandatory ones.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write `<name>_cropped.<ext>`.
    pub save_cropped: bool,
    /// Write `<name>_psv.json` with the full report.
    pub write_json: bool,
}

/// Complete, immutable configuration for one process run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PsvConfig {
    #[serde(flatten)]
    pub normalize: NormalizeConfig,
    #[serde(flatten)]
    pub envelope: EnvelopeConfig,
    #[serde(flatten)]
    pub peaks: PeakConfig,
    #[serde(flatten)]
    pub output: OutputConfig,
    /// Folder scanned for `.jpg` / `.png` inputs.
    #[serde(alias = "INPUT_FOLDER")]
    pub input_folder: PathBuf,
    /// Folder receiving all artifacts. Created if missing.
    #[serde(alias = "OUTPUT_FOLDER")]
    pub output_folder: PathBuf,
    /// Run images of a batch on the rayon thread pool.
    pub parallel: bool,
}

impl Default for PsvConfig {
    fn default() -> Self {
        Self {
            normalize: NormalizeConfig::default(),
            envelope: EnvelopeConfig::default(),
            peaks: PeakConfig::default(),
            output: OutputConfig::default(),
            input_folder: PathBuf::from("./example_images"),
            output_folder: PathBuf::from("./output"),
            parallel: false,
        }
    }
}

impl PsvConfig {
    /// Load a configuration from a JSON file and validate it.
    ///
    /// Keys missing from the file take their default values. Keys that no
    /// option recognizes are logged at `warn` level and otherwise ignored,
    /// so a misspelled option silently keeps its default only in the
    /// absence of a log subscriber.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        };
        let value: serde_json::Value = serde_json::from_str(&data).map_err(parse_err)?;
        for key in Self::unknown_keys(&value) {
            tracing::warn!(path = %path.display(), key = %key, "unknown config key ignored");
        }
        let config: Self = serde_json::from_value(value).map_err(parse_err)?;
        config.validate()?;
        Ok(config)
    }

    /// Top-level keys of a JSON config object that match no option name
    /// or alias. Non-object values have no keys.
    pub fn unknown_keys(value: &serde_json::Value) -> Vec<String> {
        let Some(object) = value.as_object() else {
            return Vec::new();
        };
        let known = match serde_json::to_value(Self::default()) {
            Ok(serde_json::Value::Object(defaults)) => defaults,
            _ => serde_json::Map::new(),
        };
        object
            .keys()
            .filter(|k| !known.contains_key(k.as_str()) && !UPPER_CASE_ALIASES.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Check every value against its admissible range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.normalize.target_width == 0 {
            return Err(ConfigError::Invalid("target_width must be positive".into()));
        }
        let bw = self.envelope.band_width;
        if bw == 0 || bw % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "band_width must be an odd positive integer, got {}",
                bw
            )));
        }
        check_factor("prominence_factor", self.peaks.prominence_factor)?;
        check_factor("height_factor", self.peaks.height_factor)?;
        Ok(())
    }
}

fn check_factor(name: &str, v: f64) -> Result<(), ConfigError> {
    if !v.is_finite() || v < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be finite and non-negative, got {}",
            name, v
        )));
    }
    Ok(())
}
