//! psvtrace: peak systolic velocity extraction from spectral Doppler images.
//!
//! Each image is processed independently by a fixed sequence of stages:
//!
//! 1. **Normalize** – resize to a canonical width, preserving aspect ratio.
//! 2. **Region** – crop the operator-supplied region of interest.
//! 3. **Envelope** – per-column maximum-velocity boundary of the bright
//!    spectral trace, refined by a weighted centroid over a narrow band.
//! 4. **Peaks** – adaptive-threshold peak detection with prominence and
//!    minimum-distance constraints, one peak per cardiac cycle.
//! 5. **Cycles** – one window per detected peak; the PSV of a cycle is the
//!    topmost trace pixel inside its window.
//! 6. **Calibration** – two-point linear pixel-to-unit mapping per axis.
//! 7. **Report** – per-peak and summary CSV tables plus a labeled image.
//!
//! # Public API
//! - [`PsvAnalyzer`] analyzes a single image with a fixed [`PsvConfig`]
//! - [`run_batch`] drives a whole input folder
//! - stage functions ([`extract_envelope`], [`find_peaks`], ...) are exposed
//!   for callers that need intermediate results

mod annotate;
mod batch;
mod calibration;
mod config;
mod cycles;
mod envelope;
mod error;
mod normalize;
mod peaks;
mod pipeline;
mod region;
mod report;

#[cfg(test)]
pub(crate) mod test_utils;

pub use annotate::draw_annotations;
pub use batch::{
    artifact_names, list_images, run_batch, run_paths, BatchInputs, BatchSummary, InputsProvider,
    ProcessedImage, SkippedImage,
};
pub use calibration::{
    AxisCalibration, CalibrationMarkers, RefPoint, ScaleCalibration, VelocityScale,
};
pub use config::{
    EnvelopeConfig, NormalizeConfig, OutputConfig, PeakConfig, PsvConfig, ThresholdMode,
};
pub use cycles::{cycle_windows, window_apex, CycleApex, CycleWindow};
pub use envelope::{extract_envelope, EnvelopeSignal};
pub use error::{Axis, BatchError, ConfigError, ImageError, OutputError, SkipKind};
pub use normalize::{decode_image, normalize_width, scaled_height};
pub use peaks::{
    adaptive_thresholds, filter_by_height, filter_by_prominence, find_peaks, local_maxima,
    peak_prominences, prominence, suppress_by_distance, AdaptiveThresholds, PeakDetection,
    SignalPeak,
};
pub use pipeline::{ImageInputs, PsvAnalyzer};
pub use region::{select_region, ClampedRoi, Roi};
pub use report::{
    write_artifacts, write_peak_csv, write_summary_csv, Analysis, CalibratedMeasurement,
    ImageReport, Peak, PsvSummary, ReportStatus,
};
