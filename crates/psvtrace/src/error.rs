//! Error taxonomy.
//!
//! Errors are grouped by how the batch driver treats them:
//! [`ImageError`] skips one image, [`OutputError`] aborts the batch,
//! [`ConfigError`] prevents the batch from starting.

use std::fmt;
use std::path::PathBuf;

// ── Per-image errors ───────────────────────────────────────────────────────

/// Calibration axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Horizontal axis (pixel column -> time).
    Time,
    /// Vertical axis (pixel row -> velocity).
    Velocity,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time => f.write_str("time"),
            Self::Velocity => f.write_str("velocity"),
        }
    }
}

/// Failure that invalidates one image but not the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageError {
    /// The image could not be decoded or has zero area.
    InvalidImage {
        /// Decoder message or a description of the defect.
        reason: String,
    },
    /// The clamped region of interest has zero width or height.
    EmptyRegion {
        /// Requested bounds `[x0, y0, x1, y1]`.
        requested: [i64; 4],
        /// Image dimensions `[width, height]`.
        image_size: [u32; 2],
    },
    /// Both reference points of one calibration axis share a pixel position.
    DegenerateCalibration {
        /// Axis whose markers coincide.
        axis: Axis,
        /// The shared pixel position.
        pixel: f64,
    },
    /// No ROI / scale markers were supplied for this image.
    MissingInputs {
        /// Image name the inputs were requested for.
        name: String,
    },
}

/// Coarse classification of a skipped image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// The image itself is unusable.
    ImageDefect,
    /// The operator-supplied ROI or markers are unusable.
    OperatorInput,
}

impl ImageError {
    /// Classify this error for the batch summary.
    pub fn kind(&self) -> SkipKind {
        match self {
            Self::InvalidImage { .. } | Self::EmptyRegion { .. } => SkipKind::ImageDefect,
            Self::DegenerateCalibration { .. } | Self::MissingInputs { .. } => {
                SkipKind::OperatorInput
            }
        }
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidImage { reason } => write!(f, "invalid image: {}", reason),
            Self::EmptyRegion {
                requested,
                image_size,
            } => write!(
                f,
                "empty region: roi [{}, {}, {}, {}] does not overlap {}x{} image",
                requested[0], requested[1], requested[2], requested[3], image_size[0], image_size[1]
            ),
            Self::DegenerateCalibration { axis, pixel } => write!(
                f,
                "degenerate calibration: both {} markers at pixel {}",
                axis, pixel
            ),
            Self::MissingInputs { name } => {
                write!(f, "no roi/scale markers supplied for '{}'", name)
            }
        }
    }
}

impl std::error::Error for ImageError {}

// ── Output errors ──────────────────────────────────────────────────────────

/// Failure writing an output artifact. Always fatal for the batch.
#[derive(Debug)]
pub enum OutputError {
    /// Filesystem error (directory creation, file creation).
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// CSV serialization error.
    Csv { path: PathBuf, source: csv::Error },
    /// Image encoding error.
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
    /// JSON report serialization error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl OutputError {
    /// Path of the artifact that failed to write.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. }
            | Self::Csv { path, .. }
            | Self::Encode { path, .. }
            | Self::Json { path, .. } => path,
        }
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to write {}: {}", path.display(), source),
            Self::Csv { path, source } => {
                write!(f, "failed to write csv {}: {}", path.display(), source)
            }
            Self::Encode { path, source } => {
                write!(f, "failed to encode image {}: {}", path.display(), source)
            }
            Self::Json { path, source } => {
                write!(f, "failed to write json {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Encode { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

// ── Configuration errors ───────────────────────────────────────────────────

/// Failure loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config or inputs file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config or inputs file is not valid JSON for the expected schema.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A value is out of its admissible range.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {}", path.display(), source),
            Self::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            Self::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

// ── Batch errors ───────────────────────────────────────────────────────────

/// Failure that stops a batch run.
#[derive(Debug)]
pub enum BatchError {
    /// The input folder could not be listed.
    Input {
        path: PathBuf,
        source: std::io::Error,
    },
    /// An artifact could not be written.
    Output(OutputError),
}

impl From<OutputError> for BatchError {
    fn from(e: OutputError) -> Self {
        Self::Output(e)
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input { path, source } => {
                write!(f, "failed to list input folder {}: {}", path.display(), source)
            }
            Self::Output(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Input { source, .. } => Some(source),
            Self::Output(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_errors_are_flagged_distinctly() {
        let degenerate = ImageError::DegenerateCalibration {
            axis: Axis::Velocity,
            pixel: 12.0,
        };
        let empty = ImageError::EmptyRegion {
            requested: [0, 0, 0, 0],
            image_size: [10, 10],
        };
        assert_eq!(degenerate.kind(), SkipKind::OperatorInput);
        assert_eq!(empty.kind(), SkipKind::ImageDefect);
        assert!(degenerate.to_string().contains("velocity"));
    }
}
