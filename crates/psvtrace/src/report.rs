//! Calibrated per-image report and its file artifacts.
//!
//! Artifacts for an image named `<name>` with input extension `<ext>`:
//!
//! - `<name>_labeled.<ext>` – cropped region with peak markers and cycle
//!   boundaries.
//! - `<name>_psv.csv` – one row per peak, ascending column order.
//! - `<name>_psv_summary.csv` – count, mean and sample standard deviation of
//!   the calibrated velocity.
//! - `<name>_cropped.<ext>` and `<name>_psv.json` when enabled.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::annotate::draw_annotations;
use crate::calibration::ScaleCalibration;
use crate::config::OutputConfig;
use crate::cycles::CycleWindow;
use crate::error::OutputError;
use crate::peaks::AdaptiveThresholds;
use crate::region::ClampedRoi;

const PEAK_CSV_HEADER: [&str; 3] = [
    "X Position (pixels)",
    "Y Position (pixels)",
    "Converted Y Position (velocity units)",
];
const SUMMARY_CSV_HEADER: [&str; 2] = ["Statistic", "Converted Y Position (velocity units)"];

/// A PSV candidate in region-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Peak {
    /// Column within the region.
    pub column: usize,
    /// Envelope row within the region (row 0 at the top, sub-pixel).
    pub row: f64,
    /// Envelope height above the region bottom.
    pub height: f64,
    /// Prominence of the envelope peak.
    pub prominence: f64,
}

/// A peak mapped through the scale calibration.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibratedMeasurement {
    /// 1-based cardiac cycle number.
    pub cycle: usize,
    /// Column within the region.
    pub column: usize,
    /// Row within the region.
    pub row: f64,
    pub time: f64,
    pub velocity: f64,
}

/// Velocity statistics over the cycles of one image.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PsvSummary {
    pub count: usize,
    /// Undefined with zero cycles.
    pub mean: Option<f64>,
    /// Sample standard deviation; undefined with fewer than two cycles.
    pub std_dev: Option<f64>,
}

impl PsvSummary {
    pub fn from_velocities(velocities: &[f64]) -> Self {
        let count = velocities.len();
        if count == 0 {
            return Self {
                count,
                mean: None,
                std_dev: None,
            };
        }
        let mean = velocities.iter().sum::<f64>() / count as f64;
        let std_dev = (count >= 2).then(|| {
            let ss: f64 = velocities.iter().map(|v| (v - mean) * (v - mean)).sum();
            (ss / (count - 1) as f64).sqrt()
        });
        Self {
            count,
            mean: Some(mean),
            std_dev,
        }
    }
}

/// Outcome class of an analyzed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// At least one peak was found.
    Measured,
    /// Valid empty result: statistics are undefined.
    NoPeaksDetected,
}

/// Full analysis result for one image.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ImageReport {
    /// Input file stem.
    pub name: String,
    /// Normalized image dimensions `[width, height]`.
    pub image_size: [u32; 2],
    /// Region actually analyzed, in normalized image pixels.
    pub roi: ClampedRoi,
    pub calibration: ScaleCalibration,
    /// Detection thresholds; absent for a flat envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<AdaptiveThresholds>,
    /// Fraction of region columns with above-threshold pixels.
    pub envelope_coverage: f64,
    pub peaks: Vec<Peak>,
    pub cycles: Vec<CycleWindow>,
    pub measurements: Vec<CalibratedMeasurement>,
    pub summary: PsvSummary,
    pub status: ReportStatus,
}

/// Report plus the cropped color region it was computed from.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: ImageReport,
    pub cropped: DynamicImage,
}

fn fmt_stat(v: Option<f64>) -> String {
    v.map_or_else(|| "NaN".to_string(), |v| v.to_string())
}

/// Write the per-peak table.
pub fn write_peak_csv(path: &Path, report: &ImageReport) -> Result<(), OutputError> {
    let csv_err = |source| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(PEAK_CSV_HEADER).map_err(csv_err)?;
    for m in &report.measurements {
        writer
            .write_record([m.column.to_string(), m.row.to_string(), m.velocity.to_string()])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the summary table. Undefined statistics are written as `NaN`.
pub fn write_summary_csv(path: &Path, report: &ImageReport) -> Result<(), OutputError> {
    let csv_err = |source| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let s = &report.summary;
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(SUMMARY_CSV_HEADER).map_err(csv_err)?;
    writer
        .write_record(["Count".to_string(), s.count.to_string()])
        .map_err(csv_err)?;
    writer
        .write_record(["Mean".to_string(), fmt_stat(s.mean)])
        .map_err(csv_err)?;
    writer
        .write_record(["Std".to_string(), fmt_stat(s.std_dev)])
        .map_err(csv_err)?;
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn save_image(img: &DynamicImage, path: &Path) -> Result<(), OutputError> {
    img.save(path).map_err(|source| OutputError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// Write every artifact for `analysis` into `out_dir`.
///
/// `ext` is the input file extension, reused for image artifacts. Returns
/// the written paths.
pub fn write_artifacts(
    out_dir: &Path,
    ext: &str,
    analysis: &Analysis,
    output: &OutputConfig,
) -> Result<Vec<PathBuf>, OutputError> {
    let name = &analysis.report.name;
    let mut written = Vec::with_capacity(5);

    if output.save_cropped {
        let path = out_dir.join(format!("{}_cropped.{}", name, ext));
        save_image(&analysis.cropped, &path)?;
        written.push(path);
    }

    let labeled = draw_annotations(&analysis.cropped, &analysis.report);
    let path = out_dir.join(format!("{}_labeled.{}", name, ext));
    save_image(&DynamicImage::ImageRgb8(labeled), &path)?;
    written.push(path);

    let path = out_dir.join(format!("{}_psv.csv", name));
    write_peak_csv(&path, &analysis.report)?;
    written.push(path);

    let path = out_dir.join(format!("{}_psv_summary.csv", name));
    write_summary_csv(&path, &analysis.report)?;
    written.push(path);

    if output.write_json {
        let path = out_dir.join(format!("{}_psv.json", name));
        let json =
            serde_json::to_string_pretty(&analysis.report).map_err(|source| OutputError::Json {
                path: path.clone(),
                source,
            })?;
        std::fs::write(&path, json).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }

    tracing::debug!(image = %name, n_files = written.len(), "artifacts written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::AxisCalibration;

    fn sample_report(velocities: &[f64]) -> ImageReport {
        let measurements: Vec<CalibratedMeasurement> = velocities
            .iter()
            .enumerate()
            .map(|(i, &v)| CalibratedMeasurement {
                cycle: i + 1,
                column: 10 + 20 * i,
                row: 4.5,
                time: (10 + 20 * i) as f64,
                velocity: v,
            })
            .collect();
        let peaks = measurements
            .iter()
            .map(|m| Peak {
                column: m.column,
                row: m.row,
                height: 15.5,
                prominence: 10.0,
            })
            .collect();
        ImageReport {
            name: "scan".into(),
            image_size: [80, 20],
            roi: ClampedRoi {
                x: 0,
                y: 0,
                width: 80,
                height: 20,
            },
            calibration: ScaleCalibration {
                time: AxisCalibration::identity(),
                velocity: AxisCalibration::identity(),
            },
            thresholds: None,
            envelope_coverage: 1.0,
            peaks,
            cycles: Vec::new(),
            summary: PsvSummary::from_velocities(velocities),
            status: if velocities.is_empty() {
                ReportStatus::NoPeaksDetected
            } else {
                ReportStatus::Measured
            },
            measurements,
        }
    }

    #[test]
    fn summary_uses_sample_std() {
        let s = PsvSummary::from_velocities(&[2.0, 4.0, 6.0]);
        assert_eq!(s.count, 3);
        assert_eq!(s.mean, Some(4.0));
        assert!((s.std_dev.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn summary_is_undefined_for_few_cycles() {
        let one = PsvSummary::from_velocities(&[80.0]);
        assert_eq!(one.mean, Some(80.0));
        assert_eq!(one.std_dev, None);

        let none = PsvSummary::from_velocities(&[]);
        assert_eq!(none.count, 0);
        assert_eq!(none.mean, None);
        assert_eq!(none.std_dev, None);
    }

    #[test]
    fn peak_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_psv.csv");
        write_peak_csv(&path, &sample_report(&[50.0, 60.0])).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "X Position (pixels),Y Position (pixels),Converted Y Position (velocity units)"
        );
        assert_eq!(lines[1], "10,4.5,50");
        assert_eq!(lines[2], "30,4.5,60");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn summary_csv_flags_undefined_as_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_psv_summary.csv");
        write_summary_csv(&path, &sample_report(&[])).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Count,0"));
        assert!(text.contains("Mean,NaN"));
        assert!(text.contains("Std,NaN"));
    }

    #[test]
    fn artifacts_land_in_output_folder() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = Analysis {
            report: sample_report(&[50.0, 60.0]),
            cropped: DynamicImage::ImageLuma8(image::GrayImage::new(80, 20)),
        };
        let output = OutputConfig {
            save_cropped: true,
            write_json: true,
        };
        let written = write_artifacts(dir.path(), "png", &analysis, &output).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "scan_cropped.png",
                "scan_labeled.png",
                "scan_psv.csv",
                "scan_psv_summary.csv",
                "scan_psv.json"
            ]
        );
        for p in &written {
            assert!(p.exists());
        }
        let labeled = image::open(dir.path().join("scan_labeled.png")).unwrap();
        assert_eq!(labeled.width(), 80);
    }

    #[test]
    fn unwritable_folder_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does/not/exist");
        let analysis = Analysis {
            report: sample_report(&[50.0]),
            cropped: DynamicImage::ImageLuma8(image::GrayImage::new(80, 20)),
        };
        let err = write_artifacts(&missing, "png", &analysis, &OutputConfig::default()).unwrap_err();
        assert!(err.path().starts_with(&missing));
    }
}
