//! Single-image pipeline.
//!
//! Stages run strictly in order, each on the fully materialized output of
//! the previous one:
//! normalize -> select region -> extract envelope -> find peaks ->
//! cycle windows -> cycle apex -> resolve calibration -> report.
//!
//! The envelope peak only identifies the cycle. The measured PSV is the
//! topmost trace pixel of the cycle window, which the band centroid would
//! otherwise place a fraction of the band below the trace edge.

use std::path::Path;

use image::{DynamicImage, GenericImageView};

use crate::calibration::{CalibrationMarkers, ScaleCalibration};
use crate::config::PsvConfig;
use crate::cycles::{cycle_windows, window_apex};
use crate::envelope::extract_envelope;
use crate::error::ImageError;
use crate::normalize::{decode_image, normalize_width};
use crate::peaks::find_peaks;
use crate::region::{select_region, Roi};
use crate::report::{
    Analysis, CalibratedMeasurement, ImageReport, Peak, PsvSummary, ReportStatus,
};

/// Operator-supplied parameters for one image.
///
/// All coordinates are in the normalized (target-width) image frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageInputs {
    pub roi: Roi,
    pub markers: CalibrationMarkers,
}

/// Primary analysis interface.
///
/// Holds an immutable configuration; create once, analyze many images.
///
/// # Examples
///
/// ```no_run
/// use psvtrace::{CalibrationMarkers, ImageInputs, PsvAnalyzer, PsvConfig, RefPoint, Roi};
/// use std::path::Path;
///
/// let analyzer = PsvAnalyzer::new(PsvConfig::default());
/// let inputs = ImageInputs {
///     roi: Roi::new(40, 300, 1000, 700),
///     markers: CalibrationMarkers {
///         time: [RefPoint::new(40.0, 0.0), RefPoint::new(1000.0, 4.0)],
///         velocity: [RefPoint::new(700.0, 0.0), RefPoint::new(300.0, 120.0)].into(),
///     },
/// };
/// let analysis = analyzer.analyze_file(Path::new("scan.jpg"), &inputs).unwrap();
/// println!("{:?}", analysis.report.summary);
/// ```
pub struct PsvAnalyzer {
    config: PsvConfig,
}

impl PsvAnalyzer {
    pub fn new(config: PsvConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PsvConfig {
        &self.config
    }

    /// Decode `path` and analyze it. The report is named after the file stem.
    pub fn analyze_file(&self, path: &Path, inputs: &ImageInputs) -> Result<Analysis, ImageError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let img = decode_image(path)?;
        self.analyze(&name, &img, inputs)
    }

    /// Analyze an already decoded image.
    pub fn analyze(
        &self,
        name: &str,
        image: &DynamicImage,
        inputs: &ImageInputs,
    ) -> Result<Analysis, ImageError> {
        let normalized = normalize_width(image, self.config.normalize.target_width)?;
        let (w, h) = normalized.dimensions();

        let (cropped, roi) = select_region(&normalized, &inputs.roi)?;
        let gray = cropped.to_luma8();

        let envelope = extract_envelope(&gray, &self.config.envelope);
        let detection = find_peaks(&envelope.heights(), &self.config.peaks);

        let calibration = ScaleCalibration::resolve(&inputs.markers, &roi)?;

        let peaks: Vec<Peak> = detection
            .peaks
            .iter()
            .map(|p| Peak {
                column: p.index,
                row: envelope.height_to_row(p.value),
                height: p.value,
                prominence: p.prominence,
            })
            .collect();
        let columns: Vec<usize> = peaks.iter().map(|p| p.column).collect();
        let cycles = cycle_windows(&columns, envelope.len());

        let threshold = self.config.envelope.brightness_threshold;
        let region_height = f64::from(roi.height);
        let measurements: Vec<CalibratedMeasurement> = peaks
            .iter()
            .zip(&cycles)
            .enumerate()
            .map(|(i, (p, window))| {
                let (column, row) = match window_apex(&gray, window, threshold) {
                    Some(apex) => (apex.column, f64::from(apex.row)),
                    None => (p.column, p.row),
                };
                let (time, velocity) = calibration.measure(&roi, column, region_height - row);
                CalibratedMeasurement {
                    cycle: i + 1,
                    column,
                    row,
                    time,
                    velocity,
                }
            })
            .collect();
        let velocities: Vec<f64> = measurements.iter().map(|m| m.velocity).collect();
        let summary = PsvSummary::from_velocities(&velocities);

        let status = if peaks.is_empty() {
            tracing::warn!(image = name, "no peaks detected");
            ReportStatus::NoPeaksDetected
        } else {
            ReportStatus::Measured
        };
        tracing::info!(
            image = name,
            n_peaks = peaks.len(),
            coverage = envelope.coverage(),
            mean_velocity = summary.mean,
            "image analyzed"
        );

        Ok(Analysis {
            report: ImageReport {
                name: name.to_string(),
                image_size: [w, h],
                roi,
                calibration,
                thresholds: detection.thresholds,
                envelope_coverage: envelope.coverage(),
                peaks,
                cycles,
                measurements,
                summary,
                status,
            },
            cropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{RefPoint, VelocityScale};
    use crate::config::{EnvelopeConfig, NormalizeConfig, PeakConfig, ThresholdMode};
    use crate::error::Axis;
    use crate::test_utils::draw_doppler_trace;

    fn test_config(width: u32) -> PsvConfig {
        PsvConfig {
            normalize: NormalizeConfig {
                target_width: width,
            },
            envelope: EnvelopeConfig {
                band_width: 5,
                brightness_threshold: 5,
            },
            peaks: PeakConfig {
                min_distance: 40,
                prominence_factor: 1.0,
                height_factor: 0.3,
                threshold_mode: ThresholdMode::Range,
            },
            ..PsvConfig::default()
        }
    }

    fn inputs(w: i64, h: i64) -> ImageInputs {
        ImageInputs {
            roi: Roi::new(0, 0, w, h),
            markers: CalibrationMarkers {
                time: [RefPoint::new(0.0, 0.0), RefPoint::new(w as f64, 1.0)],
                // bottom row -> 0, top row -> 100
                velocity: [RefPoint::new(h as f64, 0.0), RefPoint::new(0.0, 100.0)].into(),
            },
        }
    }

    #[test]
    fn finds_one_peak_per_beat() {
        let beats = [50u32, 150, 250];
        let img = DynamicImage::ImageLuma8(draw_doppler_trace(300, 100, &beats, 80, 20, 200));
        let analyzer = PsvAnalyzer::new(test_config(300));
        let analysis = analyzer.analyze("synthetic", &img, &inputs(300, 100)).unwrap();
        let r = &analysis.report;

        assert_eq!(r.status, ReportStatus::Measured);
        let cols: Vec<usize> = r.peaks.iter().map(|p| p.column).collect();
        assert_eq!(cols, vec![50, 150, 250]);
        for p in &r.peaks {
            assert!((p.height - 79.0).abs() < 1e-9);
            assert!((p.row - 21.0).abs() < 1e-9);
        }
        assert_eq!(r.cycles.len(), 3);
        assert_eq!(r.measurements.len(), 3);
        for (m, beat) in r.measurements.iter().zip(beats) {
            // 80-row trace: topmost pixel, not the band centroid one row lower
            assert_eq!(m.column, beat as usize);
            assert_eq!(m.row, 20.0);
            assert!((m.velocity - 80.0).abs() < 1e-9, "velocity {}", m.velocity);
        }
        assert_eq!(r.summary.count, 3);
        assert!(r.summary.std_dev.unwrap().abs() < 1e-9);
    }

    #[test]
    fn flat_trace_reports_no_peaks() {
        let img = DynamicImage::ImageLuma8(draw_doppler_trace(120, 60, &[], 20, 20, 200));
        let analyzer = PsvAnalyzer::new(test_config(120));
        let analysis = analyzer.analyze("flat", &img, &inputs(120, 60)).unwrap();
        assert_eq!(analysis.report.status, ReportStatus::NoPeaksDetected);
        assert!(analysis.report.measurements.is_empty());
        assert_eq!(analysis.report.summary.mean, None);
        assert!(analysis.report.thresholds.is_none());
    }

    #[test]
    fn roi_outside_image_is_empty_region() {
        let img = DynamicImage::ImageLuma8(draw_doppler_trace(100, 50, &[50], 30, 10, 200));
        let analyzer = PsvAnalyzer::new(test_config(100));
        let mut inp = inputs(100, 50);
        inp.roi = Roi::new(200, 200, 300, 300);
        let err = analyzer.analyze("x", &img, &inp).unwrap_err();
        assert!(matches!(err, ImageError::EmptyRegion { .. }));
    }

    #[test]
    fn degenerate_markers_fail_calibration() {
        let img = DynamicImage::ImageLuma8(draw_doppler_trace(100, 50, &[50], 30, 10, 200));
        let analyzer = PsvAnalyzer::new(test_config(100));
        let mut inp = inputs(100, 50);
        inp.markers.velocity = [RefPoint::new(20.0, 0.0), RefPoint::new(20.0, 50.0)].into();
        let err = analyzer.analyze("x", &img, &inp).unwrap_err();
        assert!(matches!(
            err,
            ImageError::DegenerateCalibration {
                axis: Axis::Velocity,
                ..
            }
        ));
    }

    #[test]
    fn roi_offset_is_applied_to_calibration() {
        let beats = [60u32];
        let img = DynamicImage::ImageLuma8(draw_doppler_trace(200, 100, &beats, 70, 10, 200));
        let analyzer = PsvAnalyzer::new(test_config(200));
        let mut inp = inputs(200, 100);
        // crop 20 rows off the top and 10 columns off the left
        inp.roi = Roi::new(10, 20, 200, 100);
        let r = analyzer.analyze("offset", &img, &inp).unwrap().report;
        assert_eq!(r.peaks.len(), 1);
        assert_eq!(r.peaks[0].column, 50);
        assert!((r.measurements[0].time - 0.3).abs() < 1e-12);
        // same physical velocity as without the crop
        assert!((r.measurements[0].velocity - 70.0).abs() < 1e-9);
    }

    #[test]
    fn psv_is_topmost_pixel_at_default_band() {
        let beats = [200u32, 500, 800];
        let img = DynamicImage::ImageLuma8(draw_doppler_trace(1024, 200, &beats, 150, 30, 220));
        let analyzer = PsvAnalyzer::new(PsvConfig::default());
        let mut inp = inputs(1024, 200);
        // identity velocity: one unit per row above the bottom edge
        inp.markers.velocity = [RefPoint::new(200.0, 0.0), RefPoint::new(0.0, 200.0)].into();
        let r = analyzer.analyze("psv", &img, &inp).unwrap().report;

        assert_eq!(r.measurements.len(), 3);
        for m in &r.measurements {
            assert!((m.velocity - 150.0).abs() < 1e-9, "velocity {}", m.velocity);
        }
        // detection still runs on the band centroid
        for p in &r.peaks {
            assert!((p.height - 148.5).abs() < 1e-9);
        }
    }

    #[test]
    fn velocity_range_follows_clamped_region() {
        // region requested down to row 1000 of a 400-row image
        let img = DynamicImage::ImageLuma8(draw_doppler_trace(300, 400, &[150], 200, 40, 200));
        let analyzer = PsvAnalyzer::new(test_config(300));
        let inp = ImageInputs {
            roi: Roi::new(0, 0, 300, 1000),
            markers: CalibrationMarkers {
                time: [RefPoint::new(0.0, 0.0), RefPoint::new(300.0, 1.0)],
                velocity: VelocityScale::RegionExtent {
                    bottom: 0.0,
                    top: 100.0,
                },
            },
        };
        let r = analyzer.analyze("clamped", &img, &inp).unwrap().report;
        assert_eq!(r.roi.height, 400);
        assert_eq!(r.measurements.len(), 1);
        // 200 of 400 rows -> half the range
        assert!((r.measurements[0].velocity - 50.0).abs() < 1e-9);
    }
}
