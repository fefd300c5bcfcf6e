//! Folder-level batch driver.
//!
//! Images are independent: each gets its own pipeline run and its own
//! output files. A per-image [`ImageError`] is logged and recorded as a
//! skip; an [`OutputError`] stops the batch because it will most likely
//! recur for every remaining image.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::PsvConfig;
use crate::error::{BatchError, ConfigError, ImageError, OutputError, SkipKind};
use crate::normalize::decode_image;
use crate::pipeline::{ImageInputs, PsvAnalyzer};
use crate::report::{write_artifacts, ReportStatus};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Supplies the operator inputs (ROI + scale markers) for an image.
pub trait InputsProvider: Sync {
    /// Inputs for the image with file stem `name`, if any were supplied.
    fn inputs_for(&self, name: &str) -> Option<ImageInputs>;
}

/// Batch-wide default inputs with optional per-image overrides.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BatchInputs {
    /// Used for every image without an override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ImageInputs>,
    /// Overrides keyed by file stem.
    #[serde(default)]
    pub images: BTreeMap<String, ImageInputs>,
}

impl BatchInputs {
    /// Same inputs for every image.
    pub fn uniform(inputs: ImageInputs) -> Self {
        Self {
            default: Some(inputs),
            images: BTreeMap::new(),
        }
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl InputsProvider for BatchInputs {
    fn inputs_for(&self, name: &str) -> Option<ImageInputs> {
        self.images.get(name).copied().or(self.default)
    }
}

/// An image that produced a report.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProcessedImage {
    pub file: PathBuf,
    pub n_peaks: usize,
    pub status: ReportStatus,
    pub outputs: Vec<PathBuf>,
}

/// An image that was skipped, and why.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SkippedImage {
    pub file: PathBuf,
    pub kind: SkipKind,
    pub reason: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BatchSummary {
    pub processed: Vec<ProcessedImage>,
    pub skipped: Vec<SkippedImage>,
}

impl BatchSummary {
    /// Images with a report, including those without peaks.
    pub fn n_succeeded(&self) -> usize {
        self.processed.len()
    }

    /// Images whose report is the "no peaks detected" state.
    pub fn n_no_peaks(&self) -> usize {
        self.processed
            .iter()
            .filter(|p| p.status == ReportStatus::NoPeaksDetected)
            .count()
    }

    pub fn n_skipped(&self) -> usize {
        self.skipped.len()
    }
}

enum Outcome {
    Processed(ProcessedImage),
    Skipped(SkippedImage),
}

/// List `.jpg` / `.jpeg` / `.png` files (case-insensitive) in `folder`,
/// sorted by path.
pub fn list_images(folder: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let input_err = |source| BatchError::Input {
        path: folder.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(input_err)? {
        let path = entry.map_err(input_err)?.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Artifact base name per path.
///
/// The file stem, unless several inputs share it (`scan.jpg`, `scan.png`);
/// those get the extension appended (`scan_jpg`, `scan_png`) so that no two
/// images ever write the same output file.
pub fn artifact_names(paths: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = paths.iter().map(|p| file_stem(p)).collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for stem in &stems {
        *counts.entry(stem.as_str()).or_default() += 1;
    }

    let mut taken: HashSet<String> = HashSet::new();
    paths
        .iter()
        .zip(&stems)
        .map(|(path, stem)| {
            let base = if counts[stem.as_str()] > 1 {
                let ext = path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{}_{}", stem, ext)
            } else {
                stem.clone()
            };
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

fn process_one(
    analyzer: &PsvAnalyzer,
    provider: &dyn InputsProvider,
    path: &Path,
    name: &str,
) -> Result<Outcome, OutputError> {
    let config = analyzer.config();
    let stem = file_stem(path);
    tracing::info!("Processing {}", path.display());

    let analysis = provider
        .inputs_for(&stem)
        .ok_or_else(|| ImageError::MissingInputs { name: stem.clone() })
        .and_then(|inputs| {
            let img = decode_image(path)?;
            analyzer.analyze(name, &img, &inputs)
        });

    match analysis {
        Ok(analysis) => {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "png".to_string());
            let outputs = write_artifacts(&config.output_folder, &ext, &analysis, &config.output)?;
            Ok(Outcome::Processed(ProcessedImage {
                file: path.to_path_buf(),
                n_peaks: analysis.report.peaks.len(),
                status: analysis.report.status,
                outputs,
            }))
        }
        Err(err) => {
            tracing::warn!(kind = ?err.kind(), "skipping {}: {}", path.display(), err);
            Ok(Outcome::Skipped(SkippedImage {
                file: path.to_path_buf(),
                kind: err.kind(),
                reason: err.to_string(),
            }))
        }
    }
}

/// Analyze every image in `paths`, writing artifacts to the configured
/// output folder.
pub fn run_paths(
    config: &PsvConfig,
    provider: &dyn InputsProvider,
    paths: &[PathBuf],
) -> Result<BatchSummary, BatchError> {
    std::fs::create_dir_all(&config.output_folder).map_err(|source| OutputError::Io {
        path: config.output_folder.clone(),
        source,
    })?;

    let analyzer = PsvAnalyzer::new(config.clone());
    let names = artifact_names(paths);
    let outcomes: Vec<Outcome> = if config.parallel {
        paths
            .par_iter()
            .zip(names.par_iter())
            .map(|(p, name)| process_one(&analyzer, provider, p, name))
            .collect::<Result<_, _>>()?
    } else {
        paths
            .iter()
            .zip(&names)
            .map(|(p, name)| process_one(&analyzer, provider, p, name))
            .collect::<Result<_, _>>()?
    };

    let mut summary = BatchSummary::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Processed(p) => summary.processed.push(p),
            Outcome::Skipped(s) => summary.skipped.push(s),
        }
    }

    tracing::info!(
        succeeded = summary.n_succeeded(),
        no_peaks = summary.n_no_peaks(),
        skipped = summary.n_skipped(),
        "batch complete"
    );
    for s in &summary.skipped {
        tracing::info!(kind = ?s.kind, "skipped {}: {}", s.file.display(), s.reason);
    }
    Ok(summary)
}

/// Analyze every image in the configured input folder.
pub fn run_batch(
    config: &PsvConfig,
    provider: &dyn InputsProvider,
) -> Result<BatchSummary, BatchError> {
    let paths = list_images(&config.input_folder)?;
    tracing::info!(
        "Found {} images in {}",
        paths.len(),
        config.input_folder.display()
    );
    run_paths(config, provider, &paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationMarkers, RefPoint};
    use crate::config::{EnvelopeConfig, NormalizeConfig, PeakConfig};
    use crate::error::SkipKind;
    use crate::region::Roi;
    use crate::test_utils::draw_doppler_trace;

    fn inputs() -> ImageInputs {
        ImageInputs {
            roi: Roi::new(0, 0, 200, 80),
            markers: CalibrationMarkers {
                time: [RefPoint::new(0.0, 0.0), RefPoint::new(200.0, 2.0)],
                velocity: [RefPoint::new(80.0, 0.0), RefPoint::new(0.0, 80.0)].into(),
            },
        }
    }

    fn config(input: &Path, output: &Path, parallel: bool) -> PsvConfig {
        PsvConfig {
            normalize: NormalizeConfig { target_width: 200 },
            envelope: EnvelopeConfig {
                band_width: 3,
                brightness_threshold: 5,
            },
            peaks: PeakConfig {
                min_distance: 30,
                ..PeakConfig::default()
            },
            input_folder: input.to_path_buf(),
            output_folder: output.to_path_buf(),
            parallel,
            ..PsvConfig::default()
        }
    }

    fn populate(dir: &Path) {
        draw_doppler_trace(200, 80, &[40, 110, 170], 60, 10, 210)
            .save(dir.join("a_scan.png"))
            .unwrap();
        draw_doppler_trace(200, 80, &[], 10, 10, 210)
            .save(dir.join("b_flat.png"))
            .unwrap();
        std::fs::write(dir.join("c_broken.jpg"), b"garbage").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();
    }

    #[test]
    fn lists_only_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        std::fs::write(dir.path().join("D_UPPER.PNG"), b"x").unwrap();
        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["D_UPPER.PNG", "a_scan.png", "b_flat.png", "c_broken.jpg"]
        );
    }

    #[test]
    fn missing_folder_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_images(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, BatchError::Input { .. }));
    }

    fn check_summary(summary: &BatchSummary, out: &Path) {
        assert_eq!(summary.n_succeeded(), 2);
        assert_eq!(summary.n_no_peaks(), 1);
        assert_eq!(summary.n_skipped(), 1);
        assert_eq!(summary.skipped[0].kind, SkipKind::ImageDefect);
        assert!(summary.skipped[0].file.ends_with("c_broken.jpg"));

        let scan = &summary.processed[0];
        assert_eq!(scan.n_peaks, 3);
        assert!(out.join("a_scan_labeled.png").exists());
        assert!(out.join("a_scan_psv.csv").exists());
        assert!(out.join("a_scan_psv_summary.csv").exists());
        assert!(out.join("b_flat_psv_summary.csv").exists());
        assert!(!out.join("c_broken_psv.csv").exists());
    }

    #[test]
    fn failures_do_not_abort_the_batch() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        populate(input.path());
        let out = output.path().join("results");

        let summary = run_batch(
            &config(input.path(), &out, false),
            &BatchInputs::uniform(inputs()),
        )
        .unwrap();
        check_summary(&summary, &out);
    }

    #[test]
    fn parallel_run_matches_sequential() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        populate(input.path());

        let summary = run_batch(
            &config(input.path(), output.path(), true),
            &BatchInputs::uniform(inputs()),
        )
        .unwrap();
        check_summary(&summary, output.path());
    }

    #[test]
    fn images_without_inputs_are_operator_skips() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        populate(input.path());

        let mut provider = BatchInputs::default();
        provider.images.insert("a_scan".into(), inputs());
        let summary = run_batch(&config(input.path(), output.path(), false), &provider).unwrap();

        assert_eq!(summary.n_succeeded(), 1);
        let operator: Vec<&SkippedImage> = summary
            .skipped
            .iter()
            .filter(|s| s.kind == SkipKind::OperatorInput)
            .collect();
        assert_eq!(operator.len(), 2);
    }

    #[test]
    fn per_image_override_wins() {
        let mut provider = BatchInputs::uniform(inputs());
        let mut special = inputs();
        special.roi = Roi::new(5, 5, 50, 50);
        provider.images.insert("special".into(), special);
        assert_eq!(provider.inputs_for("special").unwrap().roi, special.roi);
        assert_eq!(provider.inputs_for("other").unwrap().roi, inputs().roi);
    }

    #[test]
    fn inputs_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs.json");
        let provider = BatchInputs::uniform(inputs());
        std::fs::write(&path, serde_json::to_string(&provider).unwrap()).unwrap();
        let loaded = BatchInputs::from_json_file(&path).unwrap();
        assert_eq!(loaded.inputs_for("any"), Some(inputs()));
    }

    #[test]
    fn shared_stems_get_distinct_names() {
        let paths: Vec<PathBuf> = ["in/scan.jpg", "in/scan.png", "in/other.png", "in/scan_png.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            artifact_names(&paths),
            vec!["scan_jpg", "scan_png", "other", "scan_png_2"]
        );
    }

    fn count_rows(path: &Path) -> usize {
        std::fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn same_stem_inputs_do_not_overwrite_each_other() {
        for parallel in [false, true] {
            let input = tempfile::tempdir().unwrap();
            let output = tempfile::tempdir().unwrap();
            draw_doppler_trace(200, 80, &[40, 110, 170], 60, 10, 210)
                .save_with_format(input.path().join("scan.png"), image::ImageFormat::Png)
                .unwrap();
            draw_doppler_trace(200, 80, &[60, 150], 60, 10, 210)
                .save_with_format(input.path().join("scan.jpeg"), image::ImageFormat::Png)
                .unwrap();

            let summary = run_batch(
                &config(input.path(), output.path(), parallel),
                &BatchInputs::uniform(inputs()),
            )
            .unwrap();
            assert_eq!(summary.n_succeeded(), 2);

            let out = output.path();
            assert!(!out.join("scan_psv.csv").exists());
            // header plus one row per peak
            assert_eq!(count_rows(&out.join("scan_png_psv.csv")), 4);
            assert_eq!(count_rows(&out.join("scan_jpeg_psv.csv")), 3);
            assert!(out.join("scan_jpeg_labeled.jpeg").exists());
            assert!(out.join("scan_png_psv_summary.csv").exists());
        }
    }

    #[test]
    fn write_failure_aborts_the_batch() {
        for parallel in [false, true] {
            let input = tempfile::tempdir().unwrap();
            let output = tempfile::tempdir().unwrap();
            populate(input.path());
            // a directory squatting on an artifact path makes the write fail
            let blocked = output.path().join("a_scan_psv.csv");
            std::fs::create_dir(&blocked).unwrap();

            let err = run_batch(
                &config(input.path(), output.path(), parallel),
                &BatchInputs::uniform(inputs()),
            )
            .unwrap_err();
            match err {
                BatchError::Output(e) => assert_eq!(e.path(), blocked.as_path()),
                other => panic!("expected output error, got {other}"),
            }
        }
    }
}
