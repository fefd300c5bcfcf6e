//! Cycle-aware peak detection on a 1D envelope signal.
//!
//! Thresholds are derived from the signal itself so that one parameter set
//! works across images with different brightness and scale. Detection runs
//! as a sequence of pure steps:
//!
//! 1. [`adaptive_thresholds`] – minimum height and prominence from signal
//!    statistics; `None` for a flat signal.
//! 2. [`local_maxima`] – candidate columns.
//! 3. [`peak_prominences`] – prominence per candidate.
//! 4. [`filter_by_height`] / [`filter_by_prominence`].
//! 5. [`suppress_by_distance`] – enforce the minimum column spacing.
//!
//! [`find_peaks`] chains them.

use crate::config::{PeakConfig, ThresholdMode};

/// Signal statistics and the thresholds derived from them.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AdaptiveThresholds {
    pub signal_min: f64,
    pub signal_max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Candidates below this value are rejected.
    pub min_height: f64,
    /// Candidates with less prominence are rejected.
    pub min_prominence: f64,
}

/// A local maximum of the signal that passed (or is being tested against)
/// the detection gates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignalPeak {
    /// Column index.
    pub index: usize,
    /// Signal value at `index`.
    pub value: f64,
    /// Height above the higher of the two bounding valleys.
    pub prominence: f64,
}

/// Result of [`find_peaks`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PeakDetection {
    /// Accepted peaks in ascending column order.
    pub peaks: Vec<SignalPeak>,
    /// Thresholds used, `None` when the signal was flat or empty.
    pub thresholds: Option<AdaptiveThresholds>,
}

/// Compute adaptive height/prominence thresholds.
///
/// Returns `None` for an empty signal, a signal with non-finite samples, or
/// a signal whose range is zero; callers treat that as "no peaks".
pub fn adaptive_thresholds(signal: &[f64], config: &PeakConfig) -> Option<AdaptiveThresholds> {
    if signal.is_empty() || signal.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let signal_min = signal.iter().copied().fold(f64::INFINITY, f64::min);
    let signal_max = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = signal_max - signal_min;
    if range <= 0.0 {
        return None;
    }

    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    let var = signal.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std_dev = var.sqrt();

    let min_height = match config.threshold_mode {
        ThresholdMode::Range => signal_min + config.height_factor * range,
        ThresholdMode::MeanStd => mean + config.height_factor * std_dev,
    };
    Some(AdaptiveThresholds {
        signal_min,
        signal_max,
        mean,
        std_dev,
        min_height,
        min_prominence: config.prominence_factor * std_dev,
    })
}

/// Indices of local maxima.
///
/// A sample is a maximum when it is higher than its left neighbour and the
/// first differing sample to its right is lower. Flat plateaus report their
/// leftmost column. The first and last samples are never maxima.
pub fn local_maxima(signal: &[f64]) -> Vec<usize> {
    let n = signal.len();
    let mut out = Vec::new();
    if n < 3 {
        return out;
    }

    let mut i = 1;
    while i < n - 1 {
        if signal[i - 1] < signal[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                out.push(i);
                i = ahead;
            }
        }
        i += 1;
    }
    out
}

/// Prominence of the sample at `peak`.
///
/// On each side the signal is walked until a strictly higher sample or the
/// end; the lowest value seen is that side's base.
pub fn prominence(signal: &[f64], peak: usize) -> f64 {
    let v = signal[peak];
    let left_base = signal[..=peak]
        .iter()
        .rev()
        .take_while(|&&s| s <= v)
        .copied()
        .fold(v, f64::min);
    let right_base = signal[peak..]
        .iter()
        .take_while(|&&s| s <= v)
        .copied()
        .fold(v, f64::min);
    v - left_base.max(right_base)
}

/// Attach value and prominence to each candidate index.
pub fn peak_prominences(signal: &[f64], candidates: &[usize]) -> Vec<SignalPeak> {
    candidates
        .iter()
        .map(|&index| SignalPeak {
            index,
            value: signal[index],
            prominence: prominence(signal, index),
        })
        .collect()
}

/// Keep candidates whose value reaches `min_height`.
pub fn filter_by_height(candidates: Vec<SignalPeak>, min_height: f64) -> Vec<SignalPeak> {
    candidates
        .into_iter()
        .filter(|p| p.value >= min_height)
        .collect()
}

/// Keep candidates whose prominence reaches `min_prominence`.
pub fn filter_by_prominence(candidates: Vec<SignalPeak>, min_prominence: f64) -> Vec<SignalPeak> {
    candidates
        .into_iter()
        .filter(|p| p.prominence >= min_prominence)
        .collect()
}

/// Enforce a minimum column spacing between peaks.
///
/// Candidates are visited from highest to lowest value (equal values: lower
/// column first); a candidate closer than `min_distance` to an already kept
/// peak is dropped. A signal shorter than two spacings keeps at most one
/// peak. The result is in ascending column order.
pub fn suppress_by_distance(
    candidates: Vec<SignalPeak>,
    min_distance: usize,
    signal_len: usize,
) -> Vec<SignalPeak> {
    let d = min_distance.max(1);
    let mut order = candidates;
    order.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.index.cmp(&b.index)));

    let mut kept: Vec<SignalPeak> = Vec::with_capacity(order.len());
    for p in order {
        if kept.iter().all(|k| k.index.abs_diff(p.index) >= d) {
            kept.push(p);
        }
    }
    if signal_len < 2 * d {
        kept.truncate(1);
    }
    kept.sort_by_key(|p| p.index);
    kept
}

/// Run the full adaptive detection chain.
pub fn find_peaks(signal: &[f64], config: &PeakConfig) -> PeakDetection {
    let Some(thresholds) = adaptive_thresholds(signal, config) else {
        tracing::debug!(len = signal.len(), "flat or empty envelope; no peaks");
        return PeakDetection {
            peaks: Vec::new(),
            thresholds: None,
        };
    };

    let maxima = local_maxima(signal);
    let n_maxima = maxima.len();
    let candidates = peak_prominences(signal, &maxima);
    let candidates = filter_by_height(candidates, thresholds.min_height);
    let n_height = candidates.len();
    let candidates = filter_by_prominence(candidates, thresholds.min_prominence);
    let n_prominence = candidates.len();
    let peaks = suppress_by_distance(candidates, config.min_distance, signal.len());

    tracing::debug!(
        min_height = thresholds.min_height,
        min_prominence = thresholds.min_prominence,
        n_maxima,
        n_height,
        n_prominence,
        n_peaks = peaks.len(),
        "peak detection"
    );

    PeakDetection {
        peaks,
        thresholds: Some(thresholds),
    }
}
