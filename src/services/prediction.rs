//! Satellite cadence predictor.
//!
//! Pure functions over historical scene date samples. No I/O, no clock
//! access: given the same inputs the output is bit-identical, which is what
//! makes the sweeper's behavior reproducible in tests.
use crate::domain::{Prediction, Satellite, SceneDateInfo};
use crate::errors::{SweepError, SweepResult};
use chrono::{DateTime, Duration, Utc};

/// Minimum samples per satellite series required for extrapolation.
pub const MIN_SAMPLES: usize = 2;

/// Clamp applied to the log-normalized gap variance before it enters the
/// confidence curve.
const MAX_NORMALIZED_VARIANCE: f64 = 50.0;

/// Forecast the next acquisition and publish date for a path/row from the two
/// per-satellite sample series, both ordered newest first.
pub fn predict(landsat8: &[SceneDateInfo], landsat9: &[SceneDateInfo]) -> SweepResult<Prediction> {
    if landsat8.len() < MIN_SAMPLES {
        return Err(SweepError::InsufficientData {
            satellite: Satellite::Landsat8,
            count: landsat8.len(),
        });
    }
    if landsat9.len() < MIN_SAMPLES {
        return Err(SweepError::InsufficientData {
            satellite: Satellite::Landsat9,
            count: landsat9.len(),
        });
    }

    let l8_starts: Vec<_> = landsat8.iter().map(|s| s.acquisition_start).collect();
    let l9_starts: Vec<_> = landsat9.iter().map(|s| s.acquisition_start).collect();
    let l8_published: Vec<_> = landsat8.iter().map(|s| s.publish_date).collect();
    let l9_published: Vec<_> = landsat9.iter().map(|s| s.publish_date).collect();

    let (predicted_acquisition_date, avg_acquisition_interval, acquisition_confidence) =
        extrapolate(&l8_starts, &l9_starts);
    let (predicted_publish_date, avg_publish_interval, publish_confidence) =
        extrapolate(&l8_published, &l9_published);

    // The satellite that has NOT acquired most recently is considered due
    // next, assuming the two alternate over the footprint.
    let predicted_satellite = if l8_starts[0] > l9_starts[0] {
        Satellite::Landsat9
    } else {
        Satellite::Landsat8
    };

    Ok(Prediction {
        predicted_acquisition_date,
        avg_acquisition_interval,
        acquisition_confidence,
        predicted_publish_date,
        avg_publish_interval,
        publish_confidence,
        predicted_satellite,
    })
}

/// Extrapolate the next timestamp from whichever series is due next: the one
/// whose latest sample is older. Both inputs are newest first with at least
/// [`MIN_SAMPLES`] entries.
fn extrapolate(
    landsat8_dates: &[DateTime<Utc>],
    landsat9_dates: &[DateTime<Utc>],
) -> (DateTime<Utc>, Duration, f64) {
    let due_series = if landsat8_dates[0] > landsat9_dates[0] {
        landsat9_dates
    } else {
        landsat8_dates
    };

    // Consecutive gaps are non-negative because the series is sorted newest
    // first. Gaps between real scene timestamps fit comfortably in i64
    // microseconds.
    let gaps: Vec<i64> = due_series
        .windows(2)
        .map(|pair| (pair[0] - pair[1]).num_microseconds().unwrap_or(i64::MAX))
        .collect();

    // Truncated integer mean, in microsecond ticks.
    let sum: i128 = gaps.iter().map(|&g| g as i128).sum();
    let avg_micros = (sum / gaps.len() as i128) as i64;
    let avg_interval = Duration::microseconds(avg_micros);

    let predicted = due_series[0] + avg_interval;
    (predicted, avg_interval, confidence_level(&gaps))
}

/// Heuristic confidence in an extrapolation: a decay curve over the
/// population variance of the gaps. Not a statistical confidence interval,
/// and deliberately left unclamped below zero for wildly irregular cadences.
fn confidence_level(gaps: &[i64]) -> f64 {
    let n = gaps.len() as f64;
    let mean = gaps.iter().map(|&g| g as f64).sum::<f64>() / n;
    let sum_of_squares = gaps.iter().map(|&g| (g as f64 - mean).powi(2)).sum::<f64>();
    let variance = sum_of_squares / n;

    let normalized_variance = (1.0 + variance).log10();
    let clamped = normalized_variance.min(MAX_NORMALIZED_VARIANCE);

    1.0 - (clamped / (0.6 * MAX_NORMALIZED_VARIANCE)).powi(5)
}
