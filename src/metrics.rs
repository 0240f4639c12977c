//! Masked regression error metrics.
//!
//! Every metric takes three aligned sequences: ground truth, prediction and a
//! validity mask. Mask values weight their entries; entries with a zero,
//! negative or NaN mask do not contribute.

use crate::error::MetricError;

fn check_lengths(truth: &[f64], prediction: &[f64], mask: &[f64]) -> Result<(), MetricError> {
    if truth.len() != prediction.len() || truth.len() != mask.len() {
        return Err(MetricError::LengthMismatch {
            truth: truth.len(),
            prediction: prediction.len(),
            mask: mask.len(),
        });
    }
    Ok(())
}

/// `Σ m·f(truth - prediction) / Σ m` over entries with a positive mask.
fn masked_mean<F>(truth: &[f64], prediction: &[f64], mask: &[f64], f: F) -> Result<f64, MetricError>
where
    F: Fn(f64) -> f64,
{
    check_lengths(truth, prediction, mask)?;

    let mut sum = 0.0;
    let mut weight = 0.0;
    for ((&t, &p), &m) in truth.iter().zip(prediction).zip(mask) {
        if m.is_nan() || m <= 0.0 {
            continue;
        }
        sum += m * f(t - p);
        weight += m;
    }

    if weight == 0.0 {
        return Err(MetricError::EmptyMask);
    }
    Ok(sum / weight)
}

pub fn mean_squared_error(truth: &[f64], prediction: &[f64], mask: &[f64]) -> Result<f64, MetricError> {
    masked_mean(truth, prediction, mask, |d| d * d)
}

pub fn mean_absolute_error(truth: &[f64], prediction: &[f64], mask: &[f64]) -> Result<f64, MetricError> {
    masked_mean(truth, prediction, mask, f64::abs)
}

pub fn root_mean_squared_error(
    truth: &[f64],
    prediction: &[f64],
    mask: &[f64],
) -> Result<f64, MetricError> {
    mean_squared_error(truth, prediction, mask).map(f64::sqrt)
}
