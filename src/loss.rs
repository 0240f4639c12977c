use serde::Serialize;

pub const DEFAULT_LOSS_WINDOW: usize = 30;

/// Rolling view over the loss history, compared window against window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossSummary {
    pub epochs: usize,
    pub latest: Option<f64>,
    pub window: usize,
    pub last_mean: Option<f64>,
    pub penultimate_mean: Option<f64>,
    /// `penultimate_mean - last_mean`; positive means the loss went down.
    pub improvement: Option<f64>,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl LossSummary {
    pub fn from_history(history: &[f64], window: usize) -> Self {
        let window = window.max(1);
        let n = history.len();
        let last_start = n.saturating_sub(window);
        let penultimate_start = n.saturating_sub(window.saturating_mul(2));

        let last_mean = mean(&history[last_start..]);
        let penultimate_mean = mean(&history[penultimate_start..last_start]);
        let improvement = match (penultimate_mean, last_mean) {
            (Some(p), Some(l)) => Some(p - l),
            _ => None,
        };

        Self {
            epochs: n,
            latest: history.last().copied(),
            window,
            last_mean,
            penultimate_mean,
            improvement,
        }
    }
}
