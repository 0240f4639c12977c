//! Per-game prediction records built from streamed batches.

use serde::Serialize;

use crate::error::RecordError;
use crate::metrics;
use crate::protocol::Batch;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub tracker_suffix: String,
    pub mmr: f64,
    pub prediction: f64,
    pub mask: f64,
    #[serde(rename = "isBiggestMiss")]
    pub is_biggest_miss: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameRecord {
    pub uuid: String,
    pub players: Vec<Player>,
    pub y_pred: Vec<f64>,
    pub y: Vec<f64>,
    pub masks: Vec<f64>,
    pub y_loss: Vec<f64>,
    /// `None` when no player in the game has a valid label.
    #[serde(rename = "RMSE")]
    pub rmse: Option<f64>,
    #[serde(rename = "MAE")]
    pub mae: Option<f64>,
    pub update_epoch: f64,
}

impl GameRecord {
    pub fn biggest_miss(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_biggest_miss)
    }

    /// Mean of the per-player losses reported by the trainer.
    pub fn mean_loss(&self) -> Option<f64> {
        if self.y_loss.is_empty() {
            return None;
        }
        Some(self.y_loss.iter().sum::<f64>() / self.y_loss.len() as f64)
    }
}

/// Index of the player with the largest `|y - y_pred| * mask`.
///
/// Ties go to the first occurrence and NaN scores never win. Returns `None`
/// only when there are no players.
pub fn biggest_miss_index(y: &[f64], y_pred: &[f64], mask: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, ((&t, &p), &m)) in y.iter().zip(y_pred).zip(mask).enumerate() {
        let score = (t - p).abs() * m;
        match best {
            None => best = Some((i, score)),
            Some((_, top)) if score > top || (top.is_nan() && !score.is_nan()) => {
                best = Some((i, score))
            }
            _ => {}
        }
    }
    best.map(|(i, _)| i)
}

/// Build the full record for one game.
pub fn build_record(
    uuid: &str,
    epoch: f64,
    tracker_suffixes: &[String],
    y: &[f64],
    y_pred: &[f64],
    mask: &[f64],
    y_loss: &[f64],
) -> Result<GameRecord, RecordError> {
    let n = tracker_suffixes.len();
    if y.len() != n || y_pred.len() != n || mask.len() != n {
        return Err(RecordError::MisalignedGame {
            uuid: uuid.to_string(),
            detail: format!(
                "tracker_suffixes {}, y {}, y_pred {}, mask {}",
                n,
                y.len(),
                y_pred.len(),
                mask.len()
            ),
        });
    }

    let miss = biggest_miss_index(y, y_pred, mask);
    let players = tracker_suffixes
        .iter()
        .zip(y)
        .zip(y_pred)
        .zip(mask)
        .enumerate()
        .map(|(i, (((suffix, &mmr), &prediction), &mask))| Player {
            tracker_suffix: suffix.clone(),
            mmr,
            prediction,
            mask,
            is_biggest_miss: miss == Some(i),
        })
        .collect();

    Ok(GameRecord {
        uuid: uuid.to_string(),
        players,
        y_pred: y_pred.to_vec(),
        y: y.to_vec(),
        masks: mask.to_vec(),
        y_loss: y_loss.to_vec(),
        rmse: metrics::root_mean_squared_error(y, y_pred, mask).ok(),
        mae: metrics::mean_absolute_error(y, y_pred, mask).ok(),
        update_epoch: epoch,
    })
}

/// Records produced from one batch, plus the games that had to be skipped.
#[derive(Debug, Default)]
pub struct BatchRecords {
    pub records: Vec<GameRecord>,
    pub skipped: Vec<RecordError>,
}

/// Rebuild a record for every game in `batch`.
///
/// A batch whose outer columns disagree in length is rejected whole; a game
/// whose player columns disagree is skipped and reported.
pub fn build_records(batch: &Batch) -> Result<BatchRecords, RecordError> {
    let games = batch.uuids.len();
    let columns = [
        ("tracker_suffixes", batch.tracker_suffixes.len()),
        ("y", batch.y.len()),
        ("y_pred", batch.y_pred.len()),
        ("mask", batch.mask.len()),
        ("y_loss", batch.y_loss.len()),
    ];
    if let Some((name, len)) = columns.iter().find(|(_, len)| *len != games) {
        return Err(RecordError::MisalignedBatch(format!(
            "{} uuids but {} has {} rows",
            games, name, len
        )));
    }

    let mut out = BatchRecords::default();
    for i in 0..games {
        match build_record(
            &batch.uuids[i],
            batch.epoch,
            &batch.tracker_suffixes[i],
            &batch.y[i],
            &batch.y_pred[i],
            &batch.mask[i],
            &batch.y_loss[i],
        ) {
            Ok(record) => out.records.push(record),
            Err(e) => out.skipped.push(e),
        }
    }
    Ok(out)
}
