//! Derived view state fed by the training stream.
//!
//! [`ViewState`] is the single writer-owned container the monitor mutates as
//! frames arrive. Consumers read it through the monitor handle and take a
//! [`ViewSnapshot`] when they need an owned, serialisable copy.

use std::cmp::Ordering;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::loss::{LossSummary, DEFAULT_LOSS_WINDOW};
use crate::protocol::{Batch, TrainingMessage};
use crate::record::{build_records, GameRecord};

pub const DEFAULT_PLAYER_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortColumn {
    pub id: String,
    #[serde(default)]
    pub desc: bool,
}

impl SortColumn {
    pub fn asc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: false,
        }
    }

    pub fn desc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: true,
        }
    }
}

/// Column ordering requested by the consumer, most significant first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(pub Vec<SortColumn>);

impl SortSpec {
    pub fn columns(&self) -> &[SortColumn] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Uuid,
    Rmse,
    Mae,
    MeanLoss,
    UpdateEpoch,
}

impl SortKey {
    fn parse(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "uuid" => Some(SortKey::Uuid),
            "rmse" => Some(SortKey::Rmse),
            "mae" => Some(SortKey::Mae),
            "mean_loss" => Some(SortKey::MeanLoss),
            "update_epoch" => Some(SortKey::UpdateEpoch),
            _ => None,
        }
    }

    fn metric(self, r: &GameRecord) -> Option<f64> {
        match self {
            SortKey::Uuid => None,
            SortKey::Rmse => r.rmse,
            SortKey::Mae => r.mae,
            SortKey::MeanLoss => r.mean_loss(),
            SortKey::UpdateEpoch => Some(r.update_epoch),
        }
    }
}

/// Compare optional metrics with missing values always last.
fn cmp_metric(a: Option<f64>, b: Option<f64>, desc: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.total_cmp(&y);
            if desc {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// What a single inbound message did to the view state.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Epoch { loss: f64, records: usize, skipped: usize },
    Batch { records: usize, skipped: usize },
    PlayerCount { numeric: bool },
    Rejected,
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub connection_status: ConnectionStatus,
    pub loss_history: Vec<f64>,
    pub loss_summary: LossSummary,
    pub training_player_count: Value,
    pub sorting: SortSpec,
    pub games: Vec<GameRecord>,
}

#[derive(Debug, Clone)]
pub struct ViewState {
    status: ConnectionStatus,
    loss_history: Vec<f64>,
    game_info: HashMap<String, GameRecord>,
    training_player_count: Value,
    sorting: SortSpec,
    loss_window: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER_COUNT, DEFAULT_LOSS_WINDOW)
    }
}

impl ViewState {
    pub fn new(initial_player_count: u32, loss_window: usize) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            loss_history: Vec::new(),
            game_info: HashMap::new(),
            training_player_count: Value::from(initial_player_count),
            sorting: SortSpec::default(),
            loss_window,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            debug!("Connection status {} -> {}", self.status.label(), status.label());
        }
        self.status = status;
    }

    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    pub fn loss_summary(&self) -> LossSummary {
        LossSummary::from_history(&self.loss_history, self.loss_window)
    }

    pub fn game_info(&self) -> &HashMap<String, GameRecord> {
        &self.game_info
    }

    pub fn game(&self, uuid: &str) -> Option<&GameRecord> {
        self.game_info.get(uuid)
    }

    /// The player count exactly as the host sent it.
    pub fn training_player_count_raw(&self) -> &Value {
        &self.training_player_count
    }

    /// The player count if the host sent something numeric.
    pub fn training_player_count(&self) -> Option<u32> {
        let n = numeric_value(&self.training_player_count)?;
        if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
            Some(n as u32)
        } else {
            None
        }
    }

    pub fn sorting(&self) -> &SortSpec {
        &self.sorting
    }

    pub fn set_sorting(&mut self, sorting: SortSpec) {
        self.sorting = sorting;
    }

    /// Dispatch one decoded message.
    pub fn apply(&mut self, message: TrainingMessage) -> Applied {
        match message {
            TrainingMessage::TrainingEpoch(epoch) => {
                let Some((records, skipped)) = self.merge_batch(&epoch.batch) else {
                    return Applied::Rejected;
                };
                self.loss_history.push(epoch.loss);
                Applied::Epoch {
                    loss: epoch.loss,
                    records,
                    skipped,
                }
            }
            TrainingMessage::LossBatch(batch) => match self.merge_batch(&batch) {
                Some((records, skipped)) => Applied::Batch { records, skipped },
                None => Applied::Rejected,
            },
            TrainingMessage::TrainingStart(start) => {
                let numeric = numeric_value(&start.player_count).is_some();
                if !numeric {
                    warn!(
                        "Data did not contain numerical player count: {}",
                        start.player_count
                    );
                }
                self.training_player_count = start.player_count;
                Applied::PlayerCount { numeric }
            }
            TrainingMessage::Unknown(kind) => {
                warn!("Unable to handle message of type {}", kind);
                Applied::Ignored
            }
        }
    }

    /// Rebuild and overwrite every game in `batch`. Returns `(merged, skipped)`
    /// or `None` if the batch was rejected.
    fn merge_batch(&mut self, batch: &Batch) -> Option<(usize, usize)> {
        let built = match build_records(batch) {
            Ok(b) => b,
            Err(e) => {
                warn!("Dropping batch for epoch {}: {}", batch.epoch, e);
                return None;
            }
        };

        for e in &built.skipped {
            warn!("Skipping game: {}", e);
        }

        let merged = built.records.len();
        for record in built.records {
            self.game_info.insert(record.uuid.clone(), record);
        }
        Some((merged, built.skipped.len()))
    }

    /// Game records ordered by the current sort spec, uuid as the final tiebreak.
    pub fn sorted_records(&self) -> Vec<&GameRecord> {
        let keys: Vec<(SortKey, bool)> = self
            .sorting
            .columns()
            .iter()
            .filter_map(|c| SortKey::parse(&c.id).map(|k| (k, c.desc)))
            .collect();

        let mut records: Vec<&GameRecord> = self.game_info.values().collect();
        records.sort_by(|a, b| {
            for &(key, desc) in &keys {
                let ord = match key {
                    SortKey::Uuid => {
                        let ord = a.uuid.cmp(&b.uuid);
                        if desc {
                            ord.reverse()
                        } else {
                            ord
                        }
                    }
                    _ => cmp_metric(key.metric(a), key.metric(b), desc),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.uuid.cmp(&b.uuid)
        });
        records
    }

    /// Games with the highest mean per-player loss first.
    pub fn worst_games(&self, limit: usize) -> Vec<&GameRecord> {
        let mut records: Vec<&GameRecord> = self.game_info.values().collect();
        records.sort_by(|a, b| {
            cmp_metric(a.mean_loss(), b.mean_loss(), true).then_with(|| a.uuid.cmp(&b.uuid))
        });
        records.truncate(limit);
        records
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            connection_status: self.status,
            loss_history: self.loss_history.clone(),
            loss_summary: self.loss_summary(),
            training_player_count: self.training_player_count.clone(),
            sorting: self.sorting.clone(),
            games: self.sorted_records().into_iter().cloned().collect(),
        }
    }
}

/// Numbers and numeric strings count as numeric.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TrainingEpoch, TrainingStart};
    use serde_json::json;

    fn batch(epoch: f64, games: &[(&str, [f64; 2], [f64; 2], f64)]) -> Batch {
        Batch {
            epoch,
            uuids: games.iter().map(|g| g.0.to_string()).collect(),
            tracker_suffixes: games
                .iter()
                .map(|_| vec!["steam/a".to_string(), "epic/b".to_string()])
                .collect(),
            y: games.iter().map(|g| g.1.to_vec()).collect(),
            y_pred: games.iter().map(|g| g.2.to_vec()).collect(),
            mask: games.iter().map(|_| vec![1.0, 1.0]).collect(),
            y_loss: games.iter().map(|g| vec![g.3, g.3]).collect(),
        }
    }

    fn epoch(loss: f64, b: Batch) -> TrainingMessage {
        TrainingMessage::TrainingEpoch(TrainingEpoch { loss, batch: b })
    }

    #[test]
    fn epoch_appends_loss_in_order() {
        let mut s = ViewState::default();
        s.apply(epoch(1.5, batch(1.0, &[])));
        s.apply(epoch(0.9, batch(2.0, &[])));
        let applied = s.apply(epoch(0.5, batch(3.0, &[])));

        assert_eq!(s.loss_history(), &[1.5, 0.9, 0.5]);
        assert_eq!(
            applied,
            Applied::Epoch {
                loss: 0.5,
                records: 0,
                skipped: 0
            }
        );
    }

    #[test]
    fn batches_merge_and_overwrite_per_uuid() {
        let mut s = ViewState::default();
        s.apply(TrainingMessage::LossBatch(batch(
            1.0,
            &[("a", [1.0, 2.0], [1.0, 2.0], 0.1), ("b", [5.0, 5.0], [4.0, 5.0], 0.2)],
        )));
        s.apply(TrainingMessage::LossBatch(batch(
            2.0,
            &[("a", [1.0, 2.0], [3.0, 2.0], 0.7)],
        )));

        assert_eq!(s.game_info().len(), 2);
        assert_eq!(s.game("a").unwrap().update_epoch, 2.0);
        assert_eq!(s.game("a").unwrap().y_pred, vec![3.0, 2.0]);
        assert_eq!(s.game("b").unwrap().update_epoch, 1.0);
        assert!(s.loss_history().is_empty());
    }

    #[test]
    fn unknown_message_leaves_state_unchanged() {
        let mut s = ViewState::default();
        s.apply(epoch(0.3, batch(1.0, &[("a", [1.0, 2.0], [2.0, 2.0], 0.1)])));
        let before = s.snapshot();

        let applied = s.apply(TrainingMessage::Unknown("ping".to_string()));
        assert_eq!(applied, Applied::Ignored);

        let after = s.snapshot();
        assert_eq!(before.loss_history, after.loss_history);
        assert_eq!(before.games, after.games);
        assert_eq!(before.training_player_count, after.training_player_count);
        assert_eq!(before.connection_status, after.connection_status);
    }

    #[test]
    fn rejected_epoch_does_not_touch_history() {
        let mut s = ViewState::default();
        let mut b = batch(1.0, &[("a", [1.0, 2.0], [2.0, 2.0], 0.1)]);
        b.y.clear();
        assert_eq!(s.apply(epoch(0.4, b)), Applied::Rejected);
        assert!(s.loss_history().is_empty());
        assert!(s.game_info().is_empty());
    }

    #[test]
    fn player_count_is_stored_even_when_not_numeric() {
        let mut s = ViewState::default();
        assert_eq!(s.training_player_count(), Some(4));

        let applied = s.apply(TrainingMessage::TrainingStart(TrainingStart {
            player_count: json!("six"),
        }));
        assert_eq!(applied, Applied::PlayerCount { numeric: false });
        assert_eq!(s.training_player_count_raw(), &json!("six"));
        assert_eq!(s.training_player_count(), None);

        s.apply(TrainingMessage::TrainingStart(TrainingStart {
            player_count: json!("6"),
        }));
        assert_eq!(s.training_player_count(), Some(6));

        s.apply(TrainingMessage::TrainingStart(TrainingStart {
            player_count: json!(2),
        }));
        assert_eq!(s.training_player_count(), Some(2));
    }

    #[test]
    fn sorted_records_follow_sort_spec() {
        let mut s = ViewState::default();
        s.apply(TrainingMessage::LossBatch(batch(
            1.0,
            &[
                ("a", [100.0, 100.0], [110.0, 100.0], 0.1),
                ("b", [100.0, 100.0], [150.0, 100.0], 0.3),
                ("c", [100.0, 100.0], [130.0, 100.0], 0.2),
            ],
        )));

        let uuids = |s: &ViewState| -> Vec<String> {
            s.sorted_records().iter().map(|r| r.uuid.clone()).collect()
        };
        assert_eq!(uuids(&s), vec!["a", "b", "c"]);

        s.set_sorting(SortSpec(vec![SortColumn::desc("MAE")]));
        assert_eq!(uuids(&s), vec!["b", "c", "a"]);

        s.set_sorting(SortSpec(vec![
            SortColumn::asc("not_a_column"),
            SortColumn::asc("rmse"),
        ]));
        assert_eq!(uuids(&s), vec!["a", "c", "b"]);
    }

    #[test]
    fn missing_metrics_sort_last() {
        let mut s = ViewState::default();
        let mut b = batch(
            1.0,
            &[
                ("masked", [1.0, 1.0], [9.0, 9.0], 0.0),
                ("x", [1.0, 1.0], [2.0, 1.0], 0.0),
            ],
        );
        b.mask[0] = vec![0.0, 0.0];
        s.apply(TrainingMessage::LossBatch(b));

        for desc in [false, true] {
            s.set_sorting(SortSpec(vec![SortColumn {
                id: "rmse".into(),
                desc,
            }]));
            let order: Vec<&str> = s.sorted_records().iter().map(|r| r.uuid.as_str()).collect();
            assert_eq!(order, vec!["x", "masked"]);
        }
    }

    #[test]
    fn worst_games_rank_by_mean_loss() {
        let mut s = ViewState::default();
        s.apply(TrainingMessage::LossBatch(batch(
            1.0,
            &[
                ("low", [1.0, 1.0], [1.0, 1.0], 0.1),
                ("high", [1.0, 1.0], [1.0, 1.0], 0.9),
                ("mid", [1.0, 1.0], [1.0, 1.0], 0.5),
            ],
        )));
        let worst: Vec<&str> = s.worst_games(2).iter().map(|r| r.uuid.as_str()).collect();
        assert_eq!(worst, vec!["high", "mid"]);
    }

    #[test]
    fn sort_spec_uses_table_shape() {
        let spec: SortSpec = serde_json::from_value(json!([{"id": "RMSE", "desc": true}])).unwrap();
        assert_eq!(spec, SortSpec(vec![SortColumn::desc("RMSE")]));
    }
}
