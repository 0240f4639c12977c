//! Wire messages exchanged with the training host.
//!
//! Every frame is a JSON text frame shaped `{ "type": ..., "data": ... }`.
//! Inbound frames decode into [`TrainingMessage`]; an unrecognised `type`
//! becomes [`TrainingMessage::Unknown`] rather than an error so the caller
//! decides what to do with it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

pub const TRAINING_EPOCH: &str = "training_epoch";
pub const TRAINING_START: &str = "training_start";
pub const LOSS_BATCH: &str = "loss_batch";

/// One batch of per-game predictions. Outer sequences are indexed by game,
/// inner sequences by player slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Fractional epochs are allowed; the trainer reports progress mid-epoch.
    pub epoch: f64,
    pub uuids: Vec<String>,
    pub tracker_suffixes: Vec<Vec<String>>,
    pub y: Vec<Vec<f64>>,
    pub y_pred: Vec<Vec<f64>>,
    #[serde(deserialize_with = "deserialize_mask_rows")]
    pub mask: Vec<Vec<f64>>,
    pub y_loss: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingEpoch {
    pub loss: f64,
    #[serde(flatten)]
    pub batch: Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStart {
    /// Kept as received; the host is not trusted to send a number.
    #[serde(default)]
    pub player_count: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingMessage {
    TrainingEpoch(TrainingEpoch),
    TrainingStart(TrainingStart),
    LossBatch(Batch),
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl TrainingMessage {
    /// Decode one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
        let Envelope { kind, data } = envelope;

        let message = match kind.as_str() {
            TRAINING_EPOCH => Self::TrainingEpoch(decode(TRAINING_EPOCH, data)?),
            TRAINING_START => Self::TrainingStart(decode(TRAINING_START, data)?),
            LOSS_BATCH => Self::LossBatch(decode(LOSS_BATCH, data)?),
            _ => Self::Unknown(kind),
        };
        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::TrainingEpoch(_) => TRAINING_EPOCH,
            Self::TrainingStart(_) => TRAINING_START,
            Self::LossBatch(_) => LOSS_BATCH,
            Self::Unknown(kind) => kind,
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(kind: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Payload { kind, source })
}

/// Outbound request sent back to the training host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Request {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaskFlag {
    Bool(bool),
    Number(f64),
}

impl From<MaskFlag> for f64 {
    fn from(flag: MaskFlag) -> Self {
        match flag {
            MaskFlag::Bool(true) => 1.0,
            MaskFlag::Bool(false) => 0.0,
            MaskFlag::Number(n) => n,
        }
    }
}

/// Masks arrive either as 0/1 numbers or as booleans depending on the trainer.
fn deserialize_mask_rows<'de, D>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<MaskFlag>> = Vec::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(f64::from).collect())
        .collect())
}
