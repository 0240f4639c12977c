//! # mmr_watch
//!
//! Client for the live training stream of an MMR prediction model.
//!
//! The training host pushes JSON frames over a WebSocket: an announcement when
//! training starts, per-epoch losses, and batches of per-game predictions.
//! This crate keeps a derived view of that stream (loss history, per-game
//! prediction records with the biggest miss flagged, connection status) and
//! lets consumers send requests back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mmr_watch::prelude::*;
//!
//! # async fn demo() {
//! let (handle, task) = Monitor::spawn(WsConnector, ViewState::default());
//! handle.set_address(Some("ws://localhost:5001".to_string()));
//!
//! // ... later
//! let snapshot = handle.snapshot().await;
//! println!("{} epochs seen", snapshot.loss_history.len());
//!
//! handle.shutdown();
//! task.await.ok();
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod paths;
pub mod protocol;
pub mod record;
pub mod store;
pub mod transport;

pub mod prelude {
    pub use crate::config::MonitorConfig;
    pub use crate::connection::{Connector, Link, Monitor, MonitorHandle, Outgoing, SocketEvent};
    pub use crate::error::MonitorError;
    pub use crate::loss::LossSummary;
    pub use crate::protocol::{Request, TrainingMessage};
    pub use crate::record::{GameRecord, Player};
    pub use crate::store::{ConnectionStatus, SortColumn, SortSpec, ViewSnapshot, ViewState};
    pub use crate::transport::WsConnector;
}
