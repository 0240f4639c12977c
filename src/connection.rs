//! Connection lifecycle for the training stream.
//!
//! A [`Monitor`] owns at most one live [`Link`] at a time. The desired
//! address is published through a [`MonitorHandle`]; whenever it differs from
//! the live link's address the monitor closes the old link before asking the
//! [`Connector`] for a new one. Socket progress arrives as [`SocketEvent`]s and
//! is folded into the shared [`ViewState`].
//!
//! Lifecycle:
//! - `Open`   → `connected`
//! - `Error`  → `error` (no reconnect)
//! - `Closed` → `disconnected`, desired address cleared
//!
//! Events from a link that has already been torn down are never observed:
//! the receiver is dropped together with the link.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{Request, TrainingMessage};
use crate::store::{Applied, ConnectionStatus, SortSpec, ViewSnapshot, ViewState};

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Open,
    Error(String),
    Message(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Close,
}

/// Both ends of one socket as seen by the monitor.
#[derive(Debug)]
pub struct Link {
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens sockets. `open` returns immediately; the outcome of the connection
/// attempt is reported as the first event on the link.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, address: &str) -> Link;
}

/// Cloneable consumer side of a running monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    state: Arc<RwLock<ViewState>>,
    address: Arc<watch::Sender<Option<String>>>,
    status: watch::Receiver<ConnectionStatus>,
    outbox: Arc<Mutex<Option<mpsc::UnboundedSender<Outgoing>>>>,
    shutdown: CancellationToken,
}

impl MonitorHandle {
    /// Set or clear the target address. The monitor reconciles asynchronously.
    pub fn set_address(&self, address: Option<String>) {
        self.address.send_replace(address);
    }

    pub fn address(&self) -> Option<String> {
        self.address.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn state(&self) -> &Arc<RwLock<ViewState>> {
        &self.state
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn set_sorting(&self, sorting: SortSpec) {
        self.state.write().await.set_sorting(sorting);
    }

    /// Send `{type, data}` if a link is open. Returns whether a frame was
    /// handed to the socket; without an open link this silently does nothing.
    pub async fn send(&self, kind: &str, data: Value) -> bool {
        self.send_request(&Request::new(kind, data)).await
    }

    pub async fn send_request(&self, request: &Request) -> bool {
        let outbox = self.outbox.lock().await;
        let Some(tx) = outbox.as_ref() else {
            debug!("Not connected; dropping {} request", request.kind);
            return false;
        };
        match request.to_frame() {
            Ok(frame) => tx.send(Outgoing::Text(frame)).is_ok(),
            Err(e) => {
                warn!("Could not encode {} request: {}", request.kind, e);
                false
            }
        }
    }

    /// Stop the monitor; the live link is closed on the way out.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

struct LiveLink {
    address: String,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

enum Step {
    Shutdown,
    AddressChanged,
    Event(SocketEvent),
}

pub struct Monitor<C: Connector> {
    connector: C,
    handle: MonitorHandle,
    address_rx: watch::Receiver<Option<String>>,
    status_tx: watch::Sender<ConnectionStatus>,
    live: Option<LiveLink>,
}

impl<C: Connector> Monitor<C> {
    pub fn new(connector: C, state: ViewState) -> (Self, MonitorHandle) {
        let (address_tx, address_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(state.status());

        let handle = MonitorHandle {
            state: Arc::new(RwLock::new(state)),
            address: Arc::new(address_tx),
            status: status_rx,
            outbox: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
        };

        let monitor = Self {
            connector,
            handle: handle.clone(),
            address_rx,
            status_tx,
            live: None,
        };
        (monitor, handle)
    }

    /// Create a monitor and run it on the current tokio runtime.
    pub fn spawn(connector: C, state: ViewState) -> (MonitorHandle, JoinHandle<()>) {
        let (monitor, handle) = Self::new(connector, state);
        (handle, tokio::spawn(monitor.run()))
    }

    pub async fn run(mut self) {
        self.address_rx.mark_changed();

        loop {
            let step = tokio::select! {
                _ = self.handle.shutdown.cancelled() => Step::Shutdown,
                changed = self.address_rx.changed() => match changed {
                    Ok(()) => Step::AddressChanged,
                    Err(_) => Step::Shutdown,
                },
                event = next_event(&mut self.live) => Step::Event(event),
            };

            match step {
                Step::Shutdown => break,
                Step::AddressChanged => {
                    let desired = self.address_rx.borrow_and_update().clone();
                    self.reconcile(desired).await;
                }
                Step::Event(event) => self.handle_event(event).await,
            }
        }

        self.close_live().await;
        info!("Monitor stopped");
    }

    /// Bring the live link in line with `desired`, closing before opening.
    async fn reconcile(&mut self, desired: Option<String>) {
        let current = self.live.as_ref().map(|l| l.address.as_str());
        if current == desired.as_deref() {
            return;
        }

        self.close_live().await;

        if let Some(address) = desired {
            info!("Connecting to {}", address);
            let Link { outgoing, events } = self.connector.open(&address);
            self.live = Some(LiveLink {
                address,
                outgoing,
                events,
            });
        }
    }

    async fn close_live(&mut self) {
        let Some(link) = self.live.take() else {
            return;
        };
        info!("Closing connection to {}", link.address);
        let _ = link.outgoing.send(Outgoing::Close);
        *self.handle.outbox.lock().await = None;
        self.set_status(ConnectionStatus::Disconnected).await;
    }

    async fn set_status(&self, status: ConnectionStatus) {
        self.handle.state.write().await.set_status(status);
        self.status_tx.send_replace(status);
    }

    async fn handle_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Open => {
                if let Some(link) = &self.live {
                    info!("Connected to {}", link.address);
                    *self.handle.outbox.lock().await = Some(link.outgoing.clone());
                }
                self.set_status(ConnectionStatus::Connected).await;
            }
            SocketEvent::Error(e) => {
                warn!("Socket error: {}", e);
                *self.handle.outbox.lock().await = None;
                self.set_status(ConnectionStatus::Error).await;
            }
            SocketEvent::Closed => {
                let closed = self.live.take().map(|link| link.address);
                if let Some(address) = &closed {
                    info!("Connection to {} closed", address);
                }
                *self.handle.outbox.lock().await = None;
                // A target set after this link was opened stays in place.
                self.handle.address.send_if_modified(|target| {
                    if closed.is_some() && *target == closed {
                        *target = None;
                        true
                    } else {
                        false
                    }
                });
                self.set_status(ConnectionStatus::Disconnected).await;
            }
            SocketEvent::Message(text) => self.handle_message(&text).await,
        }
    }

    async fn handle_message(&self, text: &str) {
        let message = match TrainingMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return;
            }
        };

        let mut state = self.handle.state.write().await;
        match state.apply(message) {
            Applied::Epoch {
                loss,
                records,
                skipped,
            } => {
                let summary = state.loss_summary();
                info!(
                    "Epoch {}: loss={:.5} last_{}={} games={} skipped={}",
                    summary.epochs,
                    loss,
                    summary.window,
                    summary
                        .last_mean
                        .map(|m| format!("{:.5}", m))
                        .unwrap_or_else(|| "-".to_string()),
                    records,
                    skipped
                );
            }
            Applied::Batch { records, skipped } => {
                debug!("Loss batch: games={} skipped={}", records, skipped);
            }
            Applied::PlayerCount { .. } => {
                info!(
                    "Training started with player count {}",
                    state.training_player_count_raw()
                );
            }
            Applied::Rejected | Applied::Ignored => {}
        }
    }
}

/// Next event from the live link, or never if there is none. A link whose
/// event channel ends without a close event counts as closed.
async fn next_event(live: &mut Option<LiveLink>) -> SocketEvent {
    match live {
        Some(link) => link.events.recv().await.unwrap_or(SocketEvent::Closed),
        None => std::future::pending().await,
    }
}
