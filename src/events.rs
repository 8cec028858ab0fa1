//! Typed event fan-out from the supervisor to its observers.

use crate::config::ProcessExit;
use tokio::sync::broadcast;

/// Default in-flight capacity per event kind.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast bus carrying supervisor events to any number of subscribers.
///
/// Emission is fire-and-forget: events sent while nobody is subscribed are
/// dropped, and a slow subscriber only loses its own backlog. Producers are
/// never blocked by consumers.
#[derive(Clone)]
pub struct EventBus {
  log_tx: broadcast::Sender<String>,
  management_tx: broadcast::Sender<String>,
  exit_tx: broadcast::Sender<ProcessExit>,
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}

impl EventBus {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Create a bus whose per-kind channels hold `capacity` in-flight events.
  pub fn with_capacity(capacity: usize) -> Self {
    let (log_tx, _) = broadcast::channel(capacity);
    let (management_tx, _) = broadcast::channel(capacity);
    let (exit_tx, _) = broadcast::channel(capacity);
    Self {
      log_tx,
      management_tx,
      exit_tx,
    }
  }

  /// Subscribe to process output log events.
  pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
    self.log_tx.subscribe()
  }

  /// Subscribe to raw management-interface data events.
  pub fn subscribe_management(&self) -> broadcast::Receiver<String> {
    self.management_tx.subscribe()
  }

  /// Subscribe to process exit events.
  pub fn subscribe_exits(&self) -> broadcast::Receiver<ProcessExit> {
    self.exit_tx.subscribe()
  }

  pub(crate) fn emit_log(&self, text: impl Into<String>) {
    // Ignore send errors (no receivers connected)
    let _ = self.log_tx.send(text.into());
  }

  pub(crate) fn emit_management(&self, text: String) {
    let _ = self.management_tx.send(text);
  }

  pub(crate) fn emit_exit(&self, exit: ProcessExit) {
    let _ = self.exit_tx.send(exit);
  }
}
