//! Shared types, errors and OpenVPN config parsing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the supervisor, the management channel and the config
/// store.
#[derive(Error, Debug)]
pub enum SupervisorError {
  #[error("already running")]
  AlreadyRunning,
  #[error("no process is running")]
  NotRunning,
  #[error("spawn error: {0}")]
  Spawn(String),
  #[error("management connection error: {0}")]
  Connect(String),
  #[error("invalid OpenVPN config: {0}")]
  InvalidConfig(String),
  #[error("storage error: {0}")]
  Storage(String),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

/// Lifecycle state of the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
  Idle,
  Starting,
  Running,
  Stopping,
  Exited {
    code: Option<i32>,
    signal: Option<i32>,
  },
}

impl ProcessState {
  /// Whether this state ends the handle's lifecycle.
  pub fn is_terminal(&self) -> bool {
    matches!(self, ProcessState::Exited { .. })
  }
}

/// Connection state of the management-interface session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
  Disconnected,
  Connecting,
  Connected,
  Failed { reason: String },
}

/// Terminal exit notification for a supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
  pub code: Option<i32>,
  pub signal: Option<i32>,
}

/// Options for starting the external OpenVPN process.
#[derive(Debug, Clone)]
pub struct StartOptions {
  pub config_path: PathBuf,
  /// Executable to spawn; `openvpn` from the search path when unset.
  pub executable_path: Option<PathBuf>,
}

impl StartOptions {
  pub fn new(config_path: impl Into<PathBuf>) -> Self {
    Self {
      config_path: config_path.into(),
      executable_path: None,
    }
  }

  pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
    self.executable_path = Some(path.into());
    self
  }
}

/// Snapshot of the supervised process for UI consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatus {
  pub state: ProcessState,
  pub session: SessionState,
  pub pid: Option<u32>,
  pub config_path: Option<PathBuf>,
  pub started_at: Option<i64>,
}

/// An imported config file as listed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileRecord {
  pub name: String,
  pub path: PathBuf,
}

/// Summary of a parsed OpenVPN client config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvpnConfig {
  pub remote_host: String,
  pub remote_port: u16,
  pub protocol: String,
}

/// Parse an OpenVPN client config far enough to validate it for import.
///
/// Only the directives the supervisor cares about are interpreted; everything
/// else is passed through to the openvpn binary untouched.
pub fn parse_config(content: &str) -> Result<OvpnConfig, SupervisorError> {
  let mut remote_host = String::new();
  let mut remote_port: u16 = 1194;
  let mut protocol = "udp".to_string();

  for line in content.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
      continue;
    }

    let mut parts = line.split_whitespace();
    match parts.next() {
      Some("remote") => {
        if let Some(host) = parts.next() {
          remote_host = host.to_string();
        }
        if let Some(port) = parts.next().and_then(|p| p.parse().ok()) {
          remote_port = port;
        }
        if let Some(proto) = parts.next() {
          protocol = proto.to_string();
        }
      }
      Some("proto") => {
        if let Some(proto) = parts.next() {
          protocol = proto.to_string();
        }
      }
      Some("port") => {
        if let Some(port) = parts.next().and_then(|p| p.parse().ok()) {
          remote_port = port;
        }
      }
      _ => {}
    }
  }

  if remote_host.is_empty() {
    return Err(SupervisorError::InvalidConfig(
      "missing 'remote' directive".to_string(),
    ));
  }

  Ok(OvpnConfig {
    remote_host,
    remote_port,
    protocol,
  })
}
