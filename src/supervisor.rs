//! Supervision of the external OpenVPN process.

use crate::config::{
  ProcessExit, ProcessState, ProcessStatus, SessionState, StartOptions, SupervisorError,
};
use crate::events::EventBus;
use crate::management::ManagementChannel;
use chrono::Utc;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Loopback host the management interface binds to.
const MANAGEMENT_HOST: &str = "127.0.0.1";

/// Default management interface port.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 7505;

/// Lines of management log history the process keeps buffered.
const MANAGEMENT_LOG_CACHE: &str = "1000";

/// Tunables for a supervisor instance.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
  /// Local TCP port the spawned process exposes its management interface on.
  pub management_port: u16,
  /// Grace period between spawning the process and the single attempt to
  /// connect to its management interface. The listening socket is not
  /// guaranteed ready the instant the process is spawned.
  pub connect_delay: Duration,
}

impl Default for SupervisorConfig {
  fn default() -> Self {
    Self {
      management_port: DEFAULT_MANAGEMENT_PORT,
      connect_delay: Duration::from_secs(1),
    }
  }
}

/// The supervised process for the current session.
struct ProcessHandle {
  pid: u32,
  state: ProcessState,
  session: SessionState,
  config_path: PathBuf,
  started_at: i64,
  channel: Option<ManagementChannel>,
  /// Cancels the delayed management connect and the channel read task when
  /// the process exits.
  cancel: CancellationToken,
}

type HandleSlot = Arc<Mutex<Option<ProcessHandle>>>;

/// Single point of control for the external OpenVPN process and its
/// management channel.
///
/// At most one process is supervised at a time; starting while one is active
/// is rejected, not queued. The handle slot is freed when the process exit is
/// observed, at which point a new start is accepted.
pub struct ProcessSupervisor {
  bus: EventBus,
  config: SupervisorConfig,
  handle: HandleSlot,
}

impl ProcessSupervisor {
  pub fn new(bus: EventBus) -> Self {
    Self::with_config(bus, SupervisorConfig::default())
  }

  pub fn with_config(bus: EventBus, config: SupervisorConfig) -> Self {
    Self {
      bus,
      config,
      handle: Arc::new(Mutex::new(None)),
    }
  }

  /// The bus this supervisor emits on.
  pub fn bus(&self) -> &EventBus {
    &self.bus
  }

  /// Spawn the OpenVPN process and schedule the management connect.
  ///
  /// Fails with `AlreadyRunning`, without side effects, if a process is
  /// already being supervised.
  pub async fn start(&self, options: StartOptions) -> Result<(), SupervisorError> {
    let mut slot = self.handle.lock().await;
    if slot.as_ref().is_some_and(|h| !h.state.is_terminal()) {
      return Err(SupervisorError::AlreadyRunning);
    }

    let executable = options
      .executable_path
      .unwrap_or_else(|| PathBuf::from("openvpn"));

    let mut cmd = Command::new(&executable);
    cmd
      .arg("--config")
      .arg(&options.config_path)
      .arg("--management")
      .arg(MANAGEMENT_HOST)
      .arg(self.config.management_port.to_string())
      .arg("--management-hold")
      .arg("--management-query-passwords")
      .arg("--management-log-cache")
      .arg(MANAGEMENT_LOG_CACHE)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
      SupervisorError::Spawn(format!("failed to start {}: {e}", executable.display()))
    })?;

    let pid = child.id().ok_or_else(|| {
      SupervisorError::Spawn("process exited before a pid was assigned".to_string())
    })?;

    log::info!(
      "[supervisor] started {} (pid {pid}) with config {}",
      executable.display(),
      options.config_path.display()
    );

    let cancel = CancellationToken::new();

    if let Some(stdout) = child.stdout.take() {
      tokio::spawn(forward_output(stdout, self.bus.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
      tokio::spawn(forward_output(stderr, self.bus.clone()));
    }

    tokio::spawn(connect_management(
      self.handle.clone(),
      self.bus.clone(),
      cancel.child_token(),
      self.config.clone(),
    ));

    tokio::spawn(watch_exit(
      child,
      self.handle.clone(),
      self.bus.clone(),
      cancel.clone(),
    ));

    *slot = Some(ProcessHandle {
      pid,
      state: ProcessState::Starting,
      session: SessionState::Disconnected,
      config_path: options.config_path,
      started_at: Utc::now().timestamp(),
      channel: None,
      cancel,
    });

    Ok(())
  }

  /// Ask the supervised process to terminate.
  ///
  /// This is a cooperative request: the handle slot and the management
  /// session are released when the exit is observed asynchronously, not here.
  pub async fn stop(&self) -> Result<(), SupervisorError> {
    let mut slot = self.handle.lock().await;
    let handle = match slot.as_mut() {
      Some(h) if !h.state.is_terminal() => h,
      _ => return Err(SupervisorError::NotRunning),
    };

    log::info!("[supervisor] sending termination signal to pid {}", handle.pid);
    handle.state = ProcessState::Stopping;
    terminate(handle.pid);
    Ok(())
  }

  /// Current lifecycle state, `Idle` when nothing is supervised.
  pub async fn state(&self) -> ProcessState {
    self
      .handle
      .lock()
      .await
      .as_ref()
      .map(|h| h.state.clone())
      .unwrap_or(ProcessState::Idle)
  }

  /// Snapshot of the supervised process for UI consumers.
  pub async fn status(&self) -> ProcessStatus {
    match self.handle.lock().await.as_ref() {
      Some(h) => ProcessStatus {
        state: h.state.clone(),
        session: h.session.clone(),
        pid: Some(h.pid),
        config_path: Some(h.config_path.clone()),
        started_at: Some(h.started_at),
      },
      None => ProcessStatus {
        state: ProcessState::Idle,
        session: SessionState::Disconnected,
        pid: None,
        config_path: None,
        started_at: None,
      },
    }
  }

  /// Inject a command into the management interface, if connected.
  pub async fn send_management(&self, command: &str) -> Result<(), SupervisorError> {
    let slot = self.handle.lock().await;
    match slot.as_ref().and_then(|h| h.channel.as_ref()) {
      Some(channel) => channel.send_line(command).await,
      None => Err(SupervisorError::Connect(
        "management interface is not connected".to_string(),
      )),
    }
  }
}

/// Forward every chunk of process output verbatim as a log event. Chunks
/// within one stream preserve arrival order; stdout and stderr interleave
/// arbitrarily.
async fn forward_output<R>(mut stream: R, bus: EventBus)
where
  R: tokio::io::AsyncRead + Unpin,
{
  let mut buf = [0u8; 8192];
  loop {
    match stream.read(&mut buf).await {
      Ok(0) | Err(_) => break,
      Ok(n) => bus.emit_log(String::from_utf8_lossy(&buf[..n]).into_owned()),
    }
  }
}

/// Wait out the grace delay, then make the single management connect attempt.
async fn connect_management(
  slot: HandleSlot,
  bus: EventBus,
  cancel: CancellationToken,
  config: SupervisorConfig,
) {
  tokio::select! {
    _ = cancel.cancelled() => return,
    _ = tokio::time::sleep(config.connect_delay) => {}
  }

  {
    let mut guard = slot.lock().await;
    match guard.as_mut() {
      Some(handle) if !handle.state.is_terminal() => handle.session = SessionState::Connecting,
      _ => return,
    }
  }

  match ManagementChannel::connect(
    MANAGEMENT_HOST,
    config.management_port,
    bus.clone(),
    cancel.clone(),
  )
  .await
  {
    Ok(channel) => {
      let mut guard = slot.lock().await;
      match guard.as_mut() {
        Some(handle) if !handle.state.is_terminal() && !cancel.is_cancelled() => {
          handle.session = SessionState::Connected;
          if handle.state == ProcessState::Starting {
            handle.state = ProcessState::Running;
          }
          handle.channel = Some(channel);
        }
        _ => {
          // The process went away while we were connecting.
          channel.close().await;
        }
      }
    }
    Err(e) => {
      log::warn!("[supervisor] management connect failed: {e}");
      let mut guard = slot.lock().await;
      // Emit the diagnostic only while the handle is still live; the exit
      // event must stay the last event attributed to it.
      if let Some(handle) = guard.as_mut().filter(|h| !h.state.is_terminal()) {
        handle.session = SessionState::Failed {
          reason: e.to_string(),
        };
        bus.emit_log(format!("Mgmt error: {e}"));
      }
    }
  }
}

/// Observe the process exit: tear down the management session, free the
/// handle slot, then emit exactly one exit event. The exit event is the last
/// event attributed to this handle.
async fn watch_exit(mut child: Child, slot: HandleSlot, bus: EventBus, cancel: CancellationToken) {
  let status = child.wait().await;

  // Stop the delayed connect and the channel read task before the slot is
  // touched so a late connect cannot resurrect the session.
  cancel.cancel();

  let exit = match status {
    Ok(status) => exit_of(status),
    Err(e) => {
      log::error!("[supervisor] failed to observe process exit: {e}");
      ProcessExit {
        code: None,
        signal: None,
      }
    }
  };

  let taken = slot.lock().await.take();
  let Some(mut handle) = taken else { return };

  if let Some(channel) = handle.channel.take() {
    channel.close().await;
  }

  log::info!(
    "[supervisor] pid {} exited (code {:?}, signal {:?})",
    handle.pid,
    exit.code,
    exit.signal
  );
  bus.emit_exit(exit);
}

fn exit_of(status: std::process::ExitStatus) -> ProcessExit {
  #[cfg(unix)]
  let signal = {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
  };
  #[cfg(not(unix))]
  let signal = None;

  ProcessExit {
    code: status.code(),
    signal,
  }
}

/// Deliver a graceful termination request to `pid`.
fn terminate(pid: u32) {
  #[cfg(unix)]
  {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Ok(pid) = i32::try_from(pid) {
      if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        log::warn!("[supervisor] failed to signal pid {pid}: {e}");
      }
    }
  }

  #[cfg(windows)]
  {
    let _ = std::process::Command::new("taskkill")
      .args(["/PID", &pid.to_string()])
      .output();
  }
}
