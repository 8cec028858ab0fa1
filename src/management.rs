//! Client for the OpenVPN management interface.

use crate::config::SupervisorError;
use crate::events::EventBus;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Commands sent immediately after connecting, in order. The state and
/// bytecount subscriptions must be registered before the hold is released,
/// otherwise early state transitions are missed.
const INIT_COMMANDS: [&str; 3] = ["state on", "bytecount 1", "hold release"];

/// A connected management-interface session.
///
/// The channel forwards inbound socket data verbatim as management events; it
/// does not reassemble lines or interpret command semantics. A chunk may
/// contain multiple or partial protocol lines.
pub struct ManagementChannel {
  writer: Arc<Mutex<OwnedWriteHalf>>,
  cancel: CancellationToken,
}

impl ManagementChannel {
  /// Make a single TCP connection attempt to the management interface and
  /// send the initialization sequence. Inbound data is forwarded on `bus`
  /// until the socket closes, errors or `cancel` fires. There is no retry.
  pub async fn connect(
    host: &str,
    port: u16,
    bus: EventBus,
    cancel: CancellationToken,
  ) -> Result<Self, SupervisorError> {
    let stream = TcpStream::connect((host, port))
      .await
      .map_err(|e| SupervisorError::Connect(e.to_string()))?;

    log::info!("[mgmt] connected to management interface on {host}:{port}");
    bus.emit_log("Connected to management interface.");

    let (read_half, mut write_half) = stream.into_split();

    for command in INIT_COMMANDS {
      write_half
        .write_all(format!("{command}\n").as_bytes())
        .await
        .map_err(|e| SupervisorError::Connect(e.to_string()))?;
    }

    let read_bus = bus.clone();
    let read_cancel = cancel.clone();
    tokio::spawn(async move {
      Self::forward_incoming(read_half, read_bus, read_cancel).await;
    });

    Ok(Self {
      writer: Arc::new(Mutex::new(write_half)),
      cancel,
    })
  }

  /// Pump socket data to the bus until EOF, error or cancellation.
  async fn forward_incoming(
    mut read_half: OwnedReadHalf,
    bus: EventBus,
    cancel: CancellationToken,
  ) {
    let mut buf = [0u8; 4096];
    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        result = read_half.read(&mut buf) => match result {
          Ok(0) => {
            log::debug!("[mgmt] management socket closed");
            break;
          }
          Ok(n) => {
            bus.emit_management(String::from_utf8_lossy(&buf[..n]).into_owned());
          }
          Err(e) => {
            log::warn!("[mgmt] read error: {e}");
            bus.emit_log(format!("Mgmt error: {e}"));
            break;
          }
        },
      }
    }
  }

  /// Write a single newline-terminated command to the interface.
  pub async fn send_line(&self, command: &str) -> Result<(), SupervisorError> {
    let mut writer = self.writer.lock().await;
    writer
      .write_all(format!("{command}\n").as_bytes())
      .await
      .map_err(|e| SupervisorError::Connect(e.to_string()))
  }

  /// Stop the read task and release the socket. Safe to call more than once.
  pub async fn close(&self) {
    self.cancel.cancel();
    let mut writer = self.writer.lock().await;
    let _ = writer.shutdown().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::net::TcpListener;

  async fn connected_pair() -> (ManagementChannel, TcpStream, EventBus) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let bus = EventBus::new();
    let channel = ManagementChannel::connect("127.0.0.1", port, bus.clone(), CancellationToken::new())
      .await
      .unwrap();
    let (server, _) = listener.accept().await.unwrap();

    (channel, server, bus)
  }

  async fn drain_init(server: &mut TcpStream) {
    let mut buf = [0u8; 34];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"state on\nbytecount 1\nhold release\n");
  }

  #[tokio::test]
  async fn test_init_sequence_is_sent_in_order() {
    let (channel, mut server, _bus) = connected_pair().await;
    drain_init(&mut server).await;
    channel.close().await;
  }

  #[tokio::test]
  async fn test_inbound_chunks_are_forwarded_verbatim() {
    let (channel, mut server, bus) = connected_pair().await;
    let mut rx = bus.subscribe_management();
    drain_init(&mut server).await;

    server
      .write_all(b">HOLD:Waiting for hold release:0\r\n")
      .await
      .unwrap();

    let chunk = rx.recv().await.unwrap();
    assert!(chunk.contains(">HOLD:"));
    channel.close().await;
  }

  #[tokio::test]
  async fn test_send_line_appends_newline() {
    let (channel, mut server, _bus) = connected_pair().await;
    drain_init(&mut server).await;

    channel.send_line("username 'Auth' demo").await.unwrap();

    let mut buf = [0u8; 21];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"username 'Auth' demo\n");
    channel.close().await;
  }

  #[tokio::test]
  async fn test_connect_emits_log_event() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let bus = EventBus::new();
    let mut logs = bus.subscribe_logs();
    let channel = ManagementChannel::connect("127.0.0.1", port, bus.clone(), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(
      logs.recv().await.unwrap(),
      "Connected to management interface."
    );
    channel.close().await;
  }

  #[tokio::test]
  async fn test_close_is_idempotent() {
    let (channel, _server, _bus) = connected_pair().await;
    channel.close().await;
    channel.close().await;
  }

  #[tokio::test]
  async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result =
      ManagementChannel::connect("127.0.0.1", port, EventBus::new(), CancellationToken::new()).await;
    assert!(matches!(result, Err(SupervisorError::Connect(_))));
  }
}
