//! Socket transport to an out-of-process host.
//!
//! Unix domain socket, or a named pipe on Windows. The host speaks first with
//! a `hello` carrying the interfaces it implements; after that the reader task
//! routes replies and events while the writer task drains outbound messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use super::{InboundSink, Router, Transport, TransportError};
use crate::config::ProxyConfig;
use crate::player::PlayerHandle;
use crate::protocol::{HostMessage, PluginMessage};

/// Writer channel message.
enum WriteMessage {
  Line(Vec<u8>),
  Close,
}

pub struct IpcTransport {
  interfaces: Vec<String>,
  router: Arc<Router>,
  closed: Arc<AtomicBool>,
  write_tx: Sender<WriteMessage>,
  reader_handle: JoinHandle<()>,
  _writer_handle: JoinHandle<()>,
}

impl IpcTransport {
  /// Connect using the endpoint and timings from `config`.
  pub async fn connect_with(config: &ProxyConfig) -> Result<Self, TransportError> {
    let path = config.socket_path();
    Self::connect(
      &path.to_string_lossy(),
      config.connect_retries,
      config.handshake_timeout(),
    )
    .await
  }

  /// Connect to the host socket/pipe, retrying with linear backoff.
  pub async fn connect(
    path: &str,
    retry_count: u32,
    handshake_timeout: Duration,
  ) -> Result<Self, TransportError> {
    let mut last_error = None;

    for attempt in 0..retry_count {
      if attempt > 0 {
        tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
      }

      match Self::try_connect(path, handshake_timeout).await {
        Ok(ipc) => {
          log::info!("Connected to player host at {}", path);
          return Ok(ipc);
        }
        Err(e) => {
          log::debug!("Host connect attempt {} failed: {}", attempt + 1, e);
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| TransportError::ConnectionFailed("Unknown error".into())))
  }

  #[cfg(windows)]
  async fn try_connect(path: &str, handshake_timeout: Duration) -> Result<Self, TransportError> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let client = ClientOptions::new()
      .open(path)
      .map_err(|e| TransportError::ConnectionFailed(format!("Failed to open pipe: {}", e)))?;

    let (reader, writer) = tokio::io::split(client);
    Self::handshake(reader, writer, handshake_timeout).await
  }

  #[cfg(not(windows))]
  async fn try_connect(path: &str, handshake_timeout: Duration) -> Result<Self, TransportError> {
    use tokio::net::UnixStream;

    let stream = UnixStream::connect(path)
      .await
      .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    let (reader, writer) = tokio::io::split(stream);
    Self::handshake(reader, writer, handshake_timeout).await
  }

  /// Wait for the host's hello on an open stream, then start the I/O tasks.
  pub async fn handshake<R, W>(
    reader: R,
    writer: W,
    timeout: Duration,
  ) -> Result<Self, TransportError>
  where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
  {
    let mut buf_reader = BufReader::new(reader);
    let interfaces = tokio::time::timeout(timeout, read_hello(&mut buf_reader))
      .await
      .map_err(|_| TransportError::Timeout)??;
    log::info!("Host advertises interfaces {:?}", interfaces);

    let router = Arc::new(Router::new());
    let closed = Arc::new(AtomicBool::new(false));
    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();

    let reader_router = router.clone();
    let reader_closed = closed.clone();
    let reader_handle = tokio::spawn(async move {
      reader_loop(buf_reader, &reader_router).await;
      reader_closed.store(true, Ordering::SeqCst);
      reader_router.close_all();
    });

    let writer_router = router.clone();
    let writer_closed = closed.clone();
    let writer_handle = tokio::spawn(async move {
      writer_loop(writer, write_rx).await;
      writer_closed.store(true, Ordering::SeqCst);
      writer_router.close_all();
    });

    Ok(Self {
      interfaces,
      router,
      closed,
      write_tx,
      reader_handle,
      _writer_handle: writer_handle,
    })
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  /// Close the connection. Registered players are told it is gone.
  pub fn close(&self) {
    self.closed.store(true, Ordering::SeqCst);
    let _ = self.write_tx.try_send(WriteMessage::Close);
    self.reader_handle.abort();
    self.router.close_all();
  }
}

impl Drop for IpcTransport {
  fn drop(&mut self) {
    if !self.is_closed() {
      self.close();
    }
  }
}

impl Transport for IpcTransport {
  fn advertised_interfaces(&self) -> Vec<String> {
    self.interfaces.clone()
  }

  fn post(&self, message: HostMessage) -> Result<(), TransportError> {
    if self.is_closed() {
      return Err(TransportError::Disconnected);
    }
    let json = serde_json::to_vec(&message).map_err(|e| TransportError::WriteFailed(e.into()))?;
    self
      .write_tx
      .try_send(WriteMessage::Line(json))
      .map_err(|_| TransportError::Disconnected)
  }

  fn register(&self, player: PlayerHandle, sink: Weak<dyn InboundSink>) {
    self.router.register(player, sink);
    // The I/O tasks may have closed the router before this player arrived.
    if self.is_closed() {
      self.router.close_all();
    }
  }

  fn unregister(&self, player: PlayerHandle) {
    self.router.unregister(player);
  }
}

async fn read_hello<R: AsyncRead + Unpin>(
  reader: &mut BufReader<R>,
) -> Result<Vec<String>, TransportError> {
  let mut line = String::new();
  loop {
    line.clear();
    let read = reader
      .read_line(&mut line)
      .await
      .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    if read == 0 {
      return Err(TransportError::Disconnected);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }
    return match PluginMessage::parse(trimmed) {
      Ok(PluginMessage::Hello { interfaces }) => Ok(interfaces),
      Ok(other) => Err(TransportError::Protocol(format!(
        "Expected hello, got {:?}",
        other
      ))),
      Err(e) => Err(TransportError::Protocol(e.to_string())),
    };
  }
}

async fn reader_loop<R: AsyncRead + Unpin>(mut reader: BufReader<R>, router: &Router) {
  log::debug!("Host reader loop started");
  let mut line = String::new();

  loop {
    line.clear();
    match reader.read_line(&mut line).await {
      Ok(0) => {
        log::info!("Host connection closed");
        break;
      }
      Ok(_) => {
        let trimmed = line.trim();
        if trimmed.is_empty() {
          continue;
        }

        match PluginMessage::parse(trimmed) {
          Ok(message) => {
            router.route(message);
          }
          Err(e) => {
            log::warn!("Failed to parse host message: {} - {}", e, trimmed);
          }
        }
      }
      Err(e) => {
        log::error!("Host read error: {}", e);
        break;
      }
    }
  }
}

async fn writer_loop<W: AsyncWrite + Unpin>(mut writer: W, write_rx: Receiver<WriteMessage>) {
  log::debug!("Host writer loop started");

  while let Ok(msg) = write_rx.recv().await {
    match msg {
      WriteMessage::Line(data) => {
        if let Err(e) = writer.write_all(&data).await {
          log::warn!("Host write error: {}", e);
          break;
        }
        if let Err(e) = writer.write_all(b"\n").await {
          log::warn!("Host write newline error: {}", e);
          break;
        }
        if let Err(e) = writer.flush().await {
          log::warn!("Host flush error: {}", e);
          break;
        }
      }
      WriteMessage::Close => {
        log::info!("Host writer closing");
        break;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::{Command, Event};
  use crate::error::Error;
  use crate::player::{
    BindMode, CapabilityTable, CreateOptions, DataSourceRef, ExecutionContext, InstanceId,
    Lifecycle, MediaPlayer,
  };
  use std::io;
  use std::pin::Pin;
  use std::sync::atomic::AtomicUsize;
  use std::task::{Context, Poll};
  use tokio::io::{duplex, split, DuplexStream};
  use tokio::sync::mpsc;

  /// A host end that accepts no writes.
  struct BrokenPipe;

  impl AsyncWrite for BrokenPipe {
    fn poll_write(
      self: Pin<&mut Self>,
      _cx: &mut Context<'_>,
      _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
      Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
      Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
      Poll::Ready(Ok(()))
    }
  }

  struct Forward {
    tx: mpsc::UnboundedSender<PluginMessage>,
    disconnected: AtomicUsize,
  }

  impl InboundSink for Forward {
    fn deliver(&self, message: PluginMessage) {
      let _ = self.tx.send(message);
    }

    fn disconnected(&self) {
      self.disconnected.fetch_add(1, Ordering::SeqCst);
    }
  }

  async fn connected(hello: &str) -> (IpcTransport, DuplexStream) {
    let (proxy_side, mut host_side) = duplex(4096);
    host_side.write_all(hello.as_bytes()).await.unwrap();
    let (reader, writer) = split(proxy_side);
    let transport = IpcTransport::handshake(reader, writer, Duration::from_secs(1))
      .await
      .unwrap();
    (transport, host_side)
  }

  #[tokio::test]
  async fn test_handshake_reads_interfaces() {
    let (transport, _host) =
      connected("{\"type\":\"hello\",\"interfaces\":[\"MediaPlayer;1.3\"]}\n").await;
    assert_eq!(transport.advertised_interfaces(), vec!["MediaPlayer;1.3"]);
  }

  #[tokio::test]
  async fn test_handshake_rejects_other_first_message() {
    let (proxy_side, mut host_side) = duplex(4096);
    host_side
      .write_all(b"{\"type\":\"event\",\"player\":1,\"event\":{\"name\":\"ended\"}}\n")
      .await
      .unwrap();
    let (reader, writer) = split(proxy_side);
    let result = IpcTransport::handshake(reader, writer, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(TransportError::Protocol(_))));
  }

  #[tokio::test(start_paused = true)]
  async fn test_handshake_times_out() {
    let (proxy_side, _host_side) = duplex(4096);
    let (reader, writer) = split(proxy_side);
    let result = IpcTransport::handshake(reader, writer, Duration::from_millis(50)).await;
    assert!(matches!(result, Err(TransportError::Timeout)));
  }

  #[tokio::test]
  async fn test_messages_flow_both_ways() {
    let (transport, host) = connected("{\"type\":\"hello\",\"interfaces\":[]}\n").await;
    let (host_read, mut host_write) = split(host);
    let player = PlayerHandle::next();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(Forward {
      tx,
      disconnected: AtomicUsize::new(0),
    });
    transport.register(player, Arc::downgrade(&sink) as Weak<dyn InboundSink>);

    transport
      .post(HostMessage::Call {
        player,
        seq: 1,
        command: Command::Play,
      })
      .unwrap();
    let mut lines = BufReader::new(host_read).lines();
    let sent = lines.next_line().await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(value["type"], "call");
    assert_eq!(value["command"]["op"], "play");

    let event = format!(
      "{{\"type\":\"event\",\"player\":{},\"event\":{{\"name\":\"buffering_progress\",\"percent\":30}}}}\nnot json\n",
      player.as_raw()
    );
    host_write.write_all(event.as_bytes()).await.unwrap();
    match rx.recv().await.unwrap() {
      PluginMessage::Event { event, .. } => {
        assert_eq!(event, Event::BufferingProgress { percent: 30 })
      }
      other => panic!("Expected event, got {:?}", other),
    }

    drop(host_write);
    drop(lines);
    tokio::time::timeout(Duration::from_secs(1), async {
      while sink.disconnected.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
      }
    })
    .await
    .unwrap();
    assert!(transport.is_closed());
    assert!(matches!(
      transport.post(HostMessage::Destroy { player }),
      Err(TransportError::Disconnected)
    ));
  }

  #[tokio::test]
  async fn test_write_failure_disconnects_players() {
    let (proxy_side, mut host_side) = duplex(4096);
    host_side
      .write_all(b"{\"type\":\"hello\",\"interfaces\":[\"MediaPlayer;1.2\"]}\n")
      .await
      .unwrap();
    let (reader, _writer) = split(proxy_side);
    let transport = Arc::new(
      IpcTransport::handshake(reader, BrokenPipe, Duration::from_secs(1))
        .await
        .unwrap(),
    );

    let (context, _queue) = ExecutionContext::manual("ipc-test");
    let player = MediaPlayer::create(
      transport.clone(),
      &CapabilityTable::standard(),
      CreateOptions::new(InstanceId(1))
        .bind(BindMode::DontBind)
        .context(context),
    )
    .unwrap();
    let attach = player.attach_data_source(DataSourceRef::from_raw(1)).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), attach)
      .await
      .unwrap();
    assert!(matches!(
      outcome,
      Err(Error::Transport(TransportError::Disconnected))
    ));
    assert_eq!(player.lifecycle(), Lifecycle::Destroyed);
    assert!(transport.is_closed());
    assert!(matches!(player.play(), Err(Error::BadResource)));
  }

  #[tokio::test]
  async fn test_player_registered_after_close_is_disconnected() {
    let (transport, _host) = connected("{\"type\":\"hello\",\"interfaces\":[]}\n").await;
    transport.close();

    let (tx, _rx) = mpsc::unbounded_channel();
    let sink = Arc::new(Forward {
      tx,
      disconnected: AtomicUsize::new(0),
    });
    transport.register(
      PlayerHandle::next(),
      Arc::downgrade(&sink) as Weak<dyn InboundSink>,
    );
    assert_eq!(sink.disconnected.load(Ordering::SeqCst), 1);
  }
}
