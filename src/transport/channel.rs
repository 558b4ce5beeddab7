//! In-process transport.
//!
//! `ChannelTransport` is the proxy side; `HostEnd` is what a host running in
//! the same process (or a test standing in for one) holds to read commands
//! and push replies and events back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_channel::{Receiver, Sender};
use serde_json::Value;

use super::{InboundSink, Router, Transport, TransportError};
use crate::player::{InstanceId, OperationKind, PlayerHandle};
use crate::protocol::{Event, HostMessage, PluginMessage, Reply};

pub struct ChannelTransport {
  interfaces: Vec<String>,
  outbound: Sender<HostMessage>,
  router: Arc<Router>,
  refuse_binding: AtomicBool,
}

impl ChannelTransport {
  /// Create a connected pair for a host advertising `interfaces`.
  pub fn pair<I, S>(interfaces: I) -> (Arc<Self>, HostEnd)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let (tx, rx) = async_channel::unbounded();
    let router = Arc::new(Router::new());
    let transport = Arc::new(Self {
      interfaces: interfaces.into_iter().map(Into::into).collect(),
      outbound: tx,
      router: router.clone(),
      refuse_binding: AtomicBool::new(false),
    });
    let host = HostEnd {
      outbound: rx,
      router,
    };
    (transport, host)
  }

  /// Make subsequent graphics binding requests fail.
  pub fn refuse_graphics_binding(&self, refuse: bool) {
    self.refuse_binding.store(refuse, Ordering::SeqCst);
  }
}

impl Transport for ChannelTransport {
  fn advertised_interfaces(&self) -> Vec<String> {
    self.interfaces.clone()
  }

  fn post(&self, message: HostMessage) -> Result<(), TransportError> {
    self
      .outbound
      .try_send(message)
      .map_err(|_| TransportError::Disconnected)
  }

  fn bind_graphics(&self, player: PlayerHandle, instance: InstanceId) -> Result<(), TransportError> {
    if self.refuse_binding.load(Ordering::SeqCst) {
      return Err(TransportError::BindRefused);
    }
    self.post(HostMessage::BindGraphics { player, instance })
  }

  fn register(&self, player: PlayerHandle, sink: Weak<dyn InboundSink>) {
    self.router.register(player, sink);
  }

  fn unregister(&self, player: PlayerHandle) {
    self.router.unregister(player);
  }
}

/// Host side of a `ChannelTransport`.
pub struct HostEnd {
  outbound: Receiver<HostMessage>,
  router: Arc<Router>,
}

impl HostEnd {
  pub fn try_recv(&self) -> Option<HostMessage> {
    self.outbound.try_recv().ok()
  }

  /// Wait for the next message; `None` once the transport is dropped.
  pub async fn recv(&self) -> Option<HostMessage> {
    self.outbound.recv().await.ok()
  }

  /// Everything posted so far.
  pub fn drain(&self) -> Vec<HostMessage> {
    std::iter::from_fn(|| self.try_recv()).collect()
  }

  pub fn deliver(&self, message: PluginMessage) -> bool {
    self.router.route(message)
  }

  pub fn reply(
    &self,
    player: PlayerHandle,
    seq: u64,
    kind: OperationKind,
    result: i32,
    output: Option<Value>,
  ) -> bool {
    self.deliver(PluginMessage::Reply(Reply {
      player,
      seq,
      kind,
      result,
      output,
    }))
  }

  pub fn send_event(&self, player: PlayerHandle, event: Event) -> bool {
    self.deliver(PluginMessage::Event { player, event })
  }

  /// Simulate the host going away.
  pub fn disconnect(&self) {
    self.router.close_all();
  }

  pub fn registered_players(&self) -> usize {
    self.router.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_post_preserves_order() {
    let (transport, host) = ChannelTransport::pair(["MediaPlayer;1.4"]);
    let player = PlayerHandle::next();
    transport.post(HostMessage::DetachDataSource { player }).unwrap();
    transport.post(HostMessage::Destroy { player }).unwrap();

    assert_eq!(
      host.drain(),
      vec![
        HostMessage::DetachDataSource { player },
        HostMessage::Destroy { player },
      ]
    );
    assert_eq!(transport.advertised_interfaces(), vec!["MediaPlayer;1.4"]);
  }

  #[test]
  fn test_post_after_host_dropped() {
    let (transport, host) = ChannelTransport::pair(Vec::<String>::new());
    drop(host);
    let result = transport.post(HostMessage::Destroy {
      player: PlayerHandle::next(),
    });
    assert!(matches!(result, Err(TransportError::Disconnected)));
  }

  #[test]
  fn test_binding_can_be_refused() {
    let (transport, host) = ChannelTransport::pair(["MediaPlayer;1.0"]);
    let player = PlayerHandle::next();
    transport.refuse_graphics_binding(true);
    assert!(matches!(
      transport.bind_graphics(player, InstanceId(1)),
      Err(TransportError::BindRefused)
    ));
    assert!(host.try_recv().is_none());

    transport.refuse_graphics_binding(false);
    transport.bind_graphics(player, InstanceId(1)).unwrap();
    assert!(matches!(
      host.try_recv(),
      Some(HostMessage::BindGraphics { .. })
    ));
  }
}
