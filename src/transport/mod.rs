//! Message transport between player proxies and the host.
//!
//! A transport carries `HostMessage`s out in order and routes every inbound
//! `PluginMessage` to the proxy it addresses through a `Router`.

pub mod channel;
pub mod ipc;

pub use channel::{ChannelTransport, HostEnd};
pub use ipc::IpcTransport;

use std::collections::HashMap;
use std::sync::Weak;

use parking_lot::Mutex;
use thiserror::Error;

use crate::player::{InstanceId, PlayerHandle};
use crate::protocol::{HostMessage, PluginMessage};

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("Connection failed: {0}")]
  ConnectionFailed(String),
  #[error("Write failed: {0}")]
  WriteFailed(#[from] std::io::Error),
  #[error("Handshake timeout")]
  Timeout,
  #[error("Disconnected")]
  Disconnected,
  #[error("Protocol error: {0}")]
  Protocol(String),
  #[error("Graphics binding refused")]
  BindRefused,
}

/// Receiver of the messages addressed to one player.
pub trait InboundSink: Send + Sync {
  /// A reply or event for this player.
  fn deliver(&self, message: PluginMessage);

  /// The connection is gone; nothing more will arrive.
  fn disconnected(&self);
}

pub trait Transport: Send + Sync {
  /// Interface identifiers the host implements.
  fn advertised_interfaces(&self) -> Vec<String>;

  /// Queue a message for the host. Never blocks; messages leave in post order.
  ///
  /// An implementation may route replies or events from inside `post`, so
  /// callers must not hold a lock their sink needs.
  fn post(&self, message: HostMessage) -> Result<(), TransportError>;

  /// Bind a player to the instance's graphics.
  fn bind_graphics(&self, player: PlayerHandle, instance: InstanceId) -> Result<(), TransportError> {
    self.post(HostMessage::BindGraphics { player, instance })
  }

  /// Route messages for `player` to `sink` until unregistered.
  fn register(&self, player: PlayerHandle, sink: Weak<dyn InboundSink>);

  fn unregister(&self, player: PlayerHandle);
}

/// Demultiplexes inbound messages by player handle.
///
/// Sinks are held weakly; a message for a dropped player is discarded.
#[derive(Default)]
pub struct Router {
  sinks: Mutex<HashMap<PlayerHandle, Weak<dyn InboundSink>>>,
}

impl Router {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, player: PlayerHandle, sink: Weak<dyn InboundSink>) {
    self.sinks.lock().insert(player, sink);
  }

  pub fn unregister(&self, player: PlayerHandle) {
    self.sinks.lock().remove(&player);
  }

  pub fn len(&self) -> usize {
    self.sinks.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Hand `message` to its player. Returns false if nobody took it.
  pub fn route(&self, message: PluginMessage) -> bool {
    let Some(player) = message.player() else {
      log::debug!("Ignoring repeated hello from host");
      return false;
    };

    // The sink runs without the routing lock held.
    let sink = {
      let mut sinks = self.sinks.lock();
      match sinks.get(&player).map(Weak::upgrade) {
        Some(Some(sink)) => Some(sink),
        Some(None) => {
          sinks.remove(&player);
          None
        }
        None => None,
      }
    };

    match sink {
      Some(sink) => {
        sink.deliver(message);
        true
      }
      None => {
        log::debug!("Dropping message for unknown {}", player);
        false
      }
    }
  }

  /// Tell every registered player the connection is gone and forget them.
  pub fn close_all(&self) {
    let sinks: Vec<_> = self.sinks.lock().drain().map(|(_, sink)| sink).collect();
    for sink in sinks.iter().filter_map(Weak::upgrade) {
      sink.disconnected();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::Event;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[derive(Default)]
  struct Counter {
    delivered: AtomicUsize,
    disconnected: AtomicUsize,
  }

  impl InboundSink for Counter {
    fn deliver(&self, _message: PluginMessage) {
      self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnected(&self) {
      self.disconnected.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn ended(player: PlayerHandle) -> PluginMessage {
    PluginMessage::Event {
      player,
      event: Event::Ended,
    }
  }

  #[test]
  fn test_routes_by_player() {
    let router = Router::new();
    let a = Arc::new(Counter::default());
    let b = Arc::new(Counter::default());
    let (pa, pb) = (PlayerHandle::next(), PlayerHandle::next());
    let weak_a: Weak<dyn InboundSink> = Arc::downgrade(&a) as Weak<dyn InboundSink>;
    let weak_b: Weak<dyn InboundSink> = Arc::downgrade(&b) as Weak<dyn InboundSink>;
    router.register(pa, weak_a);
    router.register(pb, weak_b);

    assert!(router.route(ended(pa)));
    assert!(router.route(ended(pa)));
    assert!(router.route(ended(pb)));
    assert_eq!(a.delivered.load(Ordering::SeqCst), 2);
    assert_eq!(b.delivered.load(Ordering::SeqCst), 1);

    router.unregister(pa);
    assert!(!router.route(ended(pa)));
  }

  #[test]
  fn test_dropped_sink_is_forgotten() {
    let router = Router::new();
    let player = PlayerHandle::next();
    let sink = Arc::new(Counter::default());
    router.register(player, Arc::downgrade(&sink) as Weak<dyn InboundSink>);
    drop(sink);

    assert!(!router.route(ended(player)));
    assert!(router.is_empty());
  }

  #[test]
  fn test_hello_is_not_routed() {
    let router = Router::new();
    assert!(!router.route(PluginMessage::Hello { interfaces: vec![] }));
  }

  #[test]
  fn test_close_all_notifies_once() {
    let router = Router::new();
    let sink = Arc::new(Counter::default());
    router.register(PlayerHandle::next(), Arc::downgrade(&sink) as Weak<dyn InboundSink>);

    router.close_all();
    router.close_all();
    assert_eq!(sink.disconnected.load(Ordering::SeqCst), 1);
    assert!(router.is_empty());
  }
}
