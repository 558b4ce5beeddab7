//! Completion tokens for in-flight player calls.
//!
//! The proxy keeps one slot per `OperationKind`. A slot holds the token of the
//! single outstanding call of that kind; the caller holds the matching
//! `Completion` future. Typed output arrives as raw JSON and is decoded only
//! when a reply matches a live token.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::operation::OperationKind;
use super::types::DataSourceRef;
use crate::error::{Error, Result};

/// How a token ends.
#[derive(Debug)]
pub(crate) enum Resolution {
  /// The host replied with a status and optional output.
  Reply { result: i32, output: Option<Value> },
  /// The proxy resolved the token itself (teardown, timeout, lost connection).
  Failed(Error),
}

/// Converts raw reply output into the caller's type.
pub(crate) type Decoder<T> = fn(Option<Value>) -> Result<T>;

type Resolver = Box<dyn FnOnce(Resolution) + Send>;

/// Decoder for calls that carry no output.
pub(crate) fn no_output(_output: Option<Value>) -> Result<()> {
  Ok(())
}

/// Decoder for calls with a typed output.
pub(crate) fn typed_output<T: DeserializeOwned>(output: Option<Value>) -> Result<T> {
  let value = output.ok_or_else(|| Error::MalformedReply("missing output".to_string()))?;
  serde_json::from_value(value).map_err(|e| Error::MalformedReply(e.to_string()))
}

/// One in-flight call, owned by the call table while pending.
pub(crate) struct PendingCall {
  pub(crate) kind: OperationKind,
  pub(crate) seq: u64,
  /// Source an `AttachDataSource` call will attach on success.
  pub(crate) attach_target: Option<DataSourceRef>,
  resolver: Resolver,
  timer: Option<JoinHandle<()>>,
}

impl PendingCall {
  /// Create a token and the future its caller awaits.
  pub(crate) fn new<T: Send + 'static>(
    kind: OperationKind,
    seq: u64,
    decode: Decoder<T>,
  ) -> (Self, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    let resolver: Resolver = Box::new(move |resolution| {
      let result = match resolution {
        Resolution::Reply { result, output } => {
          Error::check_status(result).and_then(|()| decode(output))
        }
        Resolution::Failed(err) => Err(err),
      };
      // The caller may have dropped its completion.
      let _ = tx.send(result);
    });

    let call = Self {
      kind,
      seq,
      attach_target: None,
      resolver,
      timer: None,
    };
    (call, Completion::pending(rx))
  }

  pub(crate) fn with_attach_target(mut self, data_source: DataSourceRef) -> Self {
    self.attach_target = Some(data_source);
    self
  }

  /// Resolve exactly once; consumes the token.
  pub(crate) fn resolve(self, resolution: Resolution) {
    if let Some(timer) = self.timer {
      timer.abort();
    }
    (self.resolver)(resolution);
  }
}

impl std::fmt::Debug for PendingCall {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PendingCall")
      .field("kind", &self.kind)
      .field("seq", &self.seq)
      .field("attach_target", &self.attach_target)
      .finish()
  }
}

/// Per-kind table of outstanding calls.
pub(crate) struct CallTable {
  slots: [Option<PendingCall>; OperationKind::COUNT],
  next_seq: u64,
}

impl CallTable {
  pub(crate) fn new() -> Self {
    Self {
      slots: std::array::from_fn(|_| None),
      next_seq: 1,
    }
  }

  pub(crate) fn is_pending(&self, kind: OperationKind) -> bool {
    self.slots[kind.index()].is_some()
  }

  pub(crate) fn pending_count(&self) -> usize {
    self.slots.iter().filter(|slot| slot.is_some()).count()
  }

  pub(crate) fn next_seq(&mut self) -> u64 {
    let seq = self.next_seq;
    self.next_seq += 1;
    seq
  }

  /// Occupy the slot of `call.kind`. The slot must be free.
  pub(crate) fn insert(&mut self, call: PendingCall) {
    let slot = &mut self.slots[call.kind.index()];
    debug_assert!(slot.is_none(), "{} slot already occupied", call.kind);
    *slot = Some(call);
  }

  pub(crate) fn set_timer(&mut self, kind: OperationKind, seq: u64, timer: JoinHandle<()>) {
    match &mut self.slots[kind.index()] {
      Some(call) if call.seq == seq => call.timer = Some(timer),
      _ => timer.abort(),
    }
  }

  /// Take the token for `kind` only if it carries `seq`.
  pub(crate) fn take(&mut self, kind: OperationKind, seq: u64) -> Option<PendingCall> {
    let slot = &mut self.slots[kind.index()];
    if slot.as_ref().is_some_and(|call| call.seq == seq) {
      slot.take()
    } else {
      None
    }
  }

  /// Take every token whose kind matches.
  pub(crate) fn take_where<F>(&mut self, mut predicate: F) -> Vec<PendingCall>
  where
    F: FnMut(OperationKind) -> bool,
  {
    let mut taken = Vec::new();
    for slot in self.slots.iter_mut() {
      if matches!(slot, Some(call) if predicate(call.kind)) {
        taken.extend(slot.take());
      }
    }
    taken
  }

  pub(crate) fn drain(&mut self) -> Vec<PendingCall> {
    self.take_where(|_| true)
  }
}

enum CompletionState<T> {
  Ready(Result<T>),
  Pending(oneshot::Receiver<Result<T>>),
  /// The result has been handed out.
  Taken,
}

/// Outcome of an accepted call; resolves exactly once.
///
/// A completion whose token is dropped without a resolution yields
/// `Error::Aborted`.
#[must_use = "a completion does nothing unless awaited or polled"]
pub struct Completion<T> {
  state: CompletionState<T>,
}

impl<T> Completion<T> {
  pub(crate) fn ready(result: Result<T>) -> Self {
    Self {
      state: CompletionState::Ready(result),
    }
  }

  fn pending(rx: oneshot::Receiver<Result<T>>) -> Self {
    Self {
      state: CompletionState::Pending(rx),
    }
  }

  /// Take the result if it is available and has not been taken yet.
  pub fn try_take(&mut self) -> Option<Result<T>> {
    FutureExt::now_or_never(self)
  }

  /// Whether the result has already been handed out.
  pub fn is_taken(&self) -> bool {
    matches!(self.state, CompletionState::Taken)
  }

  /// Block the current thread until the call resolves.
  ///
  /// # Panics
  ///
  /// Panics when called from within an async runtime, or after the result
  /// was already taken with `try_take`.
  pub fn wait_blocking(self) -> Result<T> {
    match self.state {
      CompletionState::Ready(result) => result,
      CompletionState::Pending(rx) => rx.blocking_recv().unwrap_or(Err(Error::Aborted)),
      CompletionState::Taken => panic!("completion result already taken"),
    }
  }
}

// The result is never pinned in place.
impl<T> Unpin for Completion<T> {}

impl<T> Future for Completion<T> {
  type Output = Result<T>;

  /// Once the result has been returned, further polls stay pending.
  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match std::mem::replace(&mut self.state, CompletionState::Taken) {
      CompletionState::Ready(result) => Poll::Ready(result),
      CompletionState::Pending(mut rx) => match Pin::new(&mut rx).poll(cx) {
        Poll::Pending => {
          self.state = CompletionState::Pending(rx);
          Poll::Pending
        }
        Poll::Ready(received) => Poll::Ready(received.unwrap_or(Err(Error::Aborted))),
      },
      CompletionState::Taken => Poll::Pending,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorCode;
  use crate::player::types::VideoTrackInfo;
  use serde_json::json;

  #[test]
  fn test_typed_output_is_decoded() {
    let (call, mut completion) =
      PendingCall::new::<f64>(OperationKind::GetDuration, 1, typed_output);
    assert!(completion.try_take().is_none());
    call.resolve(Resolution::Reply {
      result: 0,
      output: Some(json!(42.5)),
    });
    assert_eq!(completion.try_take().unwrap().unwrap(), 42.5);
  }

  #[test]
  fn test_track_list_output() {
    let (call, completion) = PendingCall::new::<Vec<VideoTrackInfo>>(
      OperationKind::GetVideoTracksList,
      3,
      typed_output,
    );
    call.resolve(Resolution::Reply {
      result: 0,
      output: Some(json!([
        {"index": 0, "bitrate": 500000, "width": 1280, "height": 720},
        {"index": 1, "bitrate": 2500000, "width": 1920, "height": 1080}
      ])),
    });
    let tracks = completion.wait_blocking().unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[1].width, 1920);
  }

  #[test]
  fn test_host_failure_skips_decoding() {
    let (call, completion) = PendingCall::new::<f64>(OperationKind::GetDuration, 1, typed_output);
    call.resolve(Resolution::Reply {
      result: -12,
      output: None,
    });
    match completion.wait_blocking() {
      Err(Error::Host(code)) => assert_eq!(code, ErrorCode::NotSupported),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_missing_output_is_malformed() {
    let (call, completion) =
      PendingCall::new::<f64>(OperationKind::GetCurrentTime, 1, typed_output);
    call.resolve(Resolution::Reply {
      result: 0,
      output: None,
    });
    assert!(matches!(
      completion.wait_blocking(),
      Err(Error::MalformedReply(_))
    ));
  }

  #[test]
  fn test_dropped_token_aborts() {
    let (call, completion) = PendingCall::new::<()>(OperationKind::Play, 1, no_output);
    drop(call);
    assert!(matches!(completion.wait_blocking(), Err(Error::Aborted)));
  }

  #[test]
  fn test_table_matches_kind_and_seq() {
    let mut table = CallTable::new();
    let seq = table.next_seq();
    let (call, _completion) = PendingCall::new::<()>(OperationKind::Play, seq, no_output);
    table.insert(call);

    assert!(table.is_pending(OperationKind::Play));
    assert!(table.take(OperationKind::Play, seq + 1).is_none());
    assert!(table.take(OperationKind::Pause, seq).is_none());
    assert!(table.take(OperationKind::Play, seq).is_some());
    assert!(!table.is_pending(OperationKind::Play));
    assert!(table.take(OperationKind::Play, seq).is_none());
  }

  #[test]
  fn test_take_where_and_drain() {
    let mut table = CallTable::new();
    let mut completions = Vec::new();
    for kind in [
      OperationKind::Play,
      OperationKind::SetDisplayRect,
      OperationKind::Seek,
    ] {
      let seq = table.next_seq();
      let (call, completion) = PendingCall::new::<()>(kind, seq, no_output);
      table.insert(call);
      completions.push(completion);
    }

    let taken = table.take_where(OperationKind::requires_data_source);
    assert_eq!(taken.len(), 2);
    assert_eq!(table.pending_count(), 1);
    assert_eq!(table.drain().len(), 1);
    assert_eq!(table.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_completion_is_a_future() {
    let (call, completion) = PendingCall::new::<()>(OperationKind::Stop, 1, no_output);
    tokio::spawn(async move {
      call.resolve(Resolution::Reply {
        result: 0,
        output: None,
      });
    });
    completion.await.unwrap();
  }

  #[test]
  fn test_result_is_taken_once() {
    let (call, mut completion) = PendingCall::new::<()>(OperationKind::Pause, 4, no_output);
    call.resolve(Resolution::Reply {
      result: 0,
      output: None,
    });

    assert!(completion.try_take().unwrap().is_ok());
    assert!(completion.is_taken());
    assert!(completion.try_take().is_none());
    assert!(completion.try_take().is_none());
  }

  #[test]
  fn test_abort_is_taken_once() {
    let (call, mut completion) = PendingCall::new::<()>(OperationKind::Seek, 5, no_output);
    drop(call);

    assert!(matches!(completion.try_take(), Some(Err(Error::Aborted))));
    assert!(completion.try_take().is_none());

    let mut ready = Completion::ready(Ok(1u8));
    assert_eq!(ready.try_take().unwrap().unwrap(), 1);
    assert!(ready.try_take().is_none());
  }

  #[tokio::test]
  async fn test_ready_completion() {
    let completion = Completion::ready(Ok(7u32));
    assert_eq!(completion.await.unwrap(), 7);
  }
}
