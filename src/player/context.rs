//! Serial execution contexts.
//!
//! Listener callbacks never run on the transport's delivery thread. Each
//! listener is bound to the context captured when it was installed, and every
//! event for it is posted there, so one listener observes its events in a
//! single sequential order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender};

/// Unit of work posted to a context.
pub type Task = Box<dyn FnOnce() + Send>;

static CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextInner {
  id: u64,
  name: String,
  tx: Sender<Task>,
}

/// Handle to a serial task queue. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionContext {
  inner: Arc<ContextInner>,
}

impl ExecutionContext {
  /// Create a context whose queue the caller drives.
  pub fn manual(name: impl Into<String>) -> (Self, TaskQueue) {
    let (tx, rx) = async_channel::unbounded();
    let context = Self {
      inner: Arc::new(ContextInner {
        id: CONTEXT_ID.fetch_add(1, Ordering::SeqCst),
        name: name.into(),
        tx,
      }),
    };
    let queue = TaskQueue {
      name: context.inner.name.clone(),
      rx,
    };
    (context, queue)
  }

  /// Create a context with its own runner.
  ///
  /// Inside a tokio runtime the queue runs as a task, otherwise on a
  /// dedicated thread. The runner exits once every handle is dropped.
  pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
    let (context, queue) = Self::manual(name);
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(queue.run());
      }
      Err(_) => {
        std::thread::Builder::new()
          .name(context.name().to_string())
          .spawn(move || queue.run_blocking())?;
      }
    }
    log::debug!("Execution context '{}' started", context.name());
    Ok(context)
  }

  pub fn id(&self) -> u64 {
    self.inner.id
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// Queue `task` behind everything already posted.
  ///
  /// Returns false when the queue has shut down.
  pub fn post<F>(&self, task: F) -> bool
  where
    F: FnOnce() + Send + 'static,
  {
    self.inner.tx.try_send(Box::new(task)).is_ok()
  }
}

impl PartialEq for ExecutionContext {
  fn eq(&self, other: &Self) -> bool {
    self.inner.id == other.inner.id
  }
}

impl Eq for ExecutionContext {}

impl std::fmt::Debug for ExecutionContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionContext")
      .field("id", &self.inner.id)
      .field("name", &self.inner.name)
      .finish()
  }
}

/// Receiving end of a context, i.e. its message loop.
pub struct TaskQueue {
  name: String,
  rx: Receiver<Task>,
}

impl TaskQueue {
  /// Run every task queued so far and return how many ran.
  pub fn run_pending(&self) -> usize {
    let mut count = 0;
    while let Ok(task) = self.rx.try_recv() {
      task();
      count += 1;
    }
    count
  }

  /// Run tasks until every context handle is gone.
  pub async fn run(self) {
    while let Ok(task) = self.rx.recv().await {
      task();
    }
    log::debug!("Execution context '{}' finished", self.name);
  }

  /// Blocking variant of `run` for plain threads.
  pub fn run_blocking(self) {
    while let Ok(task) = self.rx.recv_blocking() {
      task();
    }
    log::debug!("Execution context '{}' finished", self.name);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;
  use std::time::Duration;

  #[test]
  fn test_manual_queue_preserves_order() {
    let (context, queue) = ExecutionContext::manual("test");
    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..5 {
      let seen = seen.clone();
      assert!(context.post(move || seen.lock().push(i)));
    }
    assert!(seen.lock().is_empty());
    assert_eq!(queue.run_pending(), 5);
    assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(queue.run_pending(), 0);
  }

  #[test]
  fn test_post_fails_after_queue_dropped() {
    let (context, queue) = ExecutionContext::manual("closed");
    drop(queue);
    assert!(!context.post(|| {}));
  }

  #[test]
  fn test_contexts_are_distinct() {
    let (a, _qa) = ExecutionContext::manual("a");
    let (b, _qb) = ExecutionContext::manual("b");
    assert_ne!(a, b);
    assert_eq!(a.clone(), a);
  }

  #[test]
  fn test_spawn_outside_runtime_uses_thread() {
    let context = ExecutionContext::spawn("worker").unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    context.post(move || {
      let name = std::thread::current().name().map(str::to_string);
      let _ = tx.send(name);
    });
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("worker"));
  }

  #[tokio::test]
  async fn test_spawn_inside_runtime() {
    let context = ExecutionContext::spawn("task").unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    context.post(move || {
      let _ = tx.send(7);
    });
    assert_eq!(rx.await.unwrap(), 7);
  }
}
