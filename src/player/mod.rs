//! Media player proxy.
//!
//! Architecture:
//! - `types.rs` - Handles, modes and the value types carried over the wire
//! - `operation.rs` - Operation kinds of the command surface
//! - `capability.rs` - Interface revisions and version negotiation
//! - `completion.rs` - Pending call tokens and the `Completion` future
//! - `context.rs` - Serial execution contexts for listener callbacks
//! - `listener.rs` - Listener traits and per-category slots
//! - `proxy.rs` - `MediaPlayer`, the per-player state machine

mod capability;
mod completion;
mod context;
mod listener;
mod operation;
mod proxy;
mod types;

pub use capability::{CapabilityEntry, CapabilityTable, CreateSupport, InterfaceVersion, Negotiated};
pub use completion::Completion;
pub use context::{ExecutionContext, Task, TaskQueue};
pub use listener::{
  BufferingListener, DrmListener, EventCategory, MediaEventsListener, SubtitleListener,
};
pub use operation::OperationKind;
pub use proxy::{CreateOptions, Lifecycle, MediaPlayer};
pub use types::{
  AudioTrackInfo, BindMode, DataSourceRef, DisplayMode, DrmOperation, DrmType, InstanceId,
  MediaError, PlaybackState, PlayerHandle, PlayerMode, Rect, StreamType, TextTrackInfo, TimeDelta,
  TimeTicks, VideoTrackInfo, Vr360Mode,
};
