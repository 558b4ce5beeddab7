//! Client-side proxy for one remote media player.
//!
//! `MediaPlayer` validates every call locally, sends at most one command per
//! operation kind to the host, and resolves the caller's `Completion` when the
//! matching reply comes back. Unsolicited events are handed to the listener
//! slots, which repost them onto each listener's execution context.
//!
//! All mutable state sits behind one mutex; inbound messages from the
//! transport and calls from the application both go through it, so the two
//! never interleave inside the state machine.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::capability::{CapabilityTable, InterfaceVersion, Negotiated};
use super::completion::{no_output, typed_output, CallTable, Completion, Decoder, PendingCall, Resolution};
use super::context::ExecutionContext;
use super::listener::{
  BufferingListener, DrmListener, EventCategory, ListenerSlot, ListenerSlots, MediaEventsListener,
  SlotChange, SubtitleListener,
};
use super::operation::OperationKind;
use super::types::{
  AudioTrackInfo, BindMode, DataSourceRef, DisplayMode, DrmOperation, DrmType, InstanceId,
  PlaybackState, PlayerHandle, PlayerMode, Rect, StreamType, TextTrackInfo, TimeDelta, TimeTicks,
  VideoTrackInfo, Vr360Mode,
};
use crate::error::{Error, Result, STATUS_OK};
use crate::protocol::{Command, Event, HostMessage, PluginMessage, Reply};
use crate::transport::{InboundSink, Transport, TransportError};

/// Options for `MediaPlayer::create`.
#[derive(Debug, Clone)]
pub struct CreateOptions {
  pub instance: InstanceId,
  pub mode: PlayerMode,
  pub bind: BindMode,
  /// Context for listeners installed without one (None = spawn one per player).
  pub context: Option<ExecutionContext>,
  /// Abort calls whose reply takes longer than this.
  pub call_timeout: Option<Duration>,
}

impl CreateOptions {
  pub fn new(instance: InstanceId) -> Self {
    Self {
      instance,
      mode: PlayerMode::default(),
      bind: BindMode::default(),
      context: None,
      call_timeout: None,
    }
  }

  pub fn mode(mut self, mode: PlayerMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn bind(mut self, bind: BindMode) -> Self {
    self.bind = bind;
    self
  }

  pub fn context(mut self, context: ExecutionContext) -> Self {
    self.context = Some(context);
    self
  }

  pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.call_timeout = timeout;
    self
  }
}

/// Lifecycle of a player handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Active,
  /// Teardown has begun; every call is refused.
  Detaching,
  Destroyed,
}

struct State {
  lifecycle: Lifecycle,
  data_source: Option<DataSourceRef>,
  calls: CallTable,
  listeners: ListenerSlots,
}

struct Inner {
  handle: PlayerHandle,
  negotiated: Negotiated,
  transport: Arc<dyn Transport>,
  default_context: ExecutionContext,
  call_timeout: Option<Duration>,
  state: Mutex<State>,
  weak_self: Weak<Inner>,
}

/// Proxy for one player on the host.
///
/// Dropping the proxy tears the player down: pending calls resolve with
/// `Error::Aborted`, active listeners are stopped and the host player is
/// destroyed.
pub struct MediaPlayer {
  inner: Arc<Inner>,
}

impl MediaPlayer {
  /// Negotiate an interface with the host and create a player.
  ///
  /// Fails with `NoInterface` when no revision is shared or the shared one
  /// cannot express `options`. No player exists on failure.
  pub fn create(
    transport: Arc<dyn Transport>,
    table: &CapabilityTable,
    options: CreateOptions,
  ) -> Result<Self> {
    let negotiated = table.negotiate(&transport.advertised_interfaces())?;
    let bind = negotiated.creation_bind_mode(options.mode, options.bind)?;
    let handle = PlayerHandle::next();

    let default_context = match options.context {
      Some(context) => context,
      None => ExecutionContext::spawn(format!("{}-events", handle))?,
    };

    transport.post(HostMessage::Create {
      player: handle,
      instance: options.instance,
      mode: options.mode,
      interface: negotiated.wire_name().to_string(),
    })?;

    if bind == BindMode::Bind {
      if let Err(e) = transport.bind_graphics(handle, options.instance) {
        log::error!("Failed to bind {} to instance graphics: {}", handle, e);
        let _ = transport.post(HostMessage::Destroy { player: handle });
        return Err(e.into());
      }
    }

    log::info!(
      "Created {} for instance {} using interface {}",
      handle,
      options.instance.0,
      negotiated.version()
    );

    let inner = Arc::new_cyclic(|weak_self| Inner {
      handle,
      negotiated,
      transport: transport.clone(),
      default_context,
      call_timeout: options.call_timeout,
      state: Mutex::new(State {
        lifecycle: Lifecycle::Active,
        data_source: None,
        calls: CallTable::new(),
        listeners: ListenerSlots::new(),
      }),
      weak_self: weak_self.clone(),
    });
    let sink: Weak<dyn InboundSink> = Arc::downgrade(&inner) as Weak<dyn InboundSink>;
    transport.register(handle, sink);

    Ok(Self { inner })
  }

  pub fn handle(&self) -> PlayerHandle {
    self.inner.handle
  }

  /// Negotiated interface revision. Fixed for the player's lifetime.
  pub fn version(&self) -> InterfaceVersion {
    self.inner.negotiated.version()
  }

  pub fn supports(&self, kind: OperationKind) -> bool {
    self.inner.negotiated.supports(kind)
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.inner.state.lock().lifecycle
  }

  /// Currently attached data source.
  pub fn data_source(&self) -> Option<DataSourceRef> {
    self.inner.state.lock().data_source
  }

  pub fn is_pending(&self, kind: OperationKind) -> bool {
    self.inner.state.lock().calls.is_pending(kind)
  }

  pub fn pending_calls(&self) -> usize {
    self.inner.state.lock().calls.pending_count()
  }

  /// Whether a listener of `category` is installed.
  pub fn has_listener(&self, category: EventCategory) -> bool {
    self.inner.state.lock().listeners.is_active(category)
  }

  /// Context used for listeners installed without an explicit one.
  pub fn default_context(&self) -> &ExecutionContext {
    &self.inner.default_context
  }

  /// Feed one inbound message to the player.
  ///
  /// Transports call this through the router; it is the only way replies
  /// and events enter the state machine.
  pub fn handle_message(&self, message: PluginMessage) {
    self.inner.handle_message(message);
  }

  /// Attach `data_source`, replacing the current one once the host accepts.
  ///
  /// Attaching the source that is already attached succeeds immediately.
  pub fn attach_data_source(&self, data_source: DataSourceRef) -> Result<Completion<()>> {
    {
      let state = self.inner.state.lock();
      if state.lifecycle == Lifecycle::Active && state.data_source == Some(data_source) {
        log::debug!("{} already attached to {}", self.inner.handle, data_source);
        return Ok(Completion::ready(Ok(())));
      }
    }
    self.call(Command::AttachDataSource { data_source }, no_output)
  }

  /// Drop the attached source.
  ///
  /// Pending calls that need a data source resolve with `Error::Aborted`.
  pub fn detach_data_source(&self) -> Result<()> {
    self.inner.detach_data_source()
  }

  pub fn play(&self) -> Result<Completion<()>> {
    self.call(Command::Play, no_output)
  }

  pub fn pause(&self) -> Result<Completion<()>> {
    self.call(Command::Pause, no_output)
  }

  pub fn stop(&self) -> Result<Completion<()>> {
    self.call(Command::Stop, no_output)
  }

  /// Seek to an absolute media time.
  pub fn seek(&self, time: TimeTicks) -> Result<Completion<()>> {
    self.call(Command::Seek { time }, no_output)
  }

  pub fn set_playback_rate(&self, rate: f64) -> Result<Completion<()>> {
    self.call(Command::SetPlaybackRate { rate }, no_output)
  }

  pub fn get_duration(&self) -> Result<Completion<TimeDelta>> {
    self.call(Command::GetDuration, typed_output)
  }

  pub fn get_current_time(&self) -> Result<Completion<TimeTicks>> {
    self.call(Command::GetCurrentTime, typed_output)
  }

  pub fn get_player_state(&self) -> Result<Completion<PlaybackState>> {
    self.call(Command::GetPlayerState, typed_output)
  }

  pub fn get_current_video_track_info(&self) -> Result<Completion<VideoTrackInfo>> {
    self.call(Command::GetCurrentVideoTrackInfo, typed_output)
  }

  pub fn get_video_tracks_list(&self) -> Result<Completion<Vec<VideoTrackInfo>>> {
    self.call(Command::GetVideoTracksList, typed_output)
  }

  pub fn get_current_audio_track_info(&self) -> Result<Completion<AudioTrackInfo>> {
    self.call(Command::GetCurrentAudioTrackInfo, typed_output)
  }

  pub fn get_audio_tracks_list(&self) -> Result<Completion<Vec<AudioTrackInfo>>> {
    self.call(Command::GetAudioTracksList, typed_output)
  }

  pub fn get_current_text_track_info(&self) -> Result<Completion<TextTrackInfo>> {
    self.call(Command::GetCurrentTextTrackInfo, typed_output)
  }

  pub fn get_text_tracks_list(&self) -> Result<Completion<Vec<TextTrackInfo>>> {
    self.call(Command::GetTextTracksList, typed_output)
  }

  /// Switch the active track of one stream type.
  pub fn select_track(&self, stream_type: StreamType, index: u32) -> Result<Completion<()>> {
    self.call(Command::SelectTrack { stream_type, index }, no_output)
  }

  /// Load a subtitle file; resolves with the track it was added as.
  pub fn add_external_subtitles(
    &self,
    file_path: &str,
    encoding: Option<&str>,
  ) -> Result<Completion<TextTrackInfo>> {
    self.call(
      Command::AddExternalSubtitles {
        file_path: file_path.to_string(),
        encoding: encoding.map(str::to_string),
      },
      typed_output,
    )
  }

  pub fn set_subtitles_delay(&self, delay: TimeDelta) -> Result<Completion<()>> {
    self.call(Command::SetSubtitlesDelay { delay }, no_output)
  }

  /// Position the video within the instance. Width and height must be positive.
  pub fn set_display_rect(&self, rect: Rect) -> Result<Completion<()>> {
    self.call(Command::SetDisplayRect { rect }, no_output)
  }

  pub fn set_display_mode(&self, mode: DisplayMode) -> Result<Completion<()>> {
    self.call(Command::SetDisplayMode { mode }, no_output)
  }

  pub fn set_drm_specific_data(
    &self,
    drm_type: DrmType,
    operation: DrmOperation,
    data: &[u8],
  ) -> Result<Completion<()>> {
    self.call(
      Command::SetDRMSpecificData {
        drm_type,
        operation,
        data: data.to_vec(),
      },
      no_output,
    )
  }

  pub fn set_vr360_mode(&self, mode: Vr360Mode) -> Result<Completion<()>> {
    self.call(Command::SetVr360Mode { mode }, no_output)
  }

  /// Rotate the 360 view, angles in degrees.
  pub fn set_vr360_rotation(&self, horizontal: f32, vertical: f32) -> Result<Completion<()>> {
    self.call(
      Command::SetVr360Rotation {
        horizontal,
        vertical,
      },
      no_output,
    )
  }

  pub fn set_vr360_zoom_level(&self, level: u32) -> Result<Completion<()>> {
    self.call(Command::SetVr360ZoomLevel { level }, no_output)
  }

  /// Install (or with `None`, remove) the media events listener.
  ///
  /// Events are delivered on `context`, or the player's default context.
  pub fn set_media_events_listener(
    &self,
    listener: Option<Arc<dyn MediaEventsListener>>,
    context: Option<ExecutionContext>,
  ) -> Result<()> {
    self
      .inner
      .set_listener(EventCategory::MediaEvents, |slots| &mut slots.media, listener, context)
  }

  pub fn set_subtitle_listener(
    &self,
    listener: Option<Arc<dyn SubtitleListener>>,
    context: Option<ExecutionContext>,
  ) -> Result<()> {
    self
      .inner
      .set_listener(EventCategory::Subtitle, |slots| &mut slots.subtitle, listener, context)
  }

  pub fn set_buffering_listener(
    &self,
    listener: Option<Arc<dyn BufferingListener>>,
    context: Option<ExecutionContext>,
  ) -> Result<()> {
    self
      .inner
      .set_listener(EventCategory::Buffering, |slots| &mut slots.buffering, listener, context)
  }

  pub fn set_drm_listener(
    &self,
    listener: Option<Arc<dyn DrmListener>>,
    context: Option<ExecutionContext>,
  ) -> Result<()> {
    self
      .inner
      .set_listener(EventCategory::Drm, |slots| &mut slots.drm, listener, context)
  }

  /// Tear the player down. Every later call fails with `BadResource`.
  pub fn detach(&self) -> Result<()> {
    if self.inner.teardown(|| Error::Aborted, true) {
      Ok(())
    } else {
      Err(Error::BadResource)
    }
  }

  fn call<T: Send + 'static>(&self, command: Command, decode: Decoder<T>) -> Result<Completion<T>> {
    self.inner.call(command, decode)
  }
}

impl Drop for MediaPlayer {
  fn drop(&mut self) {
    self.inner.teardown(|| Error::Aborted, true);
  }
}

impl std::fmt::Debug for MediaPlayer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MediaPlayer")
      .field("handle", &self.inner.handle)
      .field("version", &self.inner.negotiated.version())
      .field("lifecycle", &self.lifecycle())
      .finish()
  }
}

/// Argument checks that need no host round-trip.
fn check_arguments(command: &Command) -> std::result::Result<(), String> {
  match command {
    Command::AttachDataSource { data_source } if !data_source.is_valid() => {
      Err(format!("invalid data source {}", data_source))
    }
    Command::Seek { time } if !time.is_finite() => Err(format!("invalid seek time {}", time)),
    Command::SetPlaybackRate { rate } if !rate.is_finite() => {
      Err(format!("invalid playback rate {}", rate))
    }
    Command::SelectTrack {
      stream_type: StreamType::Unknown,
      ..
    } => Err("unknown stream type".to_string()),
    Command::AddExternalSubtitles { file_path, .. } if file_path.is_empty() => {
      Err("empty subtitles path".to_string())
    }
    Command::SetSubtitlesDelay { delay } if !delay.is_finite() => {
      Err(format!("invalid subtitles delay {}", delay))
    }
    Command::SetDisplayRect { rect } if !rect.is_valid() => {
      Err(format!("display rect {}x{} is empty", rect.width, rect.height))
    }
    Command::SetVr360Rotation {
      horizontal,
      vertical,
    } if !horizontal.is_finite() || !vertical.is_finite() => {
      Err(format!("invalid rotation {}/{}", horizontal, vertical))
    }
    _ => Ok(()),
  }
}

impl Inner {
  /// Decide whether `command` may be sent now.
  fn admit(&self, state: &State, command: &Command) -> Result<()> {
    let kind = command.kind();
    if state.lifecycle != Lifecycle::Active {
      return Err(Error::BadResource);
    }
    if !self.negotiated.supports(kind) {
      return Err(Error::NotSupported(kind, self.negotiated.version()));
    }
    check_arguments(command).map_err(Error::BadArgument)?;
    if kind.requires_data_source() && state.data_source.is_none() {
      return Err(Error::BadArgument(format!(
        "{} requires an attached data source",
        kind
      )));
    }
    if state.calls.is_pending(kind) {
      return Err(Error::InProgress(kind));
    }
    Ok(())
  }

  fn call<T: Send + 'static>(&self, command: Command, decode: Decoder<T>) -> Result<Completion<T>> {
    let kind = command.kind();
    let (seq, completion) = {
      let mut state = self.state.lock();
      self
        .admit(&state, &command)
        .inspect_err(|e| log::error!("{} rejected {}: {}", self.handle, kind, e))?;

      let seq = state.calls.next_seq();
      let (mut call, completion) = PendingCall::new(kind, seq, decode);
      if let Command::AttachDataSource { data_source } = &command {
        call = call.with_attach_target(*data_source);
      }
      state.calls.insert(call);
      (seq, completion)
    };

    // Sent without the state lock: the reply may arrive before `post` returns.
    let message = HostMessage::Call {
      player: self.handle,
      seq,
      command,
    };
    if let Err(e) = self.transport.post(message) {
      log::warn!("{} failed to send {}: {}", self.handle, kind, e);
      self.state.lock().calls.take(kind, seq);
      return Err(e.into());
    }

    if let Some(timeout) = self.call_timeout {
      if let Some(timer) = self.start_timer(kind, seq, timeout) {
        self.state.lock().calls.set_timer(kind, seq, timer);
      }
    }
    Ok(completion)
  }

  fn start_timer(&self, kind: OperationKind, seq: u64, timeout: Duration) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      log::debug!("{} has no runtime, {} runs without timeout", self.handle, kind);
      return None;
    };
    let weak = self.weak_self.clone();
    Some(runtime.spawn(async move {
      tokio::time::sleep(timeout).await;
      if let Some(inner) = weak.upgrade() {
        inner.expire(kind, seq, timeout);
      }
    }))
  }

  fn expire(&self, kind: OperationKind, seq: u64, timeout: Duration) {
    let call = self.state.lock().calls.take(kind, seq);
    if let Some(call) = call {
      log::warn!("{} {} timed out after {:?}", self.handle, kind, timeout);
      call.resolve(Resolution::Failed(Error::Aborted));
    }
  }

  fn handle_message(&self, message: PluginMessage) {
    if message.player().is_some_and(|player| player != self.handle) {
      log::debug!("{} ignoring message for another player", self.handle);
      return;
    }
    match message {
      PluginMessage::Hello { .. } => log::debug!("{} ignoring hello", self.handle),
      PluginMessage::Reply(reply) => self.handle_reply(reply),
      PluginMessage::Event { event, .. } => self.handle_event(event),
    }
  }

  fn handle_reply(&self, reply: Reply) {
    let call = {
      let mut state = self.state.lock();
      let Some(call) = state.calls.take(reply.kind, reply.seq) else {
        log::debug!(
          "{} dropping stale {} reply (seq {})",
          self.handle,
          reply.kind,
          reply.seq
        );
        return;
      };

      if let Some(target) = call.attach_target {
        if reply.result == STATUS_OK {
          if let Some(previous) = state.data_source.replace(target) {
            log::info!("{} released {}", self.handle, previous);
          }
          log::info!("{} attached {}", self.handle, target);
        }
      }
      call
    };

    call.resolve(Resolution::Reply {
      result: reply.result,
      output: reply.output,
    });
  }

  fn handle_event(&self, event: Event) {
    let state = self.state.lock();
    if state.lifecycle != Lifecycle::Active {
      log::debug!("{} detached, {:?} event discarded", self.handle, event.category());
      return;
    }
    state.listeners.dispatch(event);
  }

  fn set_listener<L>(
    &self,
    category: EventCategory,
    slot: fn(&mut ListenerSlots) -> &mut ListenerSlot<L>,
    listener: Option<Arc<L>>,
    context: Option<ExecutionContext>,
  ) -> Result<()>
  where
    L: ?Sized + Send + Sync + 'static,
  {
    let (enabled, generation) = {
      let mut state = self.state.lock();
      if state.lifecycle != Lifecycle::Active {
        log::error!("{} rejected {:?} listener: detached", self.handle, category);
        return Err(Error::BadResource);
      }

      let context = context.unwrap_or_else(|| self.default_context.clone());
      let target = slot(&mut state.listeners);
      let enabled = match target.install(listener, context) {
        SlotChange::Started => true,
        SlotChange::Stopped => false,
        SlotChange::Replaced | SlotChange::Unchanged => return Ok(()),
      };
      (enabled, target.generation())
    };

    let notice = HostMessage::SetListener {
      player: self.handle,
      category,
      enabled,
    };
    if let Err(e) = self.transport.post(notice) {
      log::warn!("{} failed to update {:?} listener: {}", self.handle, category, e);
      if enabled {
        slot(&mut self.state.lock().listeners).clear_if(generation);
      }
      return Err(e.into());
    }
    log::debug!(
      "{} {:?} listener {}",
      self.handle,
      category,
      if enabled { "started" } else { "stopped" }
    );
    Ok(())
  }

  fn detach_data_source(&self) -> Result<()> {
    let (source, aborted) = {
      let mut state = self.state.lock();
      if state.lifecycle != Lifecycle::Active {
        return Err(Error::BadResource);
      }
      let Some(source) = state.data_source.take() else {
        return Ok(());
      };
      let aborted = state.calls.take_where(OperationKind::requires_data_source);
      (source, aborted)
    };

    if let Err(e) = self
      .transport
      .post(HostMessage::DetachDataSource { player: self.handle })
    {
      log::warn!("{} failed to notify host of detach: {}", self.handle, e);
    }

    log::info!(
      "{} detached {}, aborting {} pending call(s)",
      self.handle,
      source,
      aborted.len()
    );
    for call in aborted {
      call.resolve(Resolution::Failed(Error::Aborted));
    }
    Ok(())
  }

  /// Move to `Detaching`, abort everything, then to `Destroyed`.
  ///
  /// Returns false when teardown already happened.
  fn teardown<F>(&self, abort_error: F, notify_host: bool) -> bool
  where
    F: Fn() -> Error,
  {
    let (aborted, stopped) = {
      let mut state = self.state.lock();
      if state.lifecycle != Lifecycle::Active {
        return false;
      }
      state.lifecycle = Lifecycle::Detaching;
      if let Some(source) = state.data_source.take() {
        log::debug!("{} released {}", self.handle, source);
      }
      (state.calls.drain(), state.listeners.clear_all())
    };

    log::info!(
      "Tearing down {}: {} pending call(s), {} listener(s)",
      self.handle,
      aborted.len(),
      stopped.len()
    );
    for call in aborted {
      call.resolve(Resolution::Failed(abort_error()));
    }

    if notify_host {
      for category in stopped {
        let notice = HostMessage::SetListener {
          player: self.handle,
          category,
          enabled: false,
        };
        if let Err(e) = self.transport.post(notice) {
          log::warn!("{} failed to stop {:?} listener: {}", self.handle, category, e);
        }
      }
      if let Err(e) = self.transport.post(HostMessage::Destroy { player: self.handle }) {
        log::warn!("{} failed to send destroy: {}", self.handle, e);
      }
    }
    self.transport.unregister(self.handle);

    self.state.lock().lifecycle = Lifecycle::Destroyed;
    true
  }
}

impl InboundSink for Inner {
  fn deliver(&self, message: PluginMessage) {
    self.handle_message(message);
  }

  fn disconnected(&self) {
    log::info!("{} lost its host connection", self.handle);
    self.teardown(|| Error::Transport(TransportError::Disconnected), false);
  }
}
