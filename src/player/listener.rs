//! Event listeners and the slots that hold them.
//!
//! Each event category has one slot with at most one active listener. Every
//! installation is tied to a cancellation token; replacing or clearing the
//! slot cancels it, and an event already posted to the old listener's context
//! checks the token before it runs, so it is dropped instead of reaching a
//! listener that is no longer installed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::types::{DrmType, MediaError, TimeDelta, TimeTicks};
use crate::protocol::Event;

/// Event category, one per listener slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
  MediaEvents,
  Subtitle,
  Buffering,
  Drm,
}

/// Playback progress and errors.
pub trait MediaEventsListener: Send + Sync {
  /// Media time has advanced.
  fn on_time_update(&self, time: TimeTicks) {
    let _ = time;
  }

  /// Playback reached the end of the media.
  fn on_ended(&self) {}

  fn on_error(&self, error: MediaError) {
    let _ = error;
  }
}

/// Subtitle cues to be displayed by the application.
pub trait SubtitleListener: Send + Sync {
  fn on_show_subtitle(&self, duration: TimeDelta, text: &str);
}

pub trait BufferingListener: Send + Sync {
  fn on_buffering_start(&self) {}

  fn on_buffering_progress(&self, percent: u32) {
    let _ = percent;
  }

  fn on_buffering_complete(&self) {}
}

/// DRM initialization data and license requests.
pub trait DrmListener: Send + Sync {
  fn on_init_data_loaded(&self, drm_type: DrmType, init_data: &[u8]) {
    let _ = (drm_type, init_data);
  }

  fn on_license_request(&self, request: &[u8]) {
    let _ = request;
  }
}

/// Effect of an install on the slot, and therefore which notice the host needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotChange {
  /// Empty slot got a listener: host must start producing.
  Started,
  /// Active listener swapped: host is already producing.
  Replaced,
  /// Active listener removed: host must stop producing.
  Stopped,
  Unchanged,
}

struct Registration<L: ?Sized> {
  listener: Arc<L>,
  context: ExecutionContext,
  token: CancellationToken,
  generation: u64,
}

pub(crate) struct ListenerSlot<L: ?Sized> {
  category: EventCategory,
  active: Option<Registration<L>>,
  installs: u64,
}

impl<L: ?Sized + Send + Sync + 'static> ListenerSlot<L> {
  pub(crate) fn new(category: EventCategory) -> Self {
    Self {
      category,
      active: None,
      installs: 0,
    }
  }

  pub(crate) fn is_active(&self) -> bool {
    self.active.is_some()
  }

  /// Install, replace or (with `None`) remove the listener.
  pub(crate) fn install(&mut self, listener: Option<Arc<L>>, context: ExecutionContext) -> SlotChange {
    let previous = self.active.take();
    if let Some(previous) = &previous {
      previous.token.cancel();
    }

    match (previous, listener) {
      (None, None) => SlotChange::Unchanged,
      (Some(_), None) => SlotChange::Stopped,
      (previous, Some(listener)) => {
        self.installs += 1;
        self.active = Some(Registration {
          listener,
          context,
          token: CancellationToken::new(),
          generation: self.installs,
        });
        if previous.is_some() {
          SlotChange::Replaced
        } else {
          SlotChange::Started
        }
      }
    }
  }

  /// Remove the listener. Returns true if one was installed.
  pub(crate) fn clear(&mut self) -> bool {
    match self.active.take() {
      Some(registration) => {
        registration.token.cancel();
        true
      }
      None => false,
    }
  }

  /// Number of the latest installation.
  pub(crate) fn generation(&self) -> u64 {
    self.installs
  }

  /// Remove the listener only if it is still the one from `generation`.
  pub(crate) fn clear_if(&mut self, generation: u64) -> bool {
    if self
      .active
      .as_ref()
      .is_some_and(|registration| registration.generation == generation)
    {
      self.clear()
    } else {
      false
    }
  }

  /// Post `callback` to the installed listener's context.
  ///
  /// Returns false when the slot is empty or the context has shut down.
  pub(crate) fn deliver<F>(&self, callback: F) -> bool
  where
    F: FnOnce(&L) + Send + 'static,
  {
    let Some(registration) = &self.active else {
      log::debug!("No {:?} listener, event dropped", self.category);
      return false;
    };

    let listener = registration.listener.clone();
    let token = registration.token.clone();
    let category = self.category;
    let posted = registration.context.post(move || {
      if token.is_cancelled() {
        log::debug!("{:?} listener changed before delivery, event discarded", category);
        return;
      }
      callback(&*listener);
    });

    if !posted {
      log::warn!(
        "Execution context '{}' is gone, {:?} event dropped",
        registration.context.name(),
        category
      );
    }
    posted
  }
}

/// The four slots of one player.
pub(crate) struct ListenerSlots {
  pub(crate) media: ListenerSlot<dyn MediaEventsListener>,
  pub(crate) subtitle: ListenerSlot<dyn SubtitleListener>,
  pub(crate) buffering: ListenerSlot<dyn BufferingListener>,
  pub(crate) drm: ListenerSlot<dyn DrmListener>,
}

impl ListenerSlots {
  pub(crate) fn new() -> Self {
    Self {
      media: ListenerSlot::new(EventCategory::MediaEvents),
      subtitle: ListenerSlot::new(EventCategory::Subtitle),
      buffering: ListenerSlot::new(EventCategory::Buffering),
      drm: ListenerSlot::new(EventCategory::Drm),
    }
  }

  /// Route an inbound event to its slot.
  pub(crate) fn dispatch(&self, event: Event) -> bool {
    match event {
      Event::TimeUpdate { time } => self.media.deliver(move |l| l.on_time_update(time)),
      Event::Ended => self.media.deliver(|l| l.on_ended()),
      Event::Error { error } => self.media.deliver(move |l| l.on_error(error)),
      Event::ShowSubtitle { duration, text } => self
        .subtitle
        .deliver(move |l| l.on_show_subtitle(duration, &text)),
      Event::BufferingStart => self.buffering.deliver(|l| l.on_buffering_start()),
      Event::BufferingProgress { percent } => self
        .buffering
        .deliver(move |l| l.on_buffering_progress(percent)),
      Event::BufferingComplete => self.buffering.deliver(|l| l.on_buffering_complete()),
      Event::InitDataLoaded {
        drm_type,
        init_data,
      } => self
        .drm
        .deliver(move |l| l.on_init_data_loaded(drm_type, &init_data)),
      Event::LicenseRequest { request } => self.drm.deliver(move |l| l.on_license_request(&request)),
    }
  }

  pub(crate) fn is_active(&self, category: EventCategory) -> bool {
    match category {
      EventCategory::MediaEvents => self.media.is_active(),
      EventCategory::Subtitle => self.subtitle.is_active(),
      EventCategory::Buffering => self.buffering.is_active(),
      EventCategory::Drm => self.drm.is_active(),
    }
  }

  /// Clear every slot and return the categories that were active.
  pub(crate) fn clear_all(&mut self) -> Vec<EventCategory> {
    let mut cleared = Vec::new();
    if self.media.clear() {
      cleared.push(EventCategory::MediaEvents);
    }
    if self.subtitle.clear() {
      cleared.push(EventCategory::Subtitle);
    }
    if self.buffering.clear() {
      cleared.push(EventCategory::Buffering);
    }
    if self.drm.clear() {
      cleared.push(EventCategory::Drm);
    }
    cleared
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::context::TaskQueue;
  use parking_lot::Mutex;

  #[derive(Default)]
  struct Recorder {
    cues: Mutex<Vec<String>>,
  }

  impl SubtitleListener for Recorder {
    fn on_show_subtitle(&self, _duration: TimeDelta, text: &str) {
      self.cues.lock().push(text.to_string());
    }
  }

  fn subtitle_slot() -> (ListenerSlot<dyn SubtitleListener>, ExecutionContext, TaskQueue) {
    let (context, queue) = ExecutionContext::manual("listener-test");
    (ListenerSlot::new(EventCategory::Subtitle), context, queue)
  }

  fn cue(text: &str) -> Event {
    Event::ShowSubtitle {
      duration: 1.0,
      text: text.to_string(),
    }
  }

  #[test]
  fn test_install_transitions() {
    let (mut slot, context, _queue) = subtitle_slot();
    let a: Arc<dyn SubtitleListener> = Arc::new(Recorder::default());
    let b: Arc<dyn SubtitleListener> = Arc::new(Recorder::default());

    assert_eq!(slot.install(None, context.clone()), SlotChange::Unchanged);
    assert_eq!(slot.install(Some(a.clone()), context.clone()), SlotChange::Started);
    assert_eq!(slot.install(Some(a), context.clone()), SlotChange::Replaced);
    assert_eq!(slot.install(Some(b), context.clone()), SlotChange::Replaced);
    assert_eq!(slot.install(None, context.clone()), SlotChange::Stopped);
    assert!(!slot.is_active());
  }

  #[test]
  fn test_events_delivered_in_order_on_context() {
    let (context, queue) = ExecutionContext::manual("subtitles");
    let mut slots = ListenerSlots::new();
    let recorder = Arc::new(Recorder::default());
    slots.subtitle.install(Some(recorder.clone()), context);

    assert!(slots.dispatch(cue("first")));
    assert!(slots.dispatch(cue("second")));
    assert!(recorder.cues.lock().is_empty());

    queue.run_pending();
    assert_eq!(*recorder.cues.lock(), vec!["first", "second"]);
  }

  #[test]
  fn test_event_after_clear_is_discarded() {
    let (mut slot, context, queue) = subtitle_slot();
    let recorder = Arc::new(Recorder::default());
    slot.install(Some(recorder.clone()), context);

    assert!(slot.deliver(|l| l.on_show_subtitle(1.0, "in flight")));
    assert!(slot.clear());
    assert!(!slot.deliver(|l| l.on_show_subtitle(1.0, "late")));

    queue.run_pending();
    assert!(recorder.cues.lock().is_empty());
  }

  #[test]
  fn test_replaced_listener_gets_no_stale_event() {
    let (mut slot, context, queue) = subtitle_slot();
    let old = Arc::new(Recorder::default());
    let new = Arc::new(Recorder::default());
    slot.install(Some(old.clone()), context.clone());
    slot.deliver(|l| l.on_show_subtitle(1.0, "for old"));

    slot.install(Some(new.clone()), context);
    slot.deliver(|l| l.on_show_subtitle(1.0, "for new"));

    queue.run_pending();
    assert!(old.cues.lock().is_empty());
    assert_eq!(*new.cues.lock(), vec!["for new"]);
  }

  #[test]
  fn test_clear_if_keeps_newer_listener() {
    let (mut slot, context, _queue) = subtitle_slot();
    let first: Arc<dyn SubtitleListener> = Arc::new(Recorder::default());
    let second: Arc<dyn SubtitleListener> = Arc::new(Recorder::default());

    slot.install(Some(first), context.clone());
    let generation = slot.generation();
    slot.install(Some(second), context);

    assert!(!slot.clear_if(generation));
    assert!(slot.is_active());
    assert!(slot.clear_if(slot.generation()));
    assert!(!slot.is_active());
  }

  #[test]
  fn test_events_without_listener_are_dropped() {
    let slots = ListenerSlots::new();
    assert!(!slots.dispatch(Event::BufferingProgress { percent: 40 }));
    assert!(!slots.dispatch(Event::Ended));
  }

  #[test]
  fn test_clear_all_reports_active_categories() {
    struct Buffering;
    impl BufferingListener for Buffering {}
    struct Drm;
    impl DrmListener for Drm {}

    let (context, _queue) = ExecutionContext::manual("slots");
    let mut slots = ListenerSlots::new();
    slots.buffering.install(Some(Arc::new(Buffering)), context.clone());
    slots.drm.install(Some(Arc::new(Drm)), context);

    assert_eq!(
      slots.clear_all(),
      vec![EventCategory::Buffering, EventCategory::Drm]
    );
    assert!(slots.clear_all().is_empty());
  }
}
