//! Value types exchanged with the host.
//!
//! Track descriptors, durations and times are opaque to the proxy: it only
//! moves them across the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Media time in seconds.
pub type TimeTicks = f64;

/// Media time difference in seconds. May be negative (e.g. subtitle delay).
pub type TimeDelta = f64;

/// Global player handle counter. Handles are never reused within a process.
static PLAYER_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identifier of the plugin instance a player belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

/// Client-side identifier of one remote player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerHandle(u64);

impl PlayerHandle {
  /// Allocate a fresh handle.
  pub(crate) fn next() -> Self {
    Self(PLAYER_HANDLE.fetch_add(1, Ordering::SeqCst))
  }

  pub fn as_raw(self) -> u64 {
    self.0
  }
}

impl fmt::Display for PlayerHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "player#{}", self.0)
  }
}

/// Reference to a data source resource owned by the data source subsystem.
///
/// Zero is never a valid reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSourceRef(u64);

impl DataSourceRef {
  pub fn from_raw(raw: u64) -> Self {
    Self(raw)
  }

  pub fn as_raw(self) -> u64 {
    self.0
  }

  pub fn is_valid(self) -> bool {
    self.0 != 0
  }
}

impl fmt::Display for DataSourceRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "data-source#{}", self.0)
  }
}

/// Playback scenario the host should tune the player for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerMode {
  /// Suitable for the most common playback scenarios.
  #[default]
  Default,
  /// Dedicated to D2TV (broadcast) playback.
  D2Tv,
}

/// Whether the player binds itself to the instance's graphics on creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindMode {
  #[default]
  Bind,
  DontBind,
}

/// How video is fitted into the display rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
  #[default]
  Stretch,
  Letterbox,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vr360Mode {
  #[default]
  Off,
  On,
}

/// Player state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
  /// Invalid state.
  None,
  /// Created, no data source attached yet.
  Uninitialized,
  /// Data source attached, playback can start.
  Ready,
  Playing,
  Paused,
}

/// Error reported through the media events listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaError {
  None,
  BadArgument,
  Network,
  Demux,
  Decrypt,
  Decode,
  Render,
  UnsupportedCodec,
  UnsupportedContainer,
  Resource,
  Unknown,
  UnsupportedSubtitleFormat,
}

/// Elementary stream type used for track selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
  Unknown,
  Video,
  Audio,
  Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrmType {
  Unknown,
  PlayReady,
  Marlin,
  Verimatrix,
  WidevineClassic,
  WidevineModular,
  SecureMedia,
  Sdrm,
  ClearKey,
  /// Provided by a trusted application.
  External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrmOperation {
  SetProperties,
  GenChallenge,
  InstallLicense,
  DeleteLicense,
  ProcessInitiator,
  GetVersion,
}

/// Display region relative to the plugin element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl Rect {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// A rect is usable only with a positive area.
  pub fn is_valid(&self) -> bool {
    self.width > 0 && self.height > 0
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTrackInfo {
  /// Index of the track, valid only for the attached data source.
  pub index: u32,
  /// Minimal bandwidth in bps required to deliver this track.
  pub bitrate: u32,
  pub width: i32,
  pub height: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrackInfo {
  pub index: u32,
  /// IETF RFC 5646 language tag.
  pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextTrackInfo {
  pub index: u32,
  #[serde(default)]
  pub is_external: bool,
  pub language: String,
}
