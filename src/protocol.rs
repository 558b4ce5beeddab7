//! Wire messages exchanged with the player host.
//!
//! Messages are newline-delimited JSON objects tagged by `type`. Outbound
//! messages are `HostMessage`s; everything the host sends back is a
//! `PluginMessage`. Reply output stays raw JSON until a pending call claims it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::player::{
  DataSourceRef, DisplayMode, DrmOperation, DrmType, EventCategory, InstanceId, MediaError,
  OperationKind, PlayerHandle, PlayerMode, Rect, StreamType, TimeDelta, TimeTicks, Vr360Mode,
};

/// Command sent to a player, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
  AttachDataSource {
    data_source: DataSourceRef,
  },
  Play,
  Pause,
  Stop,
  Seek {
    time: TimeTicks,
  },
  SetPlaybackRate {
    rate: f64,
  },
  GetDuration,
  GetCurrentTime,
  GetPlayerState,
  GetCurrentVideoTrackInfo,
  GetVideoTracksList,
  GetCurrentAudioTrackInfo,
  GetAudioTracksList,
  GetCurrentTextTrackInfo,
  GetTextTracksList,
  SelectTrack {
    stream_type: StreamType,
    index: u32,
  },
  AddExternalSubtitles {
    file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
  },
  SetSubtitlesDelay {
    delay: TimeDelta,
  },
  SetDisplayRect {
    rect: Rect,
  },
  SetDisplayMode {
    mode: DisplayMode,
  },
  #[serde(rename = "set_drm_specific_data")]
  SetDRMSpecificData {
    drm_type: DrmType,
    operation: DrmOperation,
    data: Vec<u8>,
  },
  SetVr360Mode {
    mode: Vr360Mode,
  },
  SetVr360Rotation {
    horizontal: f32,
    vertical: f32,
  },
  SetVr360ZoomLevel {
    level: u32,
  },
}

impl Command {
  /// Operation kind whose slot this command occupies.
  pub fn kind(&self) -> OperationKind {
    match self {
      Self::AttachDataSource { .. } => OperationKind::AttachDataSource,
      Self::Play => OperationKind::Play,
      Self::Pause => OperationKind::Pause,
      Self::Stop => OperationKind::Stop,
      Self::Seek { .. } => OperationKind::Seek,
      Self::SetPlaybackRate { .. } => OperationKind::SetPlaybackRate,
      Self::GetDuration => OperationKind::GetDuration,
      Self::GetCurrentTime => OperationKind::GetCurrentTime,
      Self::GetPlayerState => OperationKind::GetPlayerState,
      Self::GetCurrentVideoTrackInfo => OperationKind::GetCurrentVideoTrackInfo,
      Self::GetVideoTracksList => OperationKind::GetVideoTracksList,
      Self::GetCurrentAudioTrackInfo => OperationKind::GetCurrentAudioTrackInfo,
      Self::GetAudioTracksList => OperationKind::GetAudioTracksList,
      Self::GetCurrentTextTrackInfo => OperationKind::GetCurrentTextTrackInfo,
      Self::GetTextTracksList => OperationKind::GetTextTracksList,
      Self::SelectTrack { .. } => OperationKind::SelectTrack,
      Self::AddExternalSubtitles { .. } => OperationKind::AddExternalSubtitles,
      Self::SetSubtitlesDelay { .. } => OperationKind::SetSubtitlesDelay,
      Self::SetDisplayRect { .. } => OperationKind::SetDisplayRect,
      Self::SetDisplayMode { .. } => OperationKind::SetDisplayMode,
      Self::SetDRMSpecificData { .. } => OperationKind::SetDRMSpecificData,
      Self::SetVr360Mode { .. } => OperationKind::SetVr360Mode,
      Self::SetVr360Rotation { .. } => OperationKind::SetVr360Rotation,
      Self::SetVr360ZoomLevel { .. } => OperationKind::SetVr360ZoomLevel,
    }
  }
}

/// Message from the proxy to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
  /// Create a player speaking `interface`.
  Create {
    player: PlayerHandle,
    instance: InstanceId,
    mode: PlayerMode,
    interface: String,
  },
  /// Bind the player to the instance's graphics.
  BindGraphics {
    player: PlayerHandle,
    instance: InstanceId,
  },
  Call {
    player: PlayerHandle,
    seq: u64,
    command: Command,
  },
  /// Start or stop producing events of one category.
  SetListener {
    player: PlayerHandle,
    category: EventCategory,
    enabled: bool,
  },
  DetachDataSource {
    player: PlayerHandle,
  },
  Destroy {
    player: PlayerHandle,
  },
}

impl HostMessage {
  pub fn player(&self) -> PlayerHandle {
    match self {
      Self::Create { player, .. }
      | Self::BindGraphics { player, .. }
      | Self::Call { player, .. }
      | Self::SetListener { player, .. }
      | Self::DetachDataSource { player }
      | Self::Destroy { player } => *player,
    }
  }
}

/// Unsolicited event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Event {
  TimeUpdate {
    time: TimeTicks,
  },
  Ended,
  Error {
    error: MediaError,
  },
  ShowSubtitle {
    duration: TimeDelta,
    text: String,
  },
  BufferingStart,
  BufferingProgress {
    percent: u32,
  },
  BufferingComplete,
  InitDataLoaded {
    drm_type: DrmType,
    init_data: Vec<u8>,
  },
  LicenseRequest {
    request: Vec<u8>,
  },
}

impl Event {
  pub fn category(&self) -> EventCategory {
    match self {
      Self::TimeUpdate { .. } | Self::Ended | Self::Error { .. } => EventCategory::MediaEvents,
      Self::ShowSubtitle { .. } => EventCategory::Subtitle,
      Self::BufferingStart | Self::BufferingProgress { .. } | Self::BufferingComplete => {
        EventCategory::Buffering
      }
      Self::InitDataLoaded { .. } | Self::LicenseRequest { .. } => EventCategory::Drm,
    }
  }
}

/// Reply to one `Call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
  pub player: PlayerHandle,
  pub seq: u64,
  pub kind: OperationKind,
  /// Status code; zero is success.
  pub result: i32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
}

/// Message from the host to the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginMessage {
  /// Interfaces the host implements. First message on a connection.
  Hello { interfaces: Vec<String> },
  Reply(Reply),
  Event { player: PlayerHandle, event: Event },
}

impl PluginMessage {
  /// Parse one JSON line from the host.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(line)
  }

  /// Player this message is addressed to, if any.
  pub fn player(&self) -> Option<PlayerHandle> {
    match self {
      Self::Hello { .. } => None,
      Self::Reply(reply) => Some(reply.player),
      Self::Event { player, .. } => Some(*player),
    }
  }
}
