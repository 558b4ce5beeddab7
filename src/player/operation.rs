//! Operation kinds of the player command surface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One logical player command. At most one call per kind may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
  AttachDataSource,
  Play,
  Pause,
  Stop,
  Seek,
  SetPlaybackRate,
  GetDuration,
  GetCurrentTime,
  GetPlayerState,
  GetCurrentVideoTrackInfo,
  GetVideoTracksList,
  GetCurrentAudioTrackInfo,
  GetAudioTracksList,
  GetCurrentTextTrackInfo,
  GetTextTracksList,
  SelectTrack,
  AddExternalSubtitles,
  SetSubtitlesDelay,
  SetDisplayRect,
  SetDisplayMode,
  #[serde(rename = "set_drm_specific_data")]
  SetDRMSpecificData,
  SetVr360Mode,
  SetVr360Rotation,
  SetVr360ZoomLevel,
}

impl OperationKind {
  pub const COUNT: usize = 24;

  pub const ALL: [OperationKind; Self::COUNT] = [
    Self::AttachDataSource,
    Self::Play,
    Self::Pause,
    Self::Stop,
    Self::Seek,
    Self::SetPlaybackRate,
    Self::GetDuration,
    Self::GetCurrentTime,
    Self::GetPlayerState,
    Self::GetCurrentVideoTrackInfo,
    Self::GetVideoTracksList,
    Self::GetCurrentAudioTrackInfo,
    Self::GetAudioTracksList,
    Self::GetCurrentTextTrackInfo,
    Self::GetTextTracksList,
    Self::SelectTrack,
    Self::AddExternalSubtitles,
    Self::SetSubtitlesDelay,
    Self::SetDisplayRect,
    Self::SetDisplayMode,
    Self::SetDRMSpecificData,
    Self::SetVr360Mode,
    Self::SetVr360Rotation,
    Self::SetVr360ZoomLevel,
  ];

  /// Dense index, used by per-kind tables.
  pub fn index(self) -> usize {
    self as usize
  }

  /// Whether the call is rejected while no data source is attached.
  pub fn requires_data_source(self) -> bool {
    !matches!(
      self,
      Self::AttachDataSource
        | Self::GetPlayerState
        | Self::AddExternalSubtitles
        | Self::SetDisplayRect
        | Self::SetDisplayMode
        | Self::SetVr360Mode
        | Self::SetVr360Rotation
        | Self::SetVr360ZoomLevel
    )
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::AttachDataSource => "AttachDataSource",
      Self::Play => "Play",
      Self::Pause => "Pause",
      Self::Stop => "Stop",
      Self::Seek => "Seek",
      Self::SetPlaybackRate => "SetPlaybackRate",
      Self::GetDuration => "GetDuration",
      Self::GetCurrentTime => "GetCurrentTime",
      Self::GetPlayerState => "GetPlayerState",
      Self::GetCurrentVideoTrackInfo => "GetCurrentVideoTrackInfo",
      Self::GetVideoTracksList => "GetVideoTracksList",
      Self::GetCurrentAudioTrackInfo => "GetCurrentAudioTrackInfo",
      Self::GetAudioTracksList => "GetAudioTracksList",
      Self::GetCurrentTextTrackInfo => "GetCurrentTextTrackInfo",
      Self::GetTextTracksList => "GetTextTracksList",
      Self::SelectTrack => "SelectTrack",
      Self::AddExternalSubtitles => "AddExternalSubtitles",
      Self::SetSubtitlesDelay => "SetSubtitlesDelay",
      Self::SetDisplayRect => "SetDisplayRect",
      Self::SetDisplayMode => "SetDisplayMode",
      Self::SetDRMSpecificData => "SetDRMSpecificData",
      Self::SetVr360Mode => "SetVr360Mode",
      Self::SetVr360Rotation => "SetVr360Rotation",
      Self::SetVr360ZoomLevel => "SetVr360ZoomLevel",
    }
  }
}

impl fmt::Display for OperationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_indices_are_dense() {
    for (i, kind) in OperationKind::ALL.iter().enumerate() {
      assert_eq!(kind.index(), i);
    }
  }

  #[test]
  fn test_data_source_preconditions() {
    assert!(OperationKind::Play.requires_data_source());
    assert!(OperationKind::Seek.requires_data_source());
    assert!(OperationKind::SetDRMSpecificData.requires_data_source());
    assert!(!OperationKind::AttachDataSource.requires_data_source());
    assert!(!OperationKind::SetDisplayRect.requires_data_source());
    assert!(!OperationKind::SetVr360ZoomLevel.requires_data_source());
    assert!(!OperationKind::GetPlayerState.requires_data_source());
  }

  #[test]
  fn test_wire_names() {
    let json = serde_json::to_string(&OperationKind::SetDRMSpecificData).unwrap();
    assert_eq!(json, "\"set_drm_specific_data\"");
    let kind: OperationKind = serde_json::from_str("\"get_video_tracks_list\"").unwrap();
    assert_eq!(kind, OperationKind::GetVideoTracksList);
  }
}
