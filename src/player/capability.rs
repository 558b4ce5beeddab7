//! Interface revisions and version negotiation.
//!
//! The host implements some subset of five ordered interface revisions. The
//! proxy picks the newest revision both sides understand once, at creation,
//! and keeps a per-operation support table next to it so calls never need a
//! fallback chain.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::operation::OperationKind;
use super::types::{BindMode, PlayerMode};
use crate::error::Error;

/// Interface revision tag, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InterfaceVersion {
  #[serde(rename = "1.0")]
  V1_0,
  #[serde(rename = "1.1")]
  V1_1,
  #[serde(rename = "1.2")]
  V1_2,
  #[serde(rename = "1.3")]
  V1_3,
  #[serde(rename = "1.4")]
  V1_4,
}

impl fmt::Display for InterfaceVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tag = match self {
      Self::V1_0 => "1.0",
      Self::V1_1 => "1.1",
      Self::V1_2 => "1.2",
      Self::V1_3 => "1.3",
      Self::V1_4 => "1.4",
    };
    f.write_str(tag)
  }
}

/// How a revision lets a player be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateSupport {
  /// Default mode only, always bound to the instance.
  BoundOnly,
  /// Default mode only, bound or unbound.
  Unbound,
  /// Any player mode and bind mode.
  WithOptions,
}

/// One row of the capability table.
#[derive(Debug, Clone)]
pub struct CapabilityEntry {
  pub version: InterfaceVersion,
  /// Identifier the host advertises for this revision.
  pub wire_name: String,
  pub create: CreateSupport,
  pub operations: Vec<OperationKind>,
}

impl CapabilityEntry {
  pub fn supports(&self, kind: OperationKind) -> bool {
    self.operations.contains(&kind)
  }
}

/// Ordered registry of the revisions this proxy implements.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
  entries: Vec<CapabilityEntry>,
}

/// Operations every revision carries.
const BASE_OPERATIONS: [OperationKind; 20] = [
  OperationKind::AttachDataSource,
  OperationKind::Play,
  OperationKind::Pause,
  OperationKind::Stop,
  OperationKind::Seek,
  OperationKind::SetPlaybackRate,
  OperationKind::GetDuration,
  OperationKind::GetCurrentTime,
  OperationKind::GetPlayerState,
  OperationKind::GetCurrentVideoTrackInfo,
  OperationKind::GetVideoTracksList,
  OperationKind::GetCurrentAudioTrackInfo,
  OperationKind::GetAudioTracksList,
  OperationKind::GetCurrentTextTrackInfo,
  OperationKind::GetTextTracksList,
  OperationKind::SelectTrack,
  OperationKind::AddExternalSubtitles,
  OperationKind::SetSubtitlesDelay,
  OperationKind::SetDisplayRect,
  OperationKind::SetDRMSpecificData,
];

impl CapabilityTable {
  /// Build a table from explicit rows. Rows are kept sorted by version.
  pub fn new(mut entries: Vec<CapabilityEntry>) -> Self {
    entries.sort_by_key(|entry| entry.version);
    Self { entries }
  }

  /// The five revisions of the media player interface.
  pub fn standard() -> Self {
    let base = BASE_OPERATIONS.to_vec();

    let mut v1_3 = base.clone();
    v1_3.push(OperationKind::SetDisplayMode);

    let mut v1_4 = v1_3.clone();
    v1_4.extend([
      OperationKind::SetVr360Mode,
      OperationKind::SetVr360Rotation,
      OperationKind::SetVr360ZoomLevel,
    ]);

    let row = |version: InterfaceVersion, create, operations| CapabilityEntry {
      version,
      wire_name: format!("MediaPlayer;{}", version),
      create,
      operations,
    };

    Self::new(vec![
      row(InterfaceVersion::V1_0, CreateSupport::BoundOnly, base.clone()),
      row(InterfaceVersion::V1_1, CreateSupport::Unbound, base.clone()),
      row(InterfaceVersion::V1_2, CreateSupport::WithOptions, base),
      row(InterfaceVersion::V1_3, CreateSupport::WithOptions, v1_3),
      row(InterfaceVersion::V1_4, CreateSupport::WithOptions, v1_4),
    ])
  }

  pub fn entries(&self) -> &[CapabilityEntry] {
    &self.entries
  }

  pub fn entry(&self, version: InterfaceVersion) -> Option<&CapabilityEntry> {
    self.entries.iter().find(|entry| entry.version == version)
  }

  /// Pick the newest revision the host advertises.
  pub fn negotiate<S: AsRef<str>>(&self, advertised: &[S]) -> Result<Negotiated, Error> {
    let chosen = self.entries.iter().rev().find(|entry| {
      advertised
        .iter()
        .any(|name| name.as_ref() == entry.wire_name)
    });

    match chosen {
      Some(entry) => {
        let mut supported = [false; OperationKind::COUNT];
        for kind in &entry.operations {
          supported[kind.index()] = true;
        }
        Ok(Negotiated {
          version: entry.version,
          wire_name: entry.wire_name.clone(),
          create: entry.create,
          supported,
        })
      }
      None => {
        log::error!("No common media player interface in {:?}", names(advertised));
        Err(Error::NoInterface)
      }
    }
  }
}

impl Default for CapabilityTable {
  fn default() -> Self {
    Self::standard()
  }
}

fn names<S: AsRef<str>>(advertised: &[S]) -> Vec<&str> {
  advertised.iter().map(|name| name.as_ref()).collect()
}

/// Outcome of negotiation: the chosen revision and its dispatch table.
#[derive(Debug, Clone)]
pub struct Negotiated {
  version: InterfaceVersion,
  wire_name: String,
  create: CreateSupport,
  supported: [bool; OperationKind::COUNT],
}

impl Negotiated {
  pub fn version(&self) -> InterfaceVersion {
    self.version
  }

  pub fn wire_name(&self) -> &str {
    &self.wire_name
  }

  pub fn supports(&self, kind: OperationKind) -> bool {
    self.supported[kind.index()]
  }

  /// Resolve the creation options this revision can express.
  ///
  /// Returns the effective bind mode, or `NoInterface` when the revision
  /// cannot create a player with the requested options.
  pub fn creation_bind_mode(&self, mode: PlayerMode, bind: BindMode) -> Result<BindMode, Error> {
    match self.create {
      CreateSupport::WithOptions => Ok(bind),
      CreateSupport::Unbound if mode == PlayerMode::Default => Ok(bind),
      CreateSupport::BoundOnly if mode == PlayerMode::Default => Ok(BindMode::Bind),
      _ => {
        log::error!(
          "Interface {} cannot create a player in {:?} mode",
          self.version,
          mode
        );
        Err(Error::NoInterface)
      }
    }
  }
}
