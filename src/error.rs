//! Error types for the player proxy.

use thiserror::Error;

use crate::player::{InterfaceVersion, OperationKind};
use crate::transport::TransportError;

/// Success status on the wire.
pub const STATUS_OK: i32 = 0;

/// Failure status reported by the host in a reply.
///
/// Codes the proxy does not know are kept as `Other` so they reach the
/// caller unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
  Failed,
  Aborted,
  BadArgument,
  BadResource,
  NoInterface,
  NoAccess,
  NoMemory,
  InProgress,
  NotSupported,
  FileNotFound,
  TimedOut,
  Other(i32),
}

impl ErrorCode {
  pub fn from_raw(code: i32) -> Self {
    match code {
      -2 => Self::Failed,
      -3 => Self::Aborted,
      -4 => Self::BadArgument,
      -5 => Self::BadResource,
      -6 => Self::NoInterface,
      -7 => Self::NoAccess,
      -8 => Self::NoMemory,
      -11 => Self::InProgress,
      -12 => Self::NotSupported,
      -20 => Self::FileNotFound,
      -30 => Self::TimedOut,
      other => Self::Other(other),
    }
  }

  pub fn as_raw(self) -> i32 {
    match self {
      Self::Failed => -2,
      Self::Aborted => -3,
      Self::BadArgument => -4,
      Self::BadResource => -5,
      Self::NoInterface => -6,
      Self::NoAccess => -7,
      Self::NoMemory => -8,
      Self::InProgress => -11,
      Self::NotSupported => -12,
      Self::FileNotFound => -20,
      Self::TimedOut => -30,
      Self::Other(code) => code,
    }
  }
}

impl std::fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Other(code) => write!(f, "code {}", code),
      known => write!(f, "{:?} ({})", known, known.as_raw()),
    }
  }
}

#[derive(Error, Debug)]
pub enum Error {
  #[error("Bad argument: {0}")]
  BadArgument(String),
  #[error("{0} is already in progress")]
  InProgress(OperationKind),
  #[error("{0} is not supported by interface {1}")]
  NotSupported(OperationKind, InterfaceVersion),
  #[error("No common media player interface")]
  NoInterface,
  #[error("Player is detached")]
  BadResource,
  #[error("Call aborted")]
  Aborted,
  #[error("Host reported failure: {0}")]
  Host(ErrorCode),
  #[error("Malformed reply: {0}")]
  MalformedReply(String),
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Transport error: {0}")]
  Transport(#[from] TransportError),
}

impl Error {
  /// Turn a reply status into a result.
  pub fn check_status(code: i32) -> Result<()> {
    if code == STATUS_OK {
      Ok(())
    } else {
      Err(Error::Host(ErrorCode::from_raw(code)))
    }
  }

  /// Numeric status for this error.
  pub fn code(&self) -> i32 {
    match self {
      Self::BadArgument(_) => ErrorCode::BadArgument.as_raw(),
      Self::InProgress(_) => ErrorCode::InProgress.as_raw(),
      Self::NotSupported(..) => ErrorCode::NotSupported.as_raw(),
      Self::NoInterface => ErrorCode::NoInterface.as_raw(),
      Self::BadResource => ErrorCode::BadResource.as_raw(),
      Self::Aborted => ErrorCode::Aborted.as_raw(),
      Self::Host(code) => code.as_raw(),
      Self::MalformedReply(_) | Self::InvalidConfig(_) | Self::Io(_) | Self::Transport(_) => {
        ErrorCode::Failed.as_raw()
      }
    }
  }
}

/// Result type alias for player operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_host_codes_pass_through() {
    for raw in [-2, -3, -4, -12, -20, -30, -99, 42] {
      let err = Error::check_status(raw).unwrap_err();
      assert_eq!(err.code(), raw);
    }
    assert!(Error::check_status(STATUS_OK).is_ok());
  }

  #[test]
  fn test_local_error_codes() {
    assert_eq!(Error::BadArgument("rect".into()).code(), -4);
    assert_eq!(Error::InProgress(OperationKind::Play).code(), -11);
    assert_eq!(
      Error::NotSupported(OperationKind::SetDisplayMode, InterfaceVersion::V1_2).code(),
      -12
    );
    assert_eq!(Error::NoInterface.code(), -6);
    assert_eq!(Error::Aborted.code(), -3);
  }

  #[test]
  fn test_error_messages() {
    let err = Error::NotSupported(OperationKind::SetDisplayMode, InterfaceVersion::V1_2);
    assert_eq!(
      err.to_string(),
      "SetDisplayMode is not supported by interface 1.2"
    );
    assert_eq!(
      Error::InProgress(OperationKind::Play).to_string(),
      "Play is already in progress"
    );
  }
}
