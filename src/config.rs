//! Proxy configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::player::{BindMode, CreateOptions, InstanceId, PlayerMode};

/// Socket file name inside the runtime directory.
const SOCKET_NAME: &str = "media-player-host.sock";

/// Proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
  /// Host endpoint (None = `media-player-host.sock` in the runtime dir).
  #[serde(default)]
  pub socket_path: Option<PathBuf>,

  /// Connection attempts before giving up.
  #[serde(default = "default_connect_retries")]
  pub connect_retries: u32,

  /// How long to wait for the host's interface advertisement.
  #[serde(default = "default_handshake_timeout_ms")]
  pub handshake_timeout_ms: u64,

  /// Per-call timeout (None = calls wait for their reply).
  #[serde(default)]
  pub call_timeout_ms: Option<u64>,

  #[serde(default)]
  pub player_mode: PlayerMode,

  #[serde(default)]
  pub bind_mode: BindMode,
}

fn default_connect_retries() -> u32 {
  10
}

fn default_handshake_timeout_ms() -> u64 {
  5000
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      socket_path: None,
      connect_retries: default_connect_retries(),
      handshake_timeout_ms: default_handshake_timeout_ms(),
      call_timeout_ms: None,
      player_mode: PlayerMode::default(),
      bind_mode: BindMode::default(),
    }
  }
}

impl ProxyConfig {
  /// Parse and validate a JSON configuration.
  pub fn from_json(json: &str) -> Result<Self, Error> {
    let config: Self =
      serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Read a JSON configuration file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    log::info!("Loaded proxy configuration from {}", path.display());
    Self::from_json(&json)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), Error> {
    if self.connect_retries == 0 {
      return Err(Error::InvalidConfig(
        "Connect retries must be at least 1".to_string(),
      ));
    }
    if self.handshake_timeout_ms == 0 {
      return Err(Error::InvalidConfig(
        "Handshake timeout cannot be zero".to_string(),
      ));
    }
    if self.call_timeout_ms == Some(0) {
      return Err(Error::InvalidConfig("Call timeout cannot be zero".to_string()));
    }
    Ok(())
  }

  /// Effective host endpoint.
  pub fn socket_path(&self) -> PathBuf {
    match &self.socket_path {
      Some(path) => path.clone(),
      None => default_socket_path(),
    }
  }

  pub fn handshake_timeout(&self) -> Duration {
    Duration::from_millis(self.handshake_timeout_ms)
  }

  pub fn call_timeout(&self) -> Option<Duration> {
    self.call_timeout_ms.map(Duration::from_millis)
  }

  /// Creation options for a player in `instance` using these settings.
  pub fn create_options(&self, instance: InstanceId) -> CreateOptions {
    CreateOptions::new(instance)
      .mode(self.player_mode)
      .bind(self.bind_mode)
      .call_timeout(self.call_timeout())
  }
}

#[cfg(windows)]
fn default_socket_path() -> PathBuf {
  PathBuf::from(format!(r"\\.\pipe\{}", SOCKET_NAME))
}

#[cfg(not(windows))]
fn default_socket_path() -> PathBuf {
  dirs::runtime_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join(SOCKET_NAME)
}
