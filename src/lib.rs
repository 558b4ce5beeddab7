//! Client-side proxy for a media player running in a privileged host process.
//!
//! A [`MediaPlayer`] negotiates an interface revision with the host, forwards
//! player commands over a [`Transport`] and delivers the host's events to
//! listeners on their own [`ExecutionContext`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_player_proxy::{CapabilityTable, IpcTransport, MediaPlayer, ProxyConfig, InstanceId};
//!
//! # async fn run() -> Result<(), media_player_proxy::Error> {
//! let config = ProxyConfig::load("proxy.json")?;
//! let transport = Arc::new(IpcTransport::connect_with(&config).await?);
//! let player = MediaPlayer::create(
//!   transport,
//!   &CapabilityTable::standard(),
//!   config.create_options(InstanceId(1)),
//! )?;
//! player.get_player_state()?.await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod player;
pub mod protocol;
pub mod transport;

pub use config::ProxyConfig;
pub use error::{Error, ErrorCode, Result, STATUS_OK};
pub use player::{
  CapabilityTable, Completion, CreateOptions, ExecutionContext, InstanceId, InterfaceVersion,
  Lifecycle, MediaPlayer, OperationKind,
};
pub use transport::{ChannelTransport, HostEnd, IpcTransport, Transport, TransportError};
