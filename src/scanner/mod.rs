//! Advertisement sources.
//!
//! The monitoring loop consumes raw advertisement records from an
//! [`AdvertisementSource`]. Sources know nothing about CO2 meters; they report
//! every manufacturer-data entry they observe and leave identification to the
//! device filter.

#[cfg(feature = "bluer")]
pub mod bluer;

pub mod replay;

use crate::mac_address::MacAddress;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel buffer size for advertisement records.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// One manufacturer-data entry from a BLE advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Hardware identifier of the broadcaster
    pub address: MacAddress,
    /// Bluetooth SIG company identifier of the manufacturer data
    pub manufacturer_id: u16,
    /// Manufacturer-specific data, without the company identifier
    pub payload: Vec<u8>,
    /// When the advertisement was observed
    pub observed_at: DateTime<Utc>,
}

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Replay file could not be read
    #[error("Replay error: {0}")]
    Replay(String),
}

/// Future returned by [`AdvertisementSource::start`].
pub type StartFuture<'a> =
    Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + 'a>>;

/// Producer of advertisement records.
///
/// The receiver yields records until the source stops; a closed channel means
/// no more advertisements will arrive.
pub trait AdvertisementSource: Send + Sync {
    fn start(&self) -> StartFuture<'_>;
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Replay advertisements recorded in a JSON Lines file
    Replay,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(not(feature = "bluer"))]
        return Backend::Replay;
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            Backend::Replay => write!(f, "replay"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            "replay" | "file" => Ok(Backend::Replay),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Backend-specific settings needed to build a source.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    /// Company identifier of the target meter, logged when BlueZ discovery starts
    pub manufacturer_id: u16,
    /// Recorded advertisements for the replay backend
    pub replay_path: Option<PathBuf>,
    /// Delay between replayed records
    pub replay_interval: Duration,
}

/// Build the advertisement source for `backend`.
pub fn source_for(
    backend: Backend,
    config: &SourceConfig,
) -> Result<Box<dyn AdvertisementSource>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => Ok(Box::new(bluer::BluerSource::new(config.manufacturer_id))),
        Backend::Replay => {
            let path = config.replay_path.clone().ok_or_else(|| {
                ScanError::Replay("the replay backend needs --replay <FILE>".to_string())
            })?;
            Ok(Box::new(
                replay::ReplaySource::new(path).with_interval(config.replay_interval),
            ))
        }
    }
}
