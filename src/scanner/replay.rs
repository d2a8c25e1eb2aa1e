//! Replay recorded advertisements from a JSON Lines file.
//!
//! Each non-empty line is one record:
//!
//! ```json
//! {"address":"B0:E9:FE:58:74:AE","manufacturer_id":2409,"payload":"b0e9fe5874ae4664089b3c0011032c00"}
//! ```
//!
//! Records are stamped with the time they are replayed. Lines that do not
//! parse are logged and skipped.

use super::{
    ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, AdvertisementSource, ScanError, StartFuture,
};
use crate::mac_address::MacAddress;
use chrono::Utc;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    address: String,
    manufacturer_id: u16,
    payload: String,
}

/// Advertisement source backed by a recording on disk.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
    interval: Duration,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::ZERO,
        }
    }

    /// Wait `interval` between records.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl AdvertisementSource for ReplaySource {
    fn start(&self) -> StartFuture<'_> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                ScanError::Replay(format!("failed to read {}: {e}", self.path.display()))
            })?;

            let records: Vec<_> = content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .filter_map(|(index, line)| match parse_line(line) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(line = index + 1, error = %e, "skipping replay record");
                        None
                    }
                })
                .collect();

            tracing::info!(
                path = %self.path.display(),
                records = records.len(),
                "replaying advertisements"
            );

            let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
            let interval = self.interval;
            tokio::spawn(async move {
                for (address, manufacturer_id, payload) in records {
                    if !interval.is_zero() {
                        tokio::time::sleep(interval).await;
                    }
                    let advertisement = Advertisement {
                        address,
                        manufacturer_id,
                        payload,
                        observed_at: Utc::now(),
                    };
                    if tx.send(advertisement).await.is_err() {
                        break;
                    }
                }
            });

            Ok(rx)
        })
    }
}

fn parse_line(line: &str) -> Result<(MacAddress, u16, Vec<u8>), String> {
    let record: ReplayRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let address = record.address.parse().map_err(|e| format!("{e}"))?;
    let payload = parse_hex(&record.payload)?;
    Ok((address, record.manufacturer_id, payload))
}

/// Parse an even-length hex string into bytes.
pub fn parse_hex(src: &str) -> Result<Vec<u8>, String> {
    let src = src.trim();
    if src.len() % 2 != 0 {
        return Err(format!("odd-length hex string: {src}"));
    }

    (0..src.len())
        .step_by(2)
        .map(|i| {
            src.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex at offset {i}: {src}"))
        })
        .collect()
}
