//! Decoded CO2 sensor reading.

use crate::mac_address::MacAddress;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// CO2 concentrations above this are reported as anomalies.
pub const MAX_PLAUSIBLE_CO2_PPM: u16 = 10_000;

/// Which decoding stage produced a reading's temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureSource {
    /// Linear relationship on the raw temperature code.
    Primary,
    /// Legacy whole-degree code, clamped to the operating envelope.
    Fallback,
}

/// One decoded measurement from a CO2 sensor broadcast.
///
/// Readings are only built by [`crate::decoder`] and are immutable afterwards.
/// Units:
/// - CO2 in parts per million
/// - Temperature in Celsius, one fractional digit
/// - Relative humidity in percent, as broadcast (not range-checked)
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    timestamp: DateTime<Utc>,
    device: MacAddress,
    co2_ppm: u16,
    temperature: f64,
    humidity: u8,
    temperature_source: TemperatureSource,
    raw_payload: Vec<u8>,
}

impl Reading {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        device: MacAddress,
        co2_ppm: u16,
        temperature: f64,
        humidity: u8,
        temperature_source: TemperatureSource,
        raw_payload: Vec<u8>,
    ) -> Self {
        Self {
            timestamp,
            device,
            co2_ppm,
            temperature,
            humidity,
            temperature_source,
            raw_payload,
        }
    }

    /// When the advertisement was observed (millisecond precision).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn device(&self) -> MacAddress {
        self.device
    }

    pub fn co2_ppm(&self) -> u16 {
        self.co2_ppm
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn humidity(&self) -> u8 {
        self.humidity
    }

    pub fn temperature_source(&self) -> TemperatureSource {
        self.temperature_source
    }

    /// The payload bytes this reading was decoded from, unmodified.
    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    /// Lowercase hex of the raw payload.
    pub fn raw_hex(&self) -> String {
        self.raw_payload.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// `false` when the CO2 value is above [`MAX_PLAUSIBLE_CO2_PPM`].
    pub fn co2_is_plausible(&self) -> bool {
        self.co2_ppm <= MAX_PLAUSIBLE_CO2_PPM
    }
}

/// Wire shape shared by the file and HTTP sinks.
#[derive(Serialize)]
struct ReadingRecord<'a> {
    timestamp: String,
    device_address: String,
    co2_ppm: u16,
    temperature: f64,
    humidity: u8,
    raw_data: &'a str,
}

impl Serialize for Reading {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let raw_data = self.raw_hex();
        ReadingRecord {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            device_address: self.device.to_string(),
            co2_ppm: self.co2_ppm,
            temperature: self.temperature,
            humidity: self.humidity,
            raw_data: &raw_data,
        }
        .serialize(serializer)
    }
}
