//! Frame decoder for CO2 meter manufacturer data.
//!
//! Payload layout (offsets into the manufacturer-specific data, without the
//! company ID):
//!
//! | Offset | Meaning                                       |
//! |--------|-----------------------------------------------|
//! | 7      | legacy whole-degree temperature code          |
//! | 9      | temperature code, `0.2 * code - 3.2` °C        |
//! | 10     | relative humidity, percent                    |
//! | 13-14  | CO2 concentration, big-endian u16, ppm        |
//!
//! Decoding is a pure function of the payload; the device identity is taken
//! on trust from the device filter.

use crate::mac_address::MacAddress;
use crate::reading::{Reading, TemperatureSource};
use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

/// Highest referenced offset is the CO2 low byte at 14.
pub const MIN_PAYLOAD_LEN: usize = 15;

const TEMPERATURE_OFFSET: usize = 9;
const LEGACY_TEMPERATURE_OFFSET: usize = 7;
const HUMIDITY_OFFSET: usize = 10;
const CO2_OFFSET: usize = 13;

/// Plausible operating envelope in tenths of a degree: 0.0..=50.0 °C.
const MIN_TEMPERATURE_TENTHS: i32 = 0;
const MAX_TEMPERATURE_TENTHS: i32 = 500;

/// Error types for decoding sensor payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The payload is shorter than the highest referenced offset.
    #[error("Truncated payload: expected at least {} bytes, got {len}", MIN_PAYLOAD_LEN)]
    Truncated { len: usize },
}

/// Decode a payload observed now.
pub fn decode(device: MacAddress, payload: &[u8]) -> Result<Reading, DecodeError> {
    decode_at(device, payload, Utc::now())
}

/// Decode a payload observed at `observed_at`.
///
/// The timestamp is truncated to millisecond precision.
pub fn decode_at(
    device: MacAddress,
    payload: &[u8],
    observed_at: DateTime<Utc>,
) -> Result<Reading, DecodeError> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(DecodeError::Truncated { len: payload.len() });
    }

    let co2_ppm = u16::from_be_bytes([payload[CO2_OFFSET], payload[CO2_OFFSET + 1]]);
    let humidity = payload[HUMIDITY_OFFSET];
    let (tenths, source) = temperature_tenths(
        payload[TEMPERATURE_OFFSET],
        payload[LEGACY_TEMPERATURE_OFFSET],
    );

    Ok(Reading::new(
        observed_at.trunc_subsecs(3),
        device,
        co2_ppm,
        f64::from(tenths) / 10.0,
        humidity,
        source,
        payload.to_vec(),
    ))
}

/// `0.2 * code - 3.2` expressed in tenths of a degree, so rounding to one
/// decimal is exact.
pub fn primary_temperature_tenths(code: u8) -> i32 {
    2 * i32::from(code) - 32
}

/// Legacy whole-degree code: values above 70 carry a +72 offset.
pub fn fallback_temperature_tenths(legacy_code: u8) -> i32 {
    let degrees = if legacy_code > 70 {
        i32::from(legacy_code) - 72
    } else {
        i32::from(legacy_code)
    };
    (degrees * 10).clamp(MIN_TEMPERATURE_TENTHS, MAX_TEMPERATURE_TENTHS)
}

fn temperature_tenths(code: u8, legacy_code: u8) -> (i32, TemperatureSource) {
    let primary = primary_temperature_tenths(code);
    if (MIN_TEMPERATURE_TENTHS..=MAX_TEMPERATURE_TENTHS).contains(&primary) {
        (primary, TemperatureSource::Primary)
    } else {
        (
            fallback_temperature_tenths(legacy_code),
            TemperatureSource::Fallback,
        )
    }
}
