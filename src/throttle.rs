//! Per-device update interval.
//!
//! Meters broadcast several times a second while the measured values change
//! slowly. A [`Throttle`] lets at most one reading per device through per
//! interval; everything in between is dropped before it reaches the sinks.

use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits readings to one per `interval` for each device.
///
/// The first reading from a device is always allowed.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_emitted: HashMap<MacAddress, Instant>,
}

impl Throttle {
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use co2_listener::throttle::Throttle;
    ///
    /// let throttle = Throttle::new(Duration::from_secs(30));
    /// assert_eq!(throttle.interval(), Duration::from_secs(30));
    /// ```
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_emitted: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` and restarts the device's timer if a reading from
    /// `device` may be emitted now.
    pub fn should_emit(&mut self, device: MacAddress) -> bool {
        self.should_emit_at(device, Instant::now())
    }

    fn should_emit_at(&mut self, device: MacAddress, now: Instant) -> bool {
        match self.last_emitted.get(&device) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                self.last_emitted.insert(device, now);
                true
            }
        }
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use co2_listener::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" before "m" and "s"
    let (num, unit, millis_per_unit) = if let Some(num) = src.strip_suffix("ms") {
        (num, "milliseconds", 1)
    } else if let Some(num) = src.strip_suffix('h') {
        (num, "hours", 3_600_000)
    } else if let Some(num) = src.strip_suffix('m') {
        (num, "minutes", 60_000)
    } else if let Some(num) = src.strip_suffix('s') {
        (num, "seconds", 1_000)
    } else {
        (src, "duration", 1_000)
    };

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", unit, num.trim()))?;
    Ok(Duration::from_millis(value.saturating_mul(millis_per_unit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{OTHER_VENDOR_MAC, TEST_MAC};

    #[test]
    fn test_throttle_first_event_allowed() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.should_emit(TEST_MAC));
    }

    #[test]
    fn test_throttle_immediate_second_event_blocked() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.should_emit(TEST_MAC));
        assert!(!throttle.should_emit(TEST_MAC));
    }

    #[test]
    fn test_throttle_devices_independent() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.should_emit(TEST_MAC));
        assert!(throttle.should_emit(OTHER_VENDOR_MAC));
        assert!(!throttle.should_emit(TEST_MAC));
        assert!(!throttle.should_emit(OTHER_VENDOR_MAC));
    }

    #[test]
    fn test_throttle_zero_interval() {
        let mut throttle = Throttle::new(Duration::ZERO);
        assert!(throttle.should_emit(TEST_MAC));
        assert!(throttle.should_emit(TEST_MAC));
    }

    #[test]
    fn test_throttle_allowed_after_interval() {
        let mut throttle = Throttle::new(Duration::from_secs(30));
        let start = Instant::now();

        assert!(throttle.should_emit_at(TEST_MAC, start));
        assert!(!throttle.should_emit_at(TEST_MAC, start + Duration::from_secs(29)));
        assert!(throttle.should_emit_at(TEST_MAC, start + Duration::from_secs(30)));
    }

    #[test]
    fn test_throttle_blocked_event_does_not_reset_timer() {
        let mut throttle = Throttle::new(Duration::from_millis(30));
        let start = Instant::now();

        assert!(throttle.should_emit_at(TEST_MAC, start));
        assert!(!throttle.should_emit_at(TEST_MAC, start + Duration::from_millis(10)));
        assert!(!throttle.should_emit_at(TEST_MAC, start + Duration::from_millis(20)));
        assert!(throttle.should_emit_at(TEST_MAC, start + Duration::from_millis(35)));
        assert!(!throttle.should_emit_at(TEST_MAC, start + Duration::from_millis(40)));
    }

    #[test]
    fn test_throttle_many_devices() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        let devices: Vec<MacAddress> = (0..100u8)
            .map(|i| MacAddress([0xB0, 0xE9, 0xFE, 0x00, 0x00, i]))
            .collect();

        for device in &devices {
            assert!(throttle.should_emit(*device), "first from {device}");
        }
        for device in &devices {
            assert!(!throttle.should_emit(*device), "second from {device}");
        }
    }

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_minutes_and_hours() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_duration_milliseconds() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_duration_no_suffix_and_whitespace() {
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration(" 3s ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("3 s").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1s").is_err());
        assert_eq!(parse_duration("xm").unwrap_err(), "invalid minutes: x");
    }
}
