//! Bluetooth hardware identifiers and vendor prefixes.
//!
//! [`MacAddress`] is the canonical device identifier carried by advertisements
//! and readings. [`VendorPrefix`] is its first three octets (the OUI), which is
//! the only part of an address the device filter compares against.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The vendor prefix (first three octets) of this address.
    pub fn oui(&self) -> VendorPrefix {
        VendorPrefix([self.0[0], self.0[1], self.0[2]])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Organizationally unique identifier: the first three octets of a MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorPrefix(pub [u8; 3]);

/// Vendor prefix of the supported CO2 meters.
pub const DEFAULT_VENDOR_PREFIX: VendorPrefix = VendorPrefix([0xB0, 0xE9, 0xFE]);

impl Default for VendorPrefix {
    fn default() -> Self {
        DEFAULT_VENDOR_PREFIX
    }
}

impl fmt::Display for VendorPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

/// Errors returned when parsing a MAC address or vendor prefix string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid address: expected {expected} parts, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid address: '{0}' is not valid hex")]
    InvalidHex(String),
}

fn parse_octets<const N: usize>(s: &str) -> Result<[u8; N], ParseMacError> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != N {
        return Err(ParseMacError::InvalidLength {
            expected: N,
            actual: parts.len(),
        });
    }

    let mut bytes = [0u8; N];
    for (i, part) in parts.iter().enumerate() {
        if part.len() != 2 {
            return Err(ParseMacError::InvalidPartLength(i));
        }
        bytes[i] = u8::from_str_radix(part, 16)
            .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
    }

    Ok(bytes)
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_octets::<6>(s).map(MacAddress)
    }
}

impl FromStr for VendorPrefix {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_octets::<3>(s).map(VendorPrefix)
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<MacAddress> for bluer::Address {
    fn from(addr: MacAddress) -> Self {
        bluer::Address(addr.0)
    }
}
