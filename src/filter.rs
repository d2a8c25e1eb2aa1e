//! Target device identification.
//!
//! A broadcaster is a target CO2 meter only when both its vendor prefix and
//! the company identifier of its manufacturer data match. The prefix alone
//! also matches unrelated products from the same vendor, and the company
//! identifier alone is shared by other device families.

use crate::mac_address::VendorPrefix;
use crate::scanner::Advertisement;

/// Company identifier carried by the supported CO2 meters (0x0969).
pub const DEFAULT_MANUFACTURER_ID: u16 = 2409;

/// Immutable identification settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub vendor_prefix: VendorPrefix,
    pub manufacturer_id: u16,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            vendor_prefix: VendorPrefix::default(),
            manufacturer_id: DEFAULT_MANUFACTURER_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFilter {
    config: FilterConfig,
}

impl DeviceFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// `true` iff the vendor prefix and the manufacturer ID both match.
    pub fn matches(&self, candidate: &Advertisement) -> bool {
        candidate.address.oui() == self.config.vendor_prefix
            && candidate.manufacturer_id == self.config.manufacturer_id
    }

    /// The first matching candidate, in observation order.
    ///
    /// Stops consuming `candidates` at the first match, so a caller passing
    /// `iter.by_ref()` can keep processing whatever follows it.
    pub fn select_best<I>(&self, candidates: I) -> Option<Advertisement>
    where
        I: IntoIterator<Item = Advertisement>,
    {
        candidates.into_iter().find(|candidate| self.matches(candidate))
    }
}
