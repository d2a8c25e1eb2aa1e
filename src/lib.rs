//! `co2-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for process setup and exit codes.
//! The discovery and monitoring loop lives in [`crate::app`] where it can be
//! tested deterministically with an injected advertisement source and sinks.

pub mod app;
pub mod decoder;
pub mod export;
pub mod filter;
pub mod logging;
pub mod mac_address;
pub mod reading;
pub mod scanner;
pub mod throttle;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Monitor, MonitorConfig, Options, RunError, RunSummary, SessionState};
pub use decoder::{DecodeError, decode, decode_at};
pub use export::{ConsoleExporter, ExportError, Exporter, HttpExporter, JsonFileExporter};
pub use filter::{DeviceFilter, FilterConfig};
pub use mac_address::{MacAddress, VendorPrefix};
pub use reading::{Reading, TemperatureSource};
pub use scanner::{Advertisement, AdvertisementSource, Backend, ScanError};
pub use throttle::{Throttle, parse_duration};
