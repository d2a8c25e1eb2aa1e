//! Reading sinks.
//!
//! Every sink implements [`Exporter`]. The monitoring loop holds a list of
//! boxed exporters and delivers each reading to all of them with
//! [`fan_out`]; a failing or slow sink never affects the others.

pub mod console;
pub mod file;
pub mod http;

use crate::reading::Reading;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub use console::ConsoleExporter;
pub use file::JsonFileExporter;
pub use http::{Auth, HttpConfig, HttpExporter};

/// Errors reported by a single sink.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Writing to a local stream or file failed
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
    /// Remote delivery failed, either with a non-2xx status or a network error
    #[error("delivery to {endpoint} failed: {cause}")]
    Delivery {
        endpoint: String,
        status: Option<u16>,
        cause: String,
    },
    /// The reading could not be serialized
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The sink did not finish within its timeout
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Future returned by [`Exporter::export`].
pub type ExportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>>;

/// A delivery target for readings.
///
/// Configuration is fixed at construction. Implementations must not assume the
/// reading outlives the call.
pub trait Exporter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Deliver one reading.
    fn export<'a>(&'a self, reading: &'a Reading) -> ExportFuture<'a>;
}

/// Result of delivering one reading to one sink.
#[derive(Debug)]
pub struct SinkOutcome {
    pub sink: String,
    pub result: Result<(), ExportError>,
}

/// Deliver `reading` to every sink concurrently.
///
/// Each sink runs under its own `timeout`. Returns once every sink has
/// finished or timed out, with outcomes in sink order.
pub async fn fan_out(
    sinks: &[Box<dyn Exporter>],
    reading: &Reading,
    timeout: Duration,
) -> Vec<SinkOutcome> {
    let deliveries = sinks.iter().map(|sink| async move {
        let result = match tokio::time::timeout(timeout, sink.export(reading)).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::TimedOut(timeout)),
        };
        SinkOutcome {
            sink: sink.name().to_string(),
            result,
        }
    });

    futures::future::join_all(deliveries).await
}
