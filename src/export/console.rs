//! Human-readable console sink.

use super::{ExportError, ExportFuture, Exporter};
use crate::reading::{Reading, TemperatureSource};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes one line per reading, by default to stdout.
///
/// ```text
/// [2025-06-15 06:37:52] CO2: 812 ppm, Temp: 27.8°C, Humidity: 60%, Device: B0:E9:FE:58:74:AE
/// ```
///
/// Verbose mode appends the raw payload as hex. Writes run on the blocking
/// pool, so a stalled stdout (a full pipe) is cut off by the sink timeout
/// instead of blocking the runtime.
pub struct ConsoleExporter {
    verbose: bool,
    out: SharedWriter,
}

impl ConsoleExporter {
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(verbose, Box::new(io::stdout()))
    }

    pub fn with_writer(verbose: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            verbose,
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// Format a reading without writing it.
    pub fn format(&self, reading: &Reading) -> String {
        let fallback = match reading.temperature_source() {
            TemperatureSource::Primary => "",
            TemperatureSource::Fallback => " (fallback)",
        };

        let mut line = format!(
            "[{}] CO2: {} ppm, Temp: {:.1}°C{}, Humidity: {}%, Device: {}",
            reading.timestamp().format("%Y-%m-%d %H:%M:%S"),
            reading.co2_ppm(),
            reading.temperature(),
            fallback,
            reading.humidity(),
            reading.device(),
        );

        if self.verbose {
            line.push_str(", Raw data: ");
            line.push_str(&reading.raw_hex());
        }

        line
    }
}

fn write_line(out: &SharedWriter, line: &str) -> Result<(), ExportError> {
    let mut out = out
        .lock()
        .map_err(|_| io::Error::other("console writer poisoned"))?;
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

impl Exporter for ConsoleExporter {
    fn name(&self) -> &str {
        "console"
    }

    fn export<'a>(&'a self, reading: &'a Reading) -> ExportFuture<'a> {
        let line = self.format(reading);
        let out = Arc::clone(&self.out);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || write_line(&out, &line)).await {
                Ok(result) => result,
                Err(e) => Err(ExportError::Io(io::Error::other(e))),
            }
        })
    }
}
