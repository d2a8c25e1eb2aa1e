//! Discovery and monitoring loop for `co2-listener`.
//!
//! This module is decoupled from process setup and exit codes: the binary
//! parses [`Options`], builds a source and the sinks, and hands them to a
//! [`Monitor`]. Tests drive the same loop with a fake source.

use crate::decoder;
use crate::export::http::HttpConfigError;
use crate::export::{
    self, Auth, ConsoleExporter, Exporter, HttpConfig, HttpExporter, JsonFileExporter,
};
use crate::filter::{DEFAULT_MANUFACTURER_ID, DeviceFilter, FilterConfig};
use crate::mac_address::{MacAddress, VendorPrefix};
use crate::scanner::{Advertisement, AdvertisementSource, Backend, ScanError, SourceConfig};
use crate::throttle::{Throttle, parse_duration};
use clap::Parser;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Default hard limit on the scanning phase.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-sink delivery timeout.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Advertisements taken from the source in one scanning step.
const DISCOVERY_BATCH_SIZE: usize = 32;

/// Command-line configuration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Advertisement source to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// JSON Lines recording to read with the replay backend
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Delay between replayed advertisements
    #[arg(long, default_value = "0s", value_parser = parse_duration)]
    pub replay_interval: Duration,

    /// First three octets of the target meter's hardware address
    #[arg(long, default_value = "B0:E9:FE", value_name = "OUI")]
    pub vendor_prefix: VendorPrefix,

    /// Company identifier of the target meter's manufacturer data
    #[arg(long, default_value_t = DEFAULT_MANUFACTURER_ID)]
    pub manufacturer_id: u16,

    /// Give up if no meter is found within this time.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub discovery_timeout: Duration,

    /// Upper bound on how long one sink may take to deliver one reading
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub sink_timeout: Duration,

    /// Emit at most one reading per interval.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = parse_duration)]
    pub throttle: Option<Duration>,

    /// Verbose output: raw payloads on the console and debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Do not print readings to stdout
    #[arg(long)]
    pub no_console: bool,

    /// Append readings as JSON Lines to this file
    #[arg(long, value_name = "FILE")]
    pub json_file: Option<PathBuf>,

    /// POST readings as JSON to this endpoint
    #[arg(long, env = "CO2_HTTP_URL", value_name = "URL")]
    pub http_url: Option<String>,

    /// Authorization scheme used with --http-token
    #[arg(long, default_value = "Bearer")]
    pub http_auth_scheme: String,

    /// Credential sent as `Authorization: <scheme> <token>`
    #[arg(long, env = "CO2_HTTP_TOKEN", hide_env_values = true)]
    pub http_token: Option<String>,

    /// Extra request header for the HTTP sink.
    /// Format: --http-header X-Site=office
    #[arg(long = "http-header", value_parser = parse_header, value_name = "NAME=VALUE")]
    pub http_headers: Vec<(String, String)>,

    /// Request timeout for the HTTP sink
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub http_timeout: Duration,
}

/// Parse a `NAME=VALUE` header argument.
pub fn parse_header(src: &str) -> Result<(String, String), String> {
    let (name, value) = src
        .split_once('=')
        .ok_or_else(|| format!("invalid header {src:?}: expected NAME=VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid header {src:?}: empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Options {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            filter: FilterConfig {
                vendor_prefix: self.vendor_prefix,
                manufacturer_id: self.manufacturer_id,
            },
            discovery_timeout: self.discovery_timeout,
            sink_timeout: self.sink_timeout,
            throttle: self.throttle,
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            manufacturer_id: self.manufacturer_id,
            replay_path: self.replay.clone(),
            replay_interval: self.replay_interval,
        }
    }

    /// HTTP sink configuration, if an endpoint was given.
    pub fn http_config(&self) -> Option<HttpConfig> {
        let endpoint = self.http_url.clone()?;
        Some(HttpConfig {
            endpoint,
            auth: self.http_token.clone().map(|credential| Auth {
                scheme: self.http_auth_scheme.clone(),
                credential,
            }),
            headers: self.http_headers.clone(),
            timeout: self.http_timeout,
        })
    }
}

/// Build the configured sinks in a fixed order: console, file, HTTP.
pub fn build_sinks(options: &Options) -> Result<Vec<Box<dyn Exporter>>, HttpConfigError> {
    let mut sinks: Vec<Box<dyn Exporter>> = Vec::new();

    if !options.no_console {
        sinks.push(Box::new(ConsoleExporter::new(options.verbose)));
    }

    if let Some(path) = &options.json_file {
        sinks.push(Box::new(JsonFileExporter::new(path)));
    }

    if let Some(config) = options.http_config() {
        sinks.push(Box::new(HttpExporter::new(config)?));
    } else if options.http_token.is_some() {
        tracing::warn!("--http-token given without --http-url; HTTP sink disabled");
    }

    if sinks.is_empty() {
        tracing::warn!("no sinks configured; readings will only be counted");
    }

    Ok(sinks)
}

/// Immutable settings for one monitoring session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    pub filter: FilterConfig,
    pub discovery_timeout: Duration,
    pub sink_timeout: Duration,
    pub throttle: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            throttle: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Locked(MacAddress),
    Streaming(MacAddress),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Scanning => write!(f, "scanning"),
            SessionState::Locked(device) => write!(f, "locked({device})"),
            SessionState::Streaming(device) => write!(f, "streaming({device})"),
        }
    }
}

/// Terminal failures of a monitoring session.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("no matching device found within {0:?}")]
    DiscoveryTimeout(Duration),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("advertisement source stopped before a device was found")]
    StreamClosed,
}

impl RunError {
    /// `true` when discovery ended without a matching device.
    pub fn is_no_device(&self) -> bool {
        matches!(self, RunError::DiscoveryTimeout(_) | RunError::StreamClosed)
    }
}

/// What a finished session did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Locked device, `None` if cancelled while scanning
    pub device: Option<MacAddress>,
    /// Readings handed to the sinks
    pub readings: u64,
    pub decode_errors: u64,
    /// Failed or timed-out sink deliveries
    pub export_failures: u64,
    pub throttled: u64,
}

/// One monitoring session: scan, lock onto the first matching meter, stream.
#[derive(Debug)]
pub struct Monitor {
    config: MonitorConfig,
    filter: DeviceFilter,
    throttle: Option<Throttle>,
    state: SessionState,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            filter: DeviceFilter::new(config.filter),
            throttle: config.throttle.map(Throttle::new),
            state: SessionState::Idle,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until `shutdown` resolves, the source stops, or discovery fails.
    ///
    /// The discovery timeout bounds the scanning phase only. Once a device is
    /// locked, the session ends normally on shutdown or when the source
    /// closes. Decode and export failures are logged and counted.
    pub async fn run<F>(
        &mut self,
        source: &dyn AdvertisementSource,
        sinks: &[Box<dyn Exporter>],
        shutdown: F,
    ) -> Result<RunSummary, RunError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        self.transition(SessionState::Scanning);
        let mut advertisements = match source.start().await {
            Ok(rx) => rx,
            Err(e) => {
                self.transition(SessionState::Idle);
                return Err(e.into());
            }
        };

        let deadline = Instant::now() + self.config.discovery_timeout;
        let mut batch = Vec::with_capacity(DISCOVERY_BATCH_SIZE);

        let (locked, rest) = loop {
            batch.clear();
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("cancelled while scanning");
                    self.transition(SessionState::Idle);
                    return Ok(summary);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.transition(SessionState::Idle);
                    return Err(RunError::DiscoveryTimeout(self.config.discovery_timeout));
                }
                received = advertisements.recv_many(&mut batch, DISCOVERY_BATCH_SIZE) => received,
            };

            if received == 0 {
                self.transition(SessionState::Idle);
                return Err(RunError::StreamClosed);
            }

            let mut candidates = batch.drain(..);
            if let Some(found) = self.filter.select_best(candidates.by_ref()) {
                let rest: Vec<Advertisement> = candidates.collect();
                break (found, rest);
            }
        };

        let device = locked.address;
        summary.device = Some(device);
        self.transition(SessionState::Locked(device));
        self.handle(&locked, sinks, &mut summary).await;
        for advertisement in rest.iter().filter(|a| a.address == device) {
            self.handle(advertisement, sinks, &mut summary).await;
        }

        self.transition(SessionState::Streaming(device));
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("cancelled");
                    break;
                }
                next = advertisements.recv() => next,
            };

            match next {
                Some(advertisement) if advertisement.address == device => {
                    self.handle(&advertisement, sinks, &mut summary).await;
                }
                Some(_) => {}
                None => {
                    tracing::info!("advertisement source stopped");
                    break;
                }
            }
        }

        self.transition(SessionState::Idle);
        tracing::info!(
            readings = summary.readings,
            decode_errors = summary.decode_errors,
            export_failures = summary.export_failures,
            throttled = summary.throttled,
            "session finished"
        );
        Ok(summary)
    }

    /// Decode one advertisement from the locked device and fan it out.
    async fn handle(
        &mut self,
        advertisement: &Advertisement,
        sinks: &[Box<dyn Exporter>],
        summary: &mut RunSummary,
    ) {
        let reading = match decoder::decode_at(
            advertisement.address,
            &advertisement.payload,
            advertisement.observed_at,
        ) {
            Ok(reading) => reading,
            Err(error) => {
                summary.decode_errors += 1;
                tracing::warn!(device = %advertisement.address, %error, "dropping advertisement");
                return;
            }
        };

        if let Some(throttle) = self.throttle.as_mut()
            && !throttle.should_emit(reading.device())
        {
            summary.throttled += 1;
            return;
        }

        if !reading.co2_is_plausible() {
            tracing::warn!(
                device = %reading.device(),
                co2_ppm = reading.co2_ppm(),
                "implausible CO2 value"
            );
        }

        summary.readings += 1;
        for outcome in export::fan_out(sinks, &reading, self.config.sink_timeout).await {
            if let Err(error) = outcome.result {
                summary.export_failures += 1;
                tracing::warn!(sink = %outcome.sink, %error, "export failed");
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "session state changed");
            self.state = next;
        }
    }
}
