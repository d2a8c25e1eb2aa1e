use crate::decoder::decode_at;
use crate::export::{ExportError, ExportFuture, Exporter};
use crate::mac_address::MacAddress;
use crate::reading::Reading;
use crate::scanner::{Advertisement, AdvertisementSource, StartFuture};
use chrono::{DateTime, TimeZone, Utc};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Address of the meter the worked example was captured from.
pub const TEST_MAC: MacAddress = MacAddress([0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE]);

/// A broadcaster from an unrelated vendor.
pub const OTHER_VENDOR_MAC: MacAddress = MacAddress([0xAC, 0xDE, 0x48, 0x00, 0x11, 0x22]);

/// Captured payload: CO2 812 ppm, 27.8 °C, 60 %.
pub const WORKED_EXAMPLE: [u8; 16] = [
    0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE, 0x46, 0x64, 0x08, 0x9B, 0x3C, 0x00, 0x11, 0x03, 0x2C,
    0x00,
];

pub fn worked_example_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 6, 37, 52).unwrap() + chrono::Duration::microseconds(950_485)
}

pub fn worked_example_reading() -> Reading {
    decode_at(TEST_MAC, &WORKED_EXAMPLE, worked_example_time()).unwrap()
}

pub fn advertisement(address: MacAddress, manufacturer_id: u16, payload: &[u8]) -> Advertisement {
    Advertisement {
        address,
        manufacturer_id,
        payload: payload.to_vec(),
        observed_at: worked_example_time(),
    }
}

/// Source that replays a fixed list of advertisements.
///
/// With `hold_open` the channel stays open after the list is exhausted, like a
/// radio that has gone quiet.
#[derive(Debug)]
pub struct FakeSource {
    advertisements: Vec<Advertisement>,
    hold_open: bool,
}

impl FakeSource {
    pub fn new(advertisements: Vec<Advertisement>) -> Self {
        Self {
            advertisements,
            hold_open: false,
        }
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

impl AdvertisementSource for FakeSource {
    fn start(&self) -> StartFuture<'_> {
        let advertisements = self.advertisements.clone();
        let hold_open = self.hold_open;
        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<Advertisement>(advertisements.len().max(1));
            tokio::spawn(async move {
                for advertisement in advertisements {
                    let _ = tx.send(advertisement).await;
                }
                if hold_open {
                    tx.closed().await;
                }
            });
            Ok(rx)
        })
    }
}

/// Exporter that keeps every reading it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingExporter {
    pub readings: Arc<Mutex<Vec<Reading>>>,
}

impl RecordingExporter {
    pub fn received(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }
}

impl Exporter for RecordingExporter {
    fn name(&self) -> &str {
        "recording"
    }

    fn export<'a>(&'a self, reading: &'a Reading) -> ExportFuture<'a> {
        self.readings.lock().unwrap().push(reading.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Exporter that always fails with an I/O error.
#[derive(Debug, Default)]
pub struct FailingExporter;

impl Exporter for FailingExporter {
    fn name(&self) -> &str {
        "failing"
    }

    fn export<'a>(&'a self, _reading: &'a Reading) -> ExportFuture<'a> {
        Box::pin(async { Err(ExportError::Io(io::Error::other("disk on fire"))) })
    }
}

/// Exporter that never finishes within any reasonable sink timeout.
#[derive(Debug, Default)]
pub struct StalledExporter;

impl Exporter for StalledExporter {
    fn name(&self) -> &str {
        "stalled"
    }

    fn export<'a>(&'a self, _reading: &'a Reading) -> ExportFuture<'a> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
    }
}

/// Cloneable in-memory writer for console output assertions.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read one HTTP/1.1 request (head and body) as text.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8(buf).unwrap()
}

/// Accept one request, answer with `status_line`, and hand back the request.
pub async fn respond_once(status_line: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });
    (format!("http://{addr}/readings"), handle)
}

/// Accept one request and never answer it.
pub async fn respond_never() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        drop(socket);
    });
    (format!("http://{addr}/readings"), handle)
}
