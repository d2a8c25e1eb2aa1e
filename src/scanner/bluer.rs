//! BlueZ D-Bus advertisement source.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{
    ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, AdvertisementSource, ScanError, StartFuture,
};
use crate::mac_address::MacAddress;
use bluer::{
    Adapter, AdapterEvent, Address, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, Session,
};
use chrono::Utc;
use futures::stream::{self, SelectAll, Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Property changes of one device; `None` marks the end of its subscription.
type DeviceEvents = Pin<Box<dyn Stream<Item = (Address, Option<DeviceEvent>)> + Send>>;

/// Passive BLE discovery through BlueZ.
#[derive(Debug, Clone, Copy)]
pub struct BluerSource {
    manufacturer_id: u16,
}

impl BluerSource {
    /// `manufacturer_id` is only used to log what the session is looking for;
    /// every manufacturer-data entry is forwarded.
    pub fn new(manufacturer_id: u16) -> Self {
        Self { manufacturer_id }
    }
}

impl AdvertisementSource for BluerSource {
    fn start(&self) -> StartFuture<'_> {
        Box::pin(start_scan(self.manufacturer_id))
    }
}

/// Devices with a live property-change subscription.
///
/// BlueZ can announce the same device more than once; each address is
/// subscribed at most once until its event stream ends.
#[derive(Debug, Default)]
struct Subscriptions {
    watched: HashSet<Address>,
}

impl Subscriptions {
    /// `true` if `address` has no subscription yet and should get one.
    fn subscribe(&mut self, address: Address) -> bool {
        self.watched.insert(address)
    }

    fn ended(&mut self, address: Address) {
        self.watched.remove(&address);
    }

    fn len(&self) -> usize {
        self.watched.len()
    }
}

fn manufacturer_data(event: DeviceEvent) -> Option<HashMap<u16, Vec<u8>>> {
    match event {
        DeviceEvent::PropertyChanged(DeviceProperty::ManufacturerData(data)) => Some(data),
        _ => None,
    }
}

/// Cached devices that are out of range have no RSSI.
fn in_range(rssi: Option<i16>) -> bool {
    rssi.is_some()
}

/// Start BLE discovery and forward manufacturer data as advertisement records.
///
/// Duplicate reports are enabled so every broadcast of a known device shows up
/// as a manufacturer-data property change.
pub async fn start_scan(
    manufacturer_id: u16,
) -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    tracing::info!(
        adapter = adapter.name(),
        manufacturer_id,
        "starting BLE discovery"
    );

    let discovery = adapter.discover_devices().await?;
    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        let mut discovery = Box::pin(discovery);
        let mut device_events: SelectAll<DeviceEvents> = SelectAll::new();
        let mut subscriptions = Subscriptions::default();

        loop {
            tokio::select! {
                event = discovery.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        if !subscriptions.subscribe(address) {
                            continue;
                        }
                        match watch_device(&adapter, address, &tx).await {
                            Ok(events) => device_events.push(events),
                            Err(e) => {
                                subscriptions.ended(address);
                                tracing::debug!(%address, error = %e, "ignoring device");
                            }
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
                Some((address, event)) = device_events.next(), if !device_events.is_empty() => {
                    match event.map(manufacturer_data) {
                        Some(Some(data)) => {
                            if !forward(address, data, &tx).await {
                                break;
                            }
                        }
                        Some(None) => {}
                        None => {
                            subscriptions.ended(address);
                            tracing::debug!(%address, watched = subscriptions.len(), "device gone");
                        }
                    }
                }
            }

            if tx.is_closed() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Subscribe to the device's property changes and forward its current
/// manufacturer data if it is in range.
async fn watch_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<Advertisement>,
) -> Result<DeviceEvents, ScanError> {
    let device = adapter.device(address)?;
    let events = device.events().await?;

    if in_range(device.rssi().await?)
        && let Some(data) = device.manufacturer_data().await?
    {
        forward(address, data, tx).await;
    }

    let events = events
        .map(move |event| (address, Some(event)))
        .chain(stream::once(async move { (address, None) }));
    Ok(Box::pin(events))
}

/// Returns `false` once the receiving side has gone away.
async fn forward(
    address: Address,
    data: HashMap<u16, Vec<u8>>,
    tx: &mpsc::Sender<Advertisement>,
) -> bool {
    let address: MacAddress = address.into();
    let observed_at = Utc::now();

    for (manufacturer_id, payload) in data {
        let advertisement = Advertisement {
            address,
            manufacturer_id,
            payload,
            observed_at,
        };
        if tx.send(advertisement).await.is_err() {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_to_mac_address() {
        let addr = Address([0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE]);
        let mac: MacAddress = addr.into();
        assert_eq!(mac, MacAddress([0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE]));
    }

    #[test]
    fn test_each_device_is_subscribed_once() {
        let mut subscriptions = Subscriptions::default();
        let meter = Address([0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE]);
        let other = Address([0xAC, 0xDE, 0x48, 0x00, 0x11, 0x22]);

        assert!(subscriptions.subscribe(meter));
        // Repeated announcements of a watched device add nothing
        for _ in 0..10 {
            assert!(!subscriptions.subscribe(meter));
        }
        assert!(subscriptions.subscribe(other));
        assert_eq!(subscriptions.len(), 2);
    }

    #[test]
    fn test_ended_subscription_can_be_renewed() {
        let mut subscriptions = Subscriptions::default();
        let meter = Address([0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE]);

        assert!(subscriptions.subscribe(meter));
        subscriptions.ended(meter);
        assert_eq!(subscriptions.len(), 0);
        assert!(subscriptions.subscribe(meter));
        assert!(!subscriptions.subscribe(meter));
    }

    #[test]
    fn test_cached_devices_without_rssi_are_out_of_range() {
        assert!(!in_range(None));
        assert!(in_range(Some(-70)));
    }

    #[tokio::test]
    async fn test_forward_emits_one_record_per_manufacturer_entry() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut data = HashMap::new();
        data.insert(2409u16, vec![0x01, 0x02]);
        data.insert(76u16, vec![0x03]);

        let address = Address([0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE]);
        assert!(forward(address, data, &tx).await);
        drop(tx);

        let mut ids = Vec::new();
        while let Some(advertisement) = rx.recv().await {
            assert_eq!(advertisement.address.to_string(), "B0:E9:FE:58:74:AE");
            ids.push(advertisement.manufacturer_id);
        }
        ids.sort_unstable();
        assert_eq!(ids, vec![76, 2409]);
    }

    #[tokio::test]
    async fn test_forward_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut data = HashMap::new();
        data.insert(2409u16, vec![0x01]);
        assert!(!forward(Address([0; 6]), data, &tx).await);
    }
}
