//! BLE GATT adapter for the provisioning channel.
//!
//! Exposes two write characteristics (network name, secret) and one notify
//! characteristic that acknowledges each write with `"<attribute> Good"` or
//! `"<attribute> Bad"`. Connection state changes and writes are queued as
//! [`LinkEvent`]s for the single-threaded provisioning loop to drain.
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: Provisioning
//! ├── Network name (Write)
//! ├── Secret (Write)
//! └── Ack (Notify) - "<attribute> Good" / "<attribute> Bad"
//! ```

use super::{Attribute, LinkEvent, ProvisioningLink};
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{uuid128, BLEAdvertisementData, BLEDevice, NimbleProperties};
use log::{info, warn};
use std::sync::{Arc, Mutex};

/// Provisioning service UUID.
const PROVISIONING_SERVICE_UUID: BleUuid = uuid128!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");

/// UUID for the network-name write characteristic.
const NETWORK_NAME_CHAR_UUID: BleUuid = uuid128!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

/// UUID for the secret write characteristic.
const SECRET_CHAR_UUID: BleUuid = uuid128!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// UUID for the acknowledgement notify characteristic.
const ACK_CHAR_UUID: BleUuid = uuid128!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// BLE advertisement name.
const DEVICE_NAME: &str = "IRBlastV2";

#[derive(Default)]
struct LinkState {
    network_name: String,
    secret: String,
    events: Vec<LinkEvent>,
}

impl LinkState {
    /// Record a write, store the value if usable, and return the
    /// acknowledgement verdict for the notify payload.
    fn record_write(&mut self, attr: Attribute, data: &[u8]) -> &'static str {
        self.events.push(LinkEvent::Received(attr));

        if data.is_empty() {
            return "Bad";
        }
        match String::from_utf8(data.to_vec()) {
            Ok(value) => {
                match attr {
                    Attribute::NetworkName => self.network_name = value,
                    Attribute::Secret => self.secret = value,
                }
                "Good"
            }
            Err(e) => {
                warn!("{} write rejected: invalid UTF-8: {}", attr.label(), e);
                "Bad"
            }
        }
    }
}

/// Provisioning channel over a NimBLE GATT server.
pub struct BleProvisioningLink {
    state: Arc<Mutex<LinkState>>,
}

impl BleProvisioningLink {
    /// Register the GATT service and start advertising.
    pub fn start() -> Self {
        let state = Arc::new(Mutex::new(LinkState::default()));

        let device = BLEDevice::take();
        let server = device.get_server();

        let connect_state = state.clone();
        server.on_connect(move |_server, desc| {
            info!("provisioning peer connected: {:?}", desc.address());
            connect_state
                .lock()
                .unwrap()
                .events
                .push(LinkEvent::Connected);
        });

        let disconnect_state = state.clone();
        server.on_disconnect(move |desc, _reason| {
            info!("provisioning peer disconnected: {:?}", desc.address());
            disconnect_state
                .lock()
                .unwrap()
                .events
                .push(LinkEvent::Disconnected);
        });

        let service = server.create_service(PROVISIONING_SERVICE_UUID);

        // Acknowledgement characteristic (Notify)
        let ack_char = service
            .lock()
            .create_characteristic(ACK_CHAR_UUID, NimbleProperties::NOTIFY);

        // Network name characteristic (Write)
        let name_state = state.clone();
        let name_ack = ack_char.clone();
        let name_char = service
            .lock()
            .create_characteristic(NETWORK_NAME_CHAR_UUID, NimbleProperties::WRITE);
        name_char.lock().on_write(move |args| {
            let verdict = name_state
                .lock()
                .unwrap()
                .record_write(Attribute::NetworkName, args.recv_data());
            let reply = format!("{} {}", Attribute::NetworkName.label(), verdict);
            name_ack.lock().set_value(reply.as_bytes());
            name_ack.lock().notify();
            name_state
                .lock()
                .unwrap()
                .events
                .push(LinkEvent::Acknowledged(Attribute::NetworkName));
        });

        // Secret characteristic (Write)
        let secret_state = state.clone();
        let secret_ack = ack_char.clone();
        let secret_char = service
            .lock()
            .create_characteristic(SECRET_CHAR_UUID, NimbleProperties::WRITE);
        secret_char.lock().on_write(move |args| {
            let verdict = secret_state
                .lock()
                .unwrap()
                .record_write(Attribute::Secret, args.recv_data());
            let reply = format!("{} {}", Attribute::Secret.label(), verdict);
            secret_ack.lock().set_value(reply.as_bytes());
            secret_ack.lock().notify();
            secret_state
                .lock()
                .unwrap()
                .events
                .push(LinkEvent::Acknowledged(Attribute::Secret));
        });

        let advertising = device.get_advertising();
        advertising
            .lock()
            .set_data(
                BLEAdvertisementData::new()
                    .name(DEVICE_NAME)
                    .add_service_uuid(PROVISIONING_SERVICE_UUID),
            )
            .unwrap();
        advertising.lock().start().unwrap();

        info!("provisioning service advertising as {}", DEVICE_NAME);
        Self { state }
    }
}

impl ProvisioningLink for BleProvisioningLink {
    fn poll_events(&mut self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.state.lock().unwrap().events)
    }

    fn network_name(&self) -> String {
        self.state.lock().unwrap().network_name.clone()
    }

    fn secret(&self) -> String {
        self.state.lock().unwrap().secret.clone()
    }
}
