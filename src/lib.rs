//! IRBlast ESP32 firmware library.
//!
//! Firmware for a network-attached infrared-replay appliance. On first boot
//! the device acquires WiFi credentials over BLE, persists them, and
//! restarts; with credentials stored it joins the network, announces itself
//! over UDP, pairs with a single controller, and serves capture/replay
//! commands. A tri-color indicator annunciates every state transition.
//!
//! The core modules are platform-independent and tested on the host with
//! `cargo test --no-default-features`; hardware adapters (NVS storage, BLE
//! provisioning, WiFi driver, GPIO indicator) sit behind the `esp32`
//! feature.

pub mod credentials;
pub mod device;
pub mod discovery;
pub mod ir;
pub mod network;
pub mod provisioning;
pub mod status;
pub mod storage;
pub mod time;

// Re-export commonly used items
pub use credentials::Credentials;
pub use device::{boot_mode, BootMode, Shutdown};
pub use discovery::{Discovery, PeerSession, UdpTransport};
pub use network::{NetworkError, NetworkProvider};
pub use status::{DeviceStatus, IndicatorPattern, StatusLed};
pub use storage::CredentialStore;

/// Shared handle to the default NVS partition.
///
/// `EspNvsPartition::take()` may only be called once per boot; both the
/// credential region and any future NVS user go through this accessor.
#[cfg(feature = "esp32")]
pub fn nvs_default_partition(
) -> Result<esp_idf_svc::nvs::EspDefaultNvsPartition, esp_idf_sys::EspError> {
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use std::sync::OnceLock;

    static PARTITION: OnceLock<EspDefaultNvsPartition> = OnceLock::new();

    if let Some(partition) = PARTITION.get() {
        return Ok(partition.clone());
    }
    let partition = EspDefaultNvsPartition::take()?;
    Ok(PARTITION.get_or_init(|| partition).clone())
}
