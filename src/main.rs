//! IRBlast firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== IRBlast starting ===");

    if let Err(e) = esp32::run() {
        log::error!("fatal: {}", e);
    }

    // Every lifecycle phase ends in a restart; so does a fatal init error.
    log::info!("restarting");
    esp_idf_hal::reset::restart();
}

#[cfg(feature = "esp32")]
mod esp32 {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use irblast_esp32::device::{self, BootMode};
    use irblast_esp32::discovery::UdpTransport;
    use irblast_esp32::ir::{DirStore, IrService, NullTransceiver};
    use irblast_esp32::network::WifiStation;
    use irblast_esp32::provisioning::BleProvisioningLink;
    use irblast_esp32::status::{DeviceStatus, GpioPins, StatusLed};
    use irblast_esp32::storage::{CredentialStore, NvsRegion};
    use irblast_esp32::time::SystemClock;
    use std::error::Error;
    use std::time::Duration;

    /// Mount point of the recording filesystem.
    const RECORDING_ROOT: &str = "/sdcard";

    pub fn run() -> Result<(), Box<dyn Error>> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;

        // Indicator on GPIO 4 (red), 16 (green), 17 (blue).
        let pins = GpioPins::new(
            peripherals.pins.gpio4.downgrade_output(),
            peripherals.pins.gpio16.downgrade_output(),
            peripherals.pins.gpio17.downgrade_output(),
        )?;
        let mut led = StatusLed::new(pins, SystemClock);
        led.set_status(DeviceStatus::Booted, true, Duration::from_secs(1));

        let mut store = CredentialStore::new(NvsRegion::open()?);

        match device::boot_mode(&store) {
            BootMode::Operational => {
                let creds = store.load()?;
                let network = WifiStation::new(peripherals.modem, sysloop, creds)?;
                let ir = IrService::new(NullTransceiver, DirStore::new(RECORDING_ROOT));
                device::operational_bootstrap(
                    network,
                    |_| UdpTransport::bind(),
                    ir,
                    &mut led,
                    SystemClock,
                );
            }
            BootMode::Provisioning => {
                let link = BleProvisioningLink::start();
                device::provisioning_bootstrap(link, &mut store, &mut led, SystemClock);
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use irblast_esp32::device;
    use irblast_esp32::discovery::UdpTransport;
    use irblast_esp32::ir::{DirStore, IrService, NullTransceiver};
    use irblast_esp32::network::HostNetwork;
    use irblast_esp32::status::{DeviceStatus, LogPins, StatusLed};
    use irblast_esp32::time::SystemClock;
    use std::time::Duration;

    env_logger::init();

    log::info!("=== IRBlast host node starting ===");

    // No radio to provision on the host: go straight to the operational
    // loop so the discovery protocol can be exercised with a real
    // controller on the local network.
    let mut led = StatusLed::new(LogPins, SystemClock);
    led.set_status(DeviceStatus::Booted, true, Duration::from_secs(1));

    let recordings = std::env::temp_dir().join("irblast-recordings");
    let ir = IrService::new(NullTransceiver, DirStore::new(recordings));

    device::operational_bootstrap(
        HostNetwork::new(),
        |_| UdpTransport::bind(),
        ir,
        &mut led,
        SystemClock,
    );
}
