//! ESP32 WiFi station provider.
//!
//! Drives the ESP-IDF WiFi driver with the stored credential pair. Each
//! `connect` call is one bounded attempt; the lifecycle retries and decides
//! when to give up and restart.

use super::{NetworkError, NetworkProvider};
use crate::credentials::Credentials;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::EspError;
use log::info;
use std::net::Ipv4Addr;

/// WiFi station driven by stored credentials.
pub struct WifiStation<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
    credentials: Credentials,
    ip_addr: Option<Ipv4Addr>,
}

impl<'a> WifiStation<'a> {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        credentials: Credentials,
    ) -> Result<Self, EspError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self {
            wifi,
            credentials,
            ip_addr: None,
        })
    }
}

impl NetworkProvider for WifiStation<'_> {
    fn connect(&mut self) -> Result<Ipv4Addr, NetworkError> {
        info!("connecting to network {:?}", self.credentials.network_name());

        let auth_method = if self.credentials.secret().is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: self
                .credentials
                .network_name()
                .try_into()
                .map_err(|_| NetworkError::InvalidCredentials)?,
            password: self
                .credentials
                .secret()
                .try_into()
                .map_err(|_| NetworkError::InvalidCredentials)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start()?;
        }
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;

        let ip = self.wifi.wifi().sta_netif().get_ip_info()?.ip;
        self.ip_addr = Some(ip);
        info!("network up, IP: {}", ip);
        Ok(ip)
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        if self.is_connected() {
            self.ip_addr
        } else {
            None
        }
    }
}
