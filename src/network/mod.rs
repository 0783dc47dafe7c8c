//! Network abstraction layer.
//!
//! The lifecycle talks to the network through [`NetworkProvider`] so the
//! same operational code runs on:
//! - **ESP32** (`esp32` feature): WiFi station driven by stored credentials
//! - **Host**: native OS networking (tests and the host binary)

#[cfg(feature = "esp32")]
mod wifi;

mod host;

#[cfg(feature = "esp32")]
pub use wifi::WifiStation;

pub use host::HostNetwork;

use std::fmt;
use std::net::Ipv4Addr;

/// Network provider abstraction.
pub trait NetworkProvider {
    /// Connect and return the local IPv4 address. One bounded attempt; the
    /// lifecycle owns the retry policy.
    fn connect(&mut self) -> Result<Ipv4Addr, NetworkError>;

    /// Whether the network link is currently up.
    fn is_connected(&self) -> bool;

    /// Local address, if connected.
    fn ip_addr(&self) -> Option<Ipv4Addr>;
}

/// Network errors.
#[derive(Debug)]
pub enum NetworkError {
    /// Stored credentials were rejected by the driver.
    InvalidCredentials,
    /// A connection attempt failed.
    ConnectionFailed(String),
    /// Generic I/O error.
    Io(std::io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "credentials rejected by driver"),
            Self::ConnectionFailed(reason) => write!(f, "connection failed: {}", reason),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for NetworkError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::ConnectionFailed(format!("ESP error: {:?}", e))
    }
}
