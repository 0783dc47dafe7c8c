//! Credential acquisition over the short-range provisioning channel.
//!
//! A connecting peer writes two attributes (network name, secret) in any
//! order, possibly rewriting either before both are present. This module
//! polls the channel until both values are non-empty or the provisioning
//! window expires. The window re-arms every time a peer (re)connects, so an
//! idle but connected peer keeps the window open from its last connect, not
//! from each tick.
//!
//! The channel adapter reports what happened through an explicit event
//! queue ([`LinkEvent`]) drained once per poll, rather than flags set from
//! transport callbacks.

#[cfg(feature = "esp32")]
mod ble_service;

#[cfg(feature = "esp32")]
pub use ble_service::BleProvisioningLink;

use crate::credentials::Credentials;
use crate::status::{DeviceStatus, IndicatorPins, StatusLed};
use crate::time::Clock;
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// How long the device waits for a complete credential pair since boot or
/// the last peer (re)connect.
pub const PROVISIONING_WINDOW: Duration = Duration::from_secs(2 * 60);

/// Poll granularity of the credential wait loop.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The two writable provisioning attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    NetworkName,
    Secret,
}

impl Attribute {
    /// Wire label used in write acknowledgements ("SSID Good" etc.).
    pub fn label(self) -> &'static str {
        match self {
            Self::NetworkName => "SSID",
            Self::Secret => "PASS",
        }
    }
}

/// Events surfaced by the provisioning channel adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A peer connected to the channel.
    Connected,
    /// The peer disconnected.
    Disconnected,
    /// An attribute value was written by the peer.
    Received(Attribute),
    /// The write acknowledgement was sent back to the peer.
    Acknowledged(Attribute),
}

/// Capability interface over the short-range transport.
///
/// Implementations deliver connect/disconnect signaling and the two
/// attribute values; they do not interpret them.
pub trait ProvisioningLink {
    /// Drain all events since the last poll, in order.
    fn poll_events(&mut self) -> Vec<LinkEvent>;

    /// Current value of the network-name attribute (empty if never written).
    fn network_name(&self) -> String;

    /// Current value of the secret attribute (empty if never written).
    fn secret(&self) -> String;
}

/// No complete credential pair arrived within the provisioning window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningTimeout;

impl fmt::Display for ProvisioningTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no credentials received within the provisioning window")
    }
}

impl std::error::Error for ProvisioningTimeout {}

/// Polls a [`ProvisioningLink`] for a complete credential pair.
pub struct ProvisioningSession<L: ProvisioningLink, C: Clock> {
    link: L,
    clock: C,
}

impl<L: ProvisioningLink, C: Clock> ProvisioningSession<L, C> {
    pub fn new(link: L, clock: C) -> Self {
        Self { link, clock }
    }

    /// Wait until the peer has written both attributes, rendering channel
    /// activity on the indicator as it happens.
    ///
    /// Returns the captured pair, or [`ProvisioningTimeout`] once
    /// [`PROVISIONING_WINDOW`] elapses with no (re)connect. The caller is
    /// expected to restart the device on either outcome.
    pub fn await_credentials<P: IndicatorPins, C2: Clock>(
        &mut self,
        led: &mut StatusLed<P, C2>,
    ) -> Result<Credentials, ProvisioningTimeout> {
        let mut window_start = self.clock.now();

        loop {
            for event in self.link.poll_events() {
                match event {
                    LinkEvent::Connected => {
                        info!("provisioning peer connected");
                        led.show(DeviceStatus::BleConnected);
                        window_start = self.clock.now();
                    }
                    LinkEvent::Disconnected => {
                        info!("provisioning peer disconnected");
                        led.show(DeviceStatus::BleDisconnected);
                    }
                    LinkEvent::Received(attr) => {
                        debug!("attribute {} written", attr.label());
                        led.show(DeviceStatus::BleReceive);
                    }
                    LinkEvent::Acknowledged(attr) => {
                        debug!("attribute {} acknowledged", attr.label());
                        led.show(DeviceStatus::BleSend);
                    }
                }
            }

            let name = self.link.network_name();
            let secret = self.link.secret();
            if !name.is_empty() && !secret.is_empty() {
                info!("credentials captured for network {:?}", name);
                return Ok(Credentials::new(name, secret));
            }

            if self.clock.now() - window_start >= PROVISIONING_WINDOW {
                warn!("provisioning window expired");
                return Err(ProvisioningTimeout);
            }

            self.clock.sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
pub use mock::MockLink;

#[cfg(test)]
mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted provisioning link: each entry is the state the link exposes
    /// for one poll round (events to deliver, current attribute values).
    #[derive(Debug, Default)]
    pub struct MockLink {
        script: VecDeque<(Vec<LinkEvent>, String, String)>,
        name: String,
        secret: String,
    }

    impl MockLink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_round(
            &mut self,
            events: Vec<LinkEvent>,
            name: &str,
            secret: &str,
        ) {
            self.script
                .push_back((events, name.to_string(), secret.to_string()));
        }
    }

    impl ProvisioningLink for MockLink {
        fn poll_events(&mut self) -> Vec<LinkEvent> {
            match self.script.pop_front() {
                Some((events, name, secret)) => {
                    self.name = name;
                    self.secret = secret;
                    events
                }
                None => Vec::new(),
            }
        }

        fn network_name(&self) -> String {
            self.name.clone()
        }

        fn secret(&self) -> String {
            self.secret.clone()
        }
    }
}
