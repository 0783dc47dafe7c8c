//! Device lifecycle orchestration.
//!
//! Boot branches on the credential store: no credentials means the device
//! runs one provisioning attempt and restarts; stored credentials mean it
//! connects to the network and enters the operational loop. There is no
//! backward transition between the two modes, only a full restart, which is
//! also the sole recovery from a stuck provisioning attempt or a failed
//! network bring-up. Functions here return [`Shutdown`] instead of calling
//! into the platform reset so the binary (and the tests) decide what a
//! restart physically is.

use crate::discovery::{DatagramSocket, Discovery};
use crate::ir::{IrService, IrTransceiver, RecordingStore};
use crate::network::NetworkProvider;
use crate::provisioning::{ProvisioningLink, ProvisioningSession};
use crate::status::{DeviceStatus, IndicatorPins, StatusLed};
use crate::storage::{CredentialStore, RawStore};
use crate::time::Clock;
use log::{error, info, warn};
use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Bounded network bring-up: attempts before giving up and restarting.
const CONNECT_ATTEMPTS: u32 = 10;

/// Delay between network connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Terminal outcome of a lifecycle phase. The only variant is a restart
/// request; the device has no graceful shutdown path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Restart,
}

/// What to run after boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// No usable credentials: acquire them over the provisioning channel.
    Provisioning,
    /// Credentials stored: join the network and serve controllers.
    Operational,
}

/// Decide the boot branch from the credential store.
pub fn boot_mode<S: RawStore>(store: &CredentialStore<S>) -> BootMode {
    if store.has_credentials() {
        BootMode::Operational
    } else {
        BootMode::Provisioning
    }
}

/// Run one provisioning attempt and request a restart.
///
/// Success persists the captured pair before the restart; a timeout
/// restarts with the store untouched. Both paths reboot — the next boot
/// re-reads the store and branches accordingly.
pub fn provisioning_bootstrap<L, S, P, C, C2>(
    link: L,
    store: &mut CredentialStore<S>,
    led: &mut StatusLed<P, C2>,
    clock: C,
) -> Shutdown
where
    L: ProvisioningLink,
    S: RawStore,
    P: IndicatorPins,
    C: Clock,
    C2: Clock,
{
    led.show(DeviceStatus::BleInit);
    let mut session = ProvisioningSession::new(link, clock);

    match session.await_credentials(led) {
        Ok(creds) => match store.save(&creds) {
            Ok(()) => info!("credentials stored, restarting into operation"),
            Err(e) => {
                error!("failed to persist credentials: {}", e);
                led.set_status(DeviceStatus::BleFailed, true, Duration::from_secs(1));
            }
        },
        Err(timeout) => warn!("{}, restarting", timeout),
    }

    Shutdown::Restart
}

/// Bring the network up and run the operational loop.
///
/// The network gets [`CONNECT_ATTEMPTS`] bounded attempts; exhausting them
/// renders the failure and requests a restart. Once up, the loop never
/// exits — a lost network renders an observable lost state each iteration
/// but deliberately attempts no reconnect.
pub fn operational_bootstrap<N, F, Sock, T, RS, P, C, C2>(
    mut network: N,
    socket_factory: F,
    mut ir: IrService<T, RS>,
    led: &mut StatusLed<P, C2>,
    clock: C,
) -> Shutdown
where
    N: NetworkProvider,
    F: FnOnce(Ipv4Addr) -> io::Result<Sock>,
    Sock: DatagramSocket,
    T: IrTransceiver,
    RS: RecordingStore,
    P: IndicatorPins,
    C: Clock,
    C2: Clock,
{
    led.set_status(DeviceStatus::WifiInit, true, Duration::from_millis(500));

    let Some(ip) = connect_with_retry(&mut network, led, &clock) else {
        led.set_status(DeviceStatus::WifiFailed, true, Duration::from_secs(1));
        return Shutdown::Restart;
    };
    led.show(DeviceStatus::WifiConnected);

    let socket = match socket_factory(ip) {
        Ok(socket) => socket,
        Err(e) => {
            error!("failed to open discovery socket: {}", e);
            led.set_status(DeviceStatus::UdpUnknownError, true, Duration::from_secs(1));
            return Shutdown::Restart;
        }
    };
    let mut discovery = Discovery::new(socket, clock, ip);

    loop {
        operational_iteration(&mut network, &mut discovery, &mut ir, led);
    }
}

/// One cooperative scheduler iteration of the operational phase.
///
/// Runs exactly one of: the lost-network annunciation, a pairing/announce
/// cycle (no live controller), or a single receive-dispatch-respond
/// exchange (live controller).
pub fn operational_iteration<N, Sock, T, RS, P, C, C2>(
    network: &mut N,
    discovery: &mut Discovery<Sock, C>,
    ir: &mut IrService<T, RS>,
    led: &mut StatusLed<P, C2>,
) where
    N: NetworkProvider,
    Sock: DatagramSocket,
    T: IrTransceiver,
    RS: RecordingStore,
    P: IndicatorPins,
    C: Clock,
    C2: Clock,
{
    if !network.is_connected() {
        if led.status() != DeviceStatus::WifiConnectionLost {
            warn!("network connectivity lost");
        }
        // Observable lost state only; reconnection policy is an extension
        // point, not implemented here.
        led.show(DeviceStatus::WifiConnectionLost);
        return;
    }

    // Transient pulses leave the indicator off the steady pattern; restore
    // it before doing protocol work.
    if led.status() != DeviceStatus::WifiConnected {
        led.set_status(DeviceStatus::WifiConnected, true, Duration::from_secs(1));
    }

    if !discovery.is_peer_alive() {
        discovery.check_incoming(led);
    } else if let Some(msg) = discovery.receive() {
        led.show(DeviceStatus::WifiReceive);
        let reply = ir.execute(&msg);
        led.show(DeviceStatus::WifiSend);
        if let Err(e) = discovery.send(&reply) {
            warn!("reply send failed: {}", e);
            led.show(DeviceStatus::UdpUnknownError);
        }
    }
}

fn connect_with_retry<N, P, C, C2>(
    network: &mut N,
    led: &mut StatusLed<P, C2>,
    clock: &C,
) -> Option<Ipv4Addr>
where
    N: NetworkProvider,
    P: IndicatorPins,
    C: Clock,
    C2: Clock,
{
    for attempt in 1..=CONNECT_ATTEMPTS {
        led.show(DeviceStatus::WifiConnecting);
        match network.connect() {
            Ok(ip) => return Some(ip),
            Err(e) => {
                warn!(
                    "connection attempt {}/{} failed: {}",
                    attempt, CONNECT_ATTEMPTS, e
                );
                clock.sleep(CONNECT_RETRY_DELAY);
            }
        }
    }
    None
}
