//! Peer discovery, pairing, and liveness over UDP.
//!
//! Once the device is on a network it announces its own address to the
//! subnet broadcast address once per second and listens for a datagram
//! carrying the pre-shared pass-phrase. The sender of that phrase becomes
//! the paired controller (last writer wins), gets a single greeting reply,
//! and is thereafter pinged once a minute. Steady-state traffic is opaque
//! text, one message per datagram, exchanged with the paired controller
//! without further identity checks.
//!
//! Datagrams from broadcast-like senders (last octet 255) or from the
//! device's own address are discarded before any of this.

use crate::status::{DeviceStatus, IndicatorPins, StatusLed};
use crate::time::Clock;
use log::{debug, info, warn};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

/// Well-known port for announce, pairing, and data traffic.
pub const DISCOVERY_PORT: u16 = 8181;

/// Pre-shared pairing phrase.
pub const PASS_PHRASE: &str = "abc";

/// Reply sent to a peer that paired successfully.
pub const GREETING: &str = "Hello";

/// Liveness probe payload.
pub const PING: &str = "ping";

/// Expected liveness reply payload.
pub const PONG: &str = "pong";

/// Minimum spacing between announce broadcasts.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_millis(1000);

/// Quiet period after a successful liveness check.
pub const LIVENESS_INTERVAL: Duration = Duration::from_millis(60_000);

/// How long to wait for a liveness reply.
pub const LIVENESS_REPLY_WINDOW: Duration = Duration::from_millis(1000);

/// Poll granularity inside the liveness reply window.
const LIVENESS_POLL: Duration = Duration::from_millis(10);

/// Largest datagram the protocol handles. One datagram is one message; no
/// reassembly.
pub const MAX_DATAGRAM_LEN: usize = 512;

/// Connectionless datagram endpoint.
pub trait DatagramSocket {
    /// Send one datagram. Returns the number of bytes written.
    fn send_to(&mut self, payload: &[u8], addr: SocketAddrV4) -> io::Result<usize>;

    /// Receive one pending datagram, if any. Never blocks.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddrV4)>>;
}

/// UDP socket bound to the discovery port, non-blocking, broadcast-capable.
pub struct UdpTransport {
    socket: std::net::UdpSocket,
}

impl UdpTransport {
    pub fn bind() -> io::Result<Self> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT))?;
        socket.set_nonblocking(true)?;
        socket.set_broadcast(true)?;
        info!("discovery socket bound on port {}", DISCOVERY_PORT);
        Ok(Self { socket })
    }
}

impl DatagramSocket for UdpTransport {
    fn send_to(&mut self, payload: &[u8], addr: SocketAddrV4) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddrV4)>> {
        match self.socket.recv_from(buf) {
            Ok((len, std::net::SocketAddr::V4(from))) => Ok(Some((len, from))),
            // The protocol is IPv4-only; anything else is foreign traffic.
            Ok((_, std::net::SocketAddr::V6(from))) => {
                debug!("discarding IPv6 datagram from {}", from);
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// The single currently paired controller.
///
/// Overwritten by any later successful pairing; never cleared. A failed
/// liveness check only marks the session not-connected, so the record
/// remains for diagnostics until a new handshake supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSession {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub last_liveness: Instant,
}

/// Discovery protocol state machine.
pub struct Discovery<S: DatagramSocket, C: Clock> {
    socket: S,
    clock: C,
    local_ip: Ipv4Addr,
    last_broadcast: Option<Instant>,
    session: Option<PeerSession>,
    connected: bool,
}

impl<S: DatagramSocket, C: Clock> Discovery<S, C> {
    pub fn new(socket: S, clock: C, local_ip: Ipv4Addr) -> Self {
        Self {
            socket,
            clock,
            local_ip,
            last_broadcast: None,
            session: None,
            connected: false,
        }
    }

    /// The current peer session, paired or stale.
    pub fn session(&self) -> Option<&PeerSession> {
        self.session.as_ref()
    }

    /// Broadcast the device's dotted address to the subnet, at most once per
    /// [`ANNOUNCE_INTERVAL`]. Early calls are skipped, not queued. The
    /// outcome is annunciated: sent, write failure, or anything else.
    pub fn announce<P: IndicatorPins, C2: Clock>(&mut self, led: &mut StatusLed<P, C2>) {
        let now = self.clock.now();
        if let Some(last) = self.last_broadcast {
            if now - last < ANNOUNCE_INTERVAL {
                return;
            }
        }

        let octets = self.local_ip.octets();
        let broadcast = Ipv4Addr::new(octets[0], octets[1], octets[2], 255);
        let payload = self.local_ip.to_string();

        match self
            .socket
            .send_to(payload.as_bytes(), SocketAddrV4::new(broadcast, DISCOVERY_PORT))
        {
            Ok(sent) if sent == payload.len() => {
                // Only a successful broadcast re-arms the interval; failures
                // retry on the next call.
                self.last_broadcast = Some(self.clock.now());
                led.show(DeviceStatus::UdpBroadcastSent);
            }
            Ok(sent) => {
                warn!("announce truncated: {} of {} bytes", sent, payload.len());
                led.show(DeviceStatus::UdpUnknownError);
            }
            Err(e) => {
                warn!("announce failed: {}", e);
                led.show(DeviceStatus::UdpBroadcastFailed);
            }
        }
    }

    /// Receive one message from the network, discarding datagrams from
    /// broadcast-like senders and from this device itself. Steady-state
    /// callers trust the paired session and get the payload only.
    pub fn receive(&mut self) -> Option<String> {
        self.receive_from().map(|(msg, _)| msg)
    }

    fn receive_from(&mut self) -> Option<(String, SocketAddrV4)> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let (len, from) = match self.socket.try_recv(&mut buf) {
            Ok(Some(received)) => received,
            Ok(None) => return None,
            Err(e) => {
                warn!("receive failed: {}", e);
                return None;
            }
        };

        let sender_last = from.ip().octets()[3];
        if sender_last == 255 || sender_last == self.local_ip.octets()[3] {
            return None;
        }

        let msg = String::from_utf8_lossy(&buf[..len]).into_owned();
        Some((msg, from))
    }

    /// One pairing-phase cycle: accept a pass-phrase handshake if one is
    /// pending, then announce.
    ///
    /// A correct phrase overwrites any existing session (last writer wins),
    /// gets a single greeting reply, and starts the liveness clock. There is
    /// no further confirmation.
    pub fn check_incoming<P: IndicatorPins, C2: Clock>(&mut self, led: &mut StatusLed<P, C2>) {
        if let Some((msg, from)) = self.receive_from() {
            if msg == PASS_PHRASE {
                info!("paired with controller {}:{}", from.ip(), from.port());
                self.session = Some(PeerSession {
                    addr: *from.ip(),
                    port: from.port(),
                    last_liveness: self.clock.now(),
                });
                self.connected = true;
                if let Err(e) = self.socket.send_to(GREETING.as_bytes(), from) {
                    warn!("greeting send failed: {}", e);
                    led.show(DeviceStatus::UdpUnknownError);
                }
            } else {
                debug!("ignoring non-pairing datagram from {}: {:?}", from, msg);
            }
        }

        self.announce(led);
    }

    /// Whether the paired controller is still reachable.
    ///
    /// Quiet until [`LIVENESS_INTERVAL`] has passed since the last
    /// successful check; then sends a ping and busy-polls up to
    /// [`LIVENESS_REPLY_WINDOW`] for an exact pong. No pong marks the
    /// session not-connected but keeps the session record; a new pairing
    /// handshake is required to reconnect. A successful check re-arms the
    /// interval from the moment the check started.
    pub fn is_peer_alive(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        let Some(session) = self.session else {
            return false;
        };

        let check_start = self.clock.now();
        if check_start - session.last_liveness < LIVENESS_INTERVAL {
            return true;
        }

        let peer = SocketAddrV4::new(session.addr, session.port);
        if let Err(e) = self.socket.send_to(PING.as_bytes(), peer) {
            // No reply can arrive; the poll below will mark the session dead.
            warn!("ping send failed: {}", e);
        }
        debug!("ping sent to {}", peer);

        let mut alive = false;
        while self.clock.now() - check_start < LIVENESS_REPLY_WINDOW {
            if let Some(msg) = self.receive() {
                if msg == PONG {
                    alive = true;
                    break;
                }
            }
            self.clock.sleep(LIVENESS_POLL);
        }

        if alive {
            if let Some(session) = self.session.as_mut() {
                session.last_liveness = check_start;
            }
        } else {
            warn!("controller lost: no liveness reply within {:?}", LIVENESS_REPLY_WINDOW);
        }
        self.connected = alive;
        alive
    }

    /// Send one opaque message to the paired controller.
    pub fn send(&mut self, payload: &str) -> io::Result<usize> {
        let Some(session) = self.session else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no paired controller",
            ));
        };
        self.socket
            .send_to(payload.as_bytes(), SocketAddrV4::new(session.addr, session.port))
    }
}

#[cfg(test)]
pub use mock::MockSocket;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{MockPins, StatusLed};
    use crate::time::MockClock;

    const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);

    fn controller() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 10), 9000)
    }

    fn setup() -> (
        Discovery<MockSocket, MockClock>,
        MockSocket,
        MockClock,
        StatusLed<MockPins, MockClock>,
    ) {
        let socket = MockSocket::new();
        let clock = MockClock::new();
        let discovery = Discovery::new(socket.clone(), clock.clone(), LOCAL_IP);
        let led = StatusLed::new(MockPins::new(), clock.clone());
        (discovery, socket, clock, led)
    }

    #[test]
    fn test_pairing_records_session_and_replies_once() {
        let (mut discovery, socket, _clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());

        discovery.check_incoming(&mut led);

        let session = discovery.session().unwrap();
        assert_eq!(session.addr, Ipv4Addr::new(192, 0, 2, 10));
        assert_eq!(session.port, 9000);
        assert!(discovery.is_peer_alive());

        let greetings: Vec<_> = socket
            .sent()
            .into_iter()
            .filter(|(payload, _)| payload == GREETING)
            .collect();
        assert_eq!(greetings, vec![(GREETING.to_string(), controller())]);
    }

    #[test]
    fn test_second_pairing_overwrites_session() {
        let (mut discovery, socket, _clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);

        let usurper = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 20), 9001);
        socket.push_inbound(PASS_PHRASE, usurper);
        discovery.check_incoming(&mut led);

        let session = discovery.session().unwrap();
        assert_eq!(session.addr, *usurper.ip());
        assert_eq!(session.port, usurper.port());
    }

    #[test]
    fn test_wrong_phrase_is_ignored() {
        let (mut discovery, socket, _clock, mut led) = setup();
        socket.push_inbound("abd", controller());
        discovery.check_incoming(&mut led);
        assert!(discovery.session().is_none());
        assert!(!discovery.is_peer_alive());
    }

    #[test]
    fn test_broadcast_and_self_senders_discarded() {
        let (mut discovery, socket, _clock, mut led) = setup();
        socket.push_inbound(
            PASS_PHRASE,
            SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 255), 9000),
        );
        socket.push_inbound(
            PASS_PHRASE,
            // Same last octet as the local address.
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 9000),
        );
        discovery.check_incoming(&mut led);
        discovery.check_incoming(&mut led);
        assert!(discovery.session().is_none());
    }

    #[test]
    fn test_announce_rate_limited() {
        let (mut discovery, socket, clock, mut led) = setup();

        discovery.announce(&mut led);
        discovery.announce(&mut led);
        let broadcasts = |socket: &MockSocket| {
            socket
                .sent()
                .iter()
                .filter(|(payload, _)| payload == &LOCAL_IP.to_string())
                .count()
        };
        assert_eq!(broadcasts(&socket), 1);

        clock.advance(ANNOUNCE_INTERVAL);
        discovery.announce(&mut led);
        assert_eq!(broadcasts(&socket), 2);
    }

    #[test]
    fn test_announce_targets_subnet_broadcast() {
        let (mut discovery, socket, _clock, mut led) = setup();
        discovery.announce(&mut led);
        let (payload, to) = socket.sent().pop().unwrap();
        assert_eq!(payload, "192.0.2.7");
        assert_eq!(to, SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 255), DISCOVERY_PORT));
        assert_eq!(led.status(), DeviceStatus::UdpBroadcastSent);
    }

    #[test]
    fn test_failed_announce_pulses_and_retries_immediately() {
        let (mut discovery, socket, _clock, mut led) = setup();
        socket.fail_sends(true);
        discovery.announce(&mut led);
        assert_eq!(led.status(), DeviceStatus::UdpBroadcastFailed);

        // The failure did not re-arm the interval.
        socket.fail_sends(false);
        discovery.announce(&mut led);
        assert_eq!(led.status(), DeviceStatus::UdpBroadcastSent);
    }

    #[test]
    fn test_liveness_quiet_before_interval() {
        let (mut discovery, socket, clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);
        let sends_before = socket.sent().len();

        clock.advance(LIVENESS_INTERVAL - Duration::from_secs(1));
        assert!(discovery.is_peer_alive());
        assert_eq!(socket.sent().len(), sends_before);
    }

    #[test]
    fn test_liveness_timeout_marks_dead_but_keeps_session() {
        let (mut discovery, socket, clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);

        clock.advance(LIVENESS_INTERVAL);
        assert!(!discovery.is_peer_alive());
        assert!(discovery.session().is_some());
        // Dead stays dead until a new handshake.
        assert!(!discovery.is_peer_alive());

        let pings: Vec<_> = socket
            .sent()
            .into_iter()
            .filter(|(payload, _)| payload == PING)
            .collect();
        assert_eq!(pings.len(), 1);
    }

    #[test]
    fn test_liveness_pong_rearms_interval() {
        let (mut discovery, socket, clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);

        clock.advance(LIVENESS_INTERVAL);
        socket.push_inbound(PONG, controller());
        assert!(discovery.is_peer_alive());

        // Within the re-armed interval the peer is trusted without traffic.
        clock.advance(LIVENESS_INTERVAL - Duration::from_secs(1));
        let sends_before = socket.sent().len();
        assert!(discovery.is_peer_alive());
        assert_eq!(socket.sent().len(), sends_before);
    }

    #[test]
    fn test_liveness_ignores_non_pong_replies() {
        let (mut discovery, socket, clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);

        clock.advance(LIVENESS_INTERVAL);
        socket.push_inbound("pang", controller());
        assert!(!discovery.is_peer_alive());
    }

    #[test]
    fn test_repairing_revives_dead_session() {
        let (mut discovery, socket, clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);

        clock.advance(LIVENESS_INTERVAL);
        assert!(!discovery.is_peer_alive());

        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);
        assert!(discovery.is_peer_alive());
    }

    #[test]
    fn test_send_goes_to_paired_controller() {
        let (mut discovery, socket, _clock, mut led) = setup();
        socket.push_inbound(PASS_PHRASE, controller());
        discovery.check_incoming(&mut led);

        discovery.send("OK").unwrap();
        let (payload, to) = socket.sent().pop().unwrap();
        assert_eq!(payload, "OK");
        assert_eq!(to, controller());
    }

    #[test]
    fn test_send_without_session_errors() {
        let (mut discovery, _socket, _clock, _led) = setup();
        assert!(discovery.send("OK").is_err());
    }
}
