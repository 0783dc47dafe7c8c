//! Status annunciation through the tri-color indicator.
//!
//! Every internal state transition the user can care about is rendered as a
//! color/flash pattern on the indicator; it is the only user-visible output
//! channel the device has. The mapping from [`DeviceStatus`] to
//! [`IndicatorPattern`] is fixed and deterministic, except that the
//! connecting pattern alternates between green and amber across renders so a
//! long connection attempt visibly "breathes".
//!
//! Rendering a flashing pattern blocks the caller for the whole sequence.
//! That is a contract, not an accident: the firmware is a single cooperative
//! control flow, and nothing else is allowed to proceed while a status flash
//! is on the indicator.

#[cfg(feature = "esp32")]
mod gpio;

#[cfg(feature = "esp32")]
pub use gpio::GpioPins;

use crate::time::Clock;
use log::{debug, trace};
use std::time::Duration;

/// Abstract device states the indicator can annunciate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Power-on self-announcement.
    Booted,

    // Provisioning channel
    BleInit,
    BleConnected,
    BleDisconnected,
    BleFailed,
    BleSend,
    BleReceive,

    // Network bring-up and steady state
    WifiInit,
    WifiConnecting,
    WifiConnected,
    WifiFailed,
    WifiSend,
    WifiReceive,
    WifiConnectionLost,

    // Discovery protocol outcomes
    UdpBroadcastSent,
    UdpBroadcastFailed,
    UdpInvalidArgument,
    UdpUnknownError,
}

/// Indicator colors. `Amber` drives red and green together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Red,
    Green,
    Blue,
    Amber,
}

impl IndicatorColor {
    /// (red, green, blue) channel levels for this color.
    pub fn channels(self) -> (bool, bool, bool) {
        match self {
            Self::Red => (true, false, false),
            Self::Green => (false, true, false),
            Self::Blue => (false, false, true),
            Self::Amber => (true, true, false),
        }
    }
}

/// A renderable pattern: either a steady color or `flash_count` on/off
/// cycles, each cycle lasting `duration_ms / flash_rate` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorPattern {
    pub color: IndicatorColor,
    pub flashing: bool,
    pub flash_count: u32,
    pub duration_ms: u64,
    pub flash_rate: u32,
}

impl IndicatorPattern {
    pub fn steady(color: IndicatorColor) -> Self {
        Self {
            color,
            flashing: false,
            flash_count: 1,
            duration_ms: 1000,
            flash_rate: 1,
        }
    }

    pub fn flash(color: IndicatorColor, flash_count: u32) -> Self {
        Self::flash_timed(color, flash_count, 1000, 1)
    }

    pub fn flash_timed(
        color: IndicatorColor,
        flash_count: u32,
        duration_ms: u64,
        flash_rate: u32,
    ) -> Self {
        Self {
            color,
            flashing: true,
            flash_count,
            duration_ms,
            flash_rate,
        }
    }
}

/// Pattern for a status. `last_color` feeds the connecting-state
/// green/amber alternation; every other mapping ignores it.
pub fn pattern_for(status: DeviceStatus, last_color: IndicatorColor) -> IndicatorPattern {
    use DeviceStatus::*;
    use IndicatorColor::*;

    match status {
        // The boot pattern is a red-green-blue sweep; see `StatusLed::render`.
        Booted => IndicatorPattern::flash_timed(Red, 2, 200, 1),

        BleInit => IndicatorPattern::flash(Blue, 2),
        BleConnected => IndicatorPattern::steady(Blue),
        BleDisconnected => IndicatorPattern::flash(Red, 2),
        BleFailed => IndicatorPattern::flash(Red, 3),
        BleSend => IndicatorPattern::flash(Green, 4),
        BleReceive => IndicatorPattern::flash(Green, 4),

        WifiInit => IndicatorPattern::flash(Green, 1),
        WifiConnecting => {
            let color = if last_color == Green { Amber } else { Green };
            IndicatorPattern::flash(color, 1)
        }
        WifiConnected => IndicatorPattern::steady(Green),
        WifiFailed => IndicatorPattern::flash(Red, 3),
        WifiSend => IndicatorPattern::flash(Green, 5),
        WifiReceive => IndicatorPattern::flash(Green, 3),
        WifiConnectionLost => IndicatorPattern::flash_timed(Red, 10, 2000, 10),

        UdpBroadcastSent => IndicatorPattern::flash_timed(Blue, 2, 100, 1),
        UdpBroadcastFailed => IndicatorPattern::flash(Red, 3),
        UdpInvalidArgument => IndicatorPattern::flash(Red, 5),
        UdpUnknownError => IndicatorPattern::flash(Red, 10),
    }
}

/// Three independent binary outputs driving the indicator.
pub trait IndicatorPins {
    fn set(&mut self, red: bool, green: bool, blue: bool);
}

/// The status annunciator: owns the current status, its derived pattern,
/// and the physical pins.
pub struct StatusLed<P: IndicatorPins, C: Clock> {
    pins: P,
    clock: C,
    status: DeviceStatus,
    pattern: IndicatorPattern,
}

impl<P: IndicatorPins, C: Clock> StatusLed<P, C> {
    pub fn new(pins: P, clock: C) -> Self {
        Self {
            pins,
            clock,
            status: DeviceStatus::Booted,
            pattern: pattern_for(DeviceStatus::Booted, IndicatorColor::Red),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn pattern(&self) -> IndicatorPattern {
        self.pattern
    }

    /// Update the status and recompute its pattern. With `render_now` the
    /// new pattern is rendered synchronously; a non-zero `hold` then blocks
    /// the caller so the status stays visible (used before a restart).
    pub fn set_status(&mut self, status: DeviceStatus, render_now: bool, hold: Duration) {
        debug!("status {:?} -> {:?}", self.status, status);
        self.status = status;
        self.pattern = pattern_for(status, self.pattern.color);
        if render_now {
            self.render();
            if !hold.is_zero() {
                self.clock.sleep(hold);
            }
        }
    }

    /// `set_status` with immediate render and no hold, the common case.
    pub fn show(&mut self, status: DeviceStatus) {
        self.set_status(status, true, Duration::ZERO);
    }

    /// Render the current pattern. Steady patterns set the output and
    /// return; flashing patterns block for the full on/off sequence. Safe to
    /// call repeatedly.
    pub fn render(&mut self) {
        if self.status == DeviceStatus::Booted {
            // Power-on sweep: two short flashes of each color in turn.
            for color in [
                IndicatorColor::Red,
                IndicatorColor::Green,
                IndicatorColor::Blue,
            ] {
                self.flash_cycles(color, 2, 200, 1);
            }
            return;
        }

        let pattern = self.pattern;
        if pattern.flashing {
            self.flash_cycles(
                pattern.color,
                pattern.flash_count,
                pattern.duration_ms,
                pattern.flash_rate,
            );
        } else {
            let (r, g, b) = pattern.color.channels();
            self.pins.set(r, g, b);
        }
    }

    /// Turn all channels off.
    pub fn off(&mut self) {
        self.pins.set(false, false, false);
    }

    fn flash_cycles(&mut self, color: IndicatorColor, count: u32, duration_ms: u64, rate: u32) {
        let period = duration_ms / u64::from(rate.max(1));
        let half = Duration::from_millis(period / 2);
        let (r, g, b) = color.channels();
        for _ in 0..count {
            self.pins.set(r, g, b);
            self.clock.sleep(half);
            self.pins.set(false, false, false);
            self.clock.sleep(half);
        }
    }
}

/// Pins that log transitions instead of driving hardware. Used by the host
/// binary, where there is no indicator to drive.
#[derive(Debug, Default)]
pub struct LogPins;

impl IndicatorPins for LogPins {
    fn set(&mut self, red: bool, green: bool, blue: bool) {
        trace!("indicator r={} g={} b={}", red, green, blue);
    }
}

#[cfg(test)]
pub use mock::MockPins;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::MockClock;

    fn led() -> (StatusLed<MockPins, MockClock>, MockPins, MockClock) {
        let pins = MockPins::new();
        let clock = MockClock::new();
        let led = StatusLed::new(pins.clone(), clock.clone());
        (led, pins, clock)
    }

    #[test]
    fn test_steady_render_sets_color_once() {
        let (mut led, pins, clock) = led();
        let before = clock.now();
        led.show(DeviceStatus::WifiConnected);
        assert_eq!(pins.transitions(), vec![(false, true, false)]);
        // A steady render never blocks.
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn test_flashing_render_blocks_for_full_sequence() {
        let (mut led, pins, clock) = led();
        let before = clock.now();
        led.show(DeviceStatus::BleFailed);
        // Three cycles of on+off at 500 ms halves.
        assert_eq!(clock.now() - before, Duration::from_millis(3000));
        let on_count = pins
            .transitions()
            .iter()
            .filter(|&&(r, _, _)| r)
            .count();
        assert_eq!(on_count, 3);
    }

    #[test]
    fn test_hold_blocks_after_render() {
        let (mut led, _pins, clock) = led();
        let before = clock.now();
        led.set_status(DeviceStatus::WifiConnected, true, Duration::from_secs(1));
        assert_eq!(clock.now() - before, Duration::from_secs(1));
    }

    #[test]
    fn test_no_render_when_deferred() {
        let (mut led, pins, _clock) = led();
        led.set_status(DeviceStatus::WifiConnected, false, Duration::ZERO);
        assert!(pins.transitions().is_empty());
        assert_eq!(led.status(), DeviceStatus::WifiConnected);
    }

    #[test]
    fn test_boot_sweep_covers_all_colors() {
        let (mut led, pins, _clock) = led();
        led.show(DeviceStatus::Booted);
        let transitions = pins.transitions();
        assert!(transitions.contains(&(true, false, false)));
        assert!(transitions.contains(&(false, true, false)));
        assert!(transitions.contains(&(false, false, true)));
        // Two flashes per color: 6 on-states, 6 off-states.
        assert_eq!(transitions.len(), 12);
    }

    #[test]
    fn test_connecting_alternates_green_and_amber() {
        let (mut led, _pins, _clock) = led();
        led.show(DeviceStatus::WifiConnecting);
        let first = led.pattern().color;
        led.show(DeviceStatus::WifiConnecting);
        let second = led.pattern().color;
        assert_ne!(first, second);
        assert!(matches!(first, IndicatorColor::Green | IndicatorColor::Amber));
        assert!(matches!(second, IndicatorColor::Green | IndicatorColor::Amber));
    }

    #[test]
    fn test_failure_patterns_are_red() {
        for status in [
            DeviceStatus::BleFailed,
            DeviceStatus::WifiFailed,
            DeviceStatus::WifiConnectionLost,
            DeviceStatus::UdpBroadcastFailed,
            DeviceStatus::UdpInvalidArgument,
            DeviceStatus::UdpUnknownError,
        ] {
            let pattern = pattern_for(status, IndicatorColor::Green);
            assert_eq!(pattern.color, IndicatorColor::Red, "{:?}", status);
            assert!(pattern.flashing, "{:?}", status);
        }
    }

    #[test]
    fn test_error_pulses_distinguished_by_flash_count() {
        let sent = pattern_for(DeviceStatus::UdpBroadcastSent, IndicatorColor::Red);
        let failed = pattern_for(DeviceStatus::UdpBroadcastFailed, IndicatorColor::Red);
        let unknown = pattern_for(DeviceStatus::UdpUnknownError, IndicatorColor::Red);
        assert_eq!(sent.flash_count, 2);
        assert_eq!(failed.flash_count, 3);
        assert_eq!(unknown.flash_count, 10);
    }

    #[test]
    fn test_amber_drives_red_and_green() {
        assert_eq!(IndicatorColor::Amber.channels(), (true, true, false));
    }
}
