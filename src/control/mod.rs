//! Consumer loop and advertising/pairing state machine.
//!
//! [`Controller`] is the only owner of the mode flags. Everything else
//! reaches it through the [`Mailbox`]: GPIO tasks post key and pairing
//! events, timer tasks post expiries, the stack callbacks post
//! `RecheckAdvertising` / `PairingReset`, and the indicator posts a recheck
//! on every blink off-edge.
//!
//! The platform is reached through three narrow traits so the whole state
//! machine runs on the host against fakes:
//!
//! - [`Radio`]: advertising, connection parameters, passkey replies, reports
//! - [`Timers`]: the pairing window and fast-mode idle one-shots
//! - [`Indicator`]: publishes the blink pattern to the LED task

pub mod speed;

use embassy_time::Duration;

use crate::ble::{ConnectionTable, PeerId, ReportProtocol};
use crate::config::{ConnParams, FAST_MODE_TIMEOUT, PAIRING_TIMEOUT};
use crate::error::RadioError;
use crate::event::{Event, Mailbox};
use crate::fmt::{debug, error, info, warn};
use crate::hid::KeyboardReport;
use crate::indicator::BlinkPattern;

pub use speed::{Cadence, SpeedController};

/// Protocol-stack operations the consumer issues.
pub trait Radio {
    /// Start a connectable advertising session.
    /// `Err(RadioError::AlreadyAdvertising)` counts as success.
    fn start_advertising(&mut self) -> Result<(), RadioError>;

    fn stop_advertising(&mut self) -> Result<(), RadioError>;

    /// Whether the last started session is still running. A session ends on
    /// its own when a central connects.
    fn is_advertising(&self) -> bool;

    fn update_conn_params(&mut self, peer: PeerId, params: &ConnParams) -> Result<(), RadioError>;

    /// Accept the passkey shown for `peer`.
    fn confirm_passkey(&mut self, peer: PeerId) -> Result<(), RadioError>;

    fn send_report(
        &mut self,
        peer: PeerId,
        protocol: ReportProtocol,
        report: &[u8],
    ) -> Result<(), RadioError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    PairingTimeout,
    FastModeIdle,
}

/// One-shot timers that post their expiry event to the mailbox.
pub trait Timers {
    /// (Re)start `id`; a running instance is replaced.
    fn start(&mut self, id: TimerId, after: Duration);
    fn stop(&mut self, id: TimerId);
    /// Armed and not yet fired. An expiry that arrives while this is true
    /// belongs to an earlier arm and is stale.
    fn is_running(&self, id: TimerId) -> bool;
}

/// Sink for the LED pattern.
pub trait Indicator {
    fn set_pattern(&mut self, pattern: BlinkPattern);
}

/// Advertise while the pairing window is open or nobody is connected.
pub fn should_advertise(waiting_pairing: bool, any_connected: bool) -> bool {
    waiting_pairing || !any_connected
}

/// Mode flags owned by the consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeFlags {
    /// Pairing window open; the pairing timer is armed.
    pub waiting_pairing: bool,
    /// At least one slot waits for a passkey confirmation.
    pub waiting_confirm: bool,
    /// An advertising session was started and not yet stopped.
    pub advertising: bool,
    /// Pattern last published to the indicator.
    pub pattern: BlinkPattern,
}

pub struct Controller<'a, R, T, I> {
    table: &'a ConnectionTable,
    radio: R,
    timers: T,
    indicator: I,
    keycode: u8,
    flags: ModeFlags,
    speed: SpeedController,
}

impl<'a, R, T, I> Controller<'a, R, T, I>
where
    R: Radio,
    T: Timers,
    I: Indicator,
{
    pub fn new(table: &'a ConnectionTable, radio: R, timers: T, indicator: I, keycode: u8) -> Self {
        Self {
            table,
            radio,
            timers,
            indicator,
            keycode,
            flags: ModeFlags::default(),
            speed: SpeedController::new(),
        }
    }

    pub fn flags(&self) -> ModeFlags {
        self.flags
    }

    pub fn cadence(&self) -> Cadence {
        self.speed.cadence()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Serve the mailbox forever.
    pub async fn run(&mut self, mailbox: &Mailbox) -> ! {
        loop {
            let event = mailbox.next().await;
            self.handle(event);
        }
    }

    /// Handle every queued event without waiting. Returns how many ran.
    pub fn drain(&mut self, mailbox: &Mailbox) -> usize {
        let mut handled = 0;
        while let Some(event) = mailbox.try_next() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    pub fn handle(&mut self, event: Event) {
        debug!("Event {:?}", event);
        match event {
            Event::PairingButtonPressed => self.on_pairing_trigger(),
            Event::KeyPressed => self.on_key(true),
            Event::KeyReleased => self.on_key(false),
            Event::PairingTimeout if self.timers.is_running(TimerId::PairingTimeout) => {
                debug!("Stale pairing timeout");
            }
            Event::PairingTimeout => {
                if self.flags.waiting_pairing {
                    info!("Pairing timeout");
                    self.flags.waiting_pairing = false;
                    self.recheck();
                }
            }
            Event::RecheckAdvertising => self.recheck(),
            Event::FastModeIdleTimeout if self.timers.is_running(TimerId::FastModeIdle) => {
                debug!("Stale idle timeout, key activity re-armed the timer");
            }
            Event::FastModeIdleTimeout => {
                if let Some(cadence) = self.speed.on_idle_timeout() {
                    let peers = self.table.peers();
                    self.apply_cadence(cadence, &peers);
                }
            }
            Event::PairingReset => {
                // The callback already cleared the table; this catches a
                // confirmation that raced with the reset.
                self.table.cancel_all_pending();
                self.flags.waiting_confirm = false;
                if self.flags.waiting_pairing {
                    self.flags.waiting_pairing = false;
                    self.timers.stop(TimerId::PairingTimeout);
                }
                self.recheck();
            }
        }
    }

    /// Re-derive advertising and the indicator from current state.
    /// Calling it again with nothing changed issues no radio call.
    pub fn recheck(&mut self) {
        self.apply_fresh_params();

        if self.flags.advertising && !self.radio.is_advertising() {
            debug!("Advertising session ended");
            self.flags.advertising = false;
        }
        self.flags.waiting_confirm = self.table.any_pending();

        let any_connected = self.table.any_connected();
        let advertise = should_advertise(self.flags.waiting_pairing, any_connected);
        debug!(
            "Recheck: adv={} pairing={} connected={} confirm={}",
            self.flags.advertising,
            self.flags.waiting_pairing,
            any_connected,
            self.flags.waiting_confirm
        );

        if advertise && !self.flags.advertising {
            self.start_advertising();
        } else if !advertise && self.flags.advertising {
            self.stop_advertising();
        }

        self.refresh_indicator(advertise);
    }

    fn start_advertising(&mut self) {
        match self.radio.start_advertising() {
            Ok(()) => {
                info!("Advertising started");
                self.flags.advertising = true;
            }
            Err(RadioError::AlreadyAdvertising) => {
                info!("Advertising continued");
                self.flags.advertising = true;
            }
            Err(e) => error!("Advertising start failed: {:?}", e),
        }
    }

    fn stop_advertising(&mut self) {
        match self.radio.stop_advertising() {
            Ok(()) => {
                info!("Advertising stopped");
                self.flags.advertising = false;
            }
            Err(e) => error!("Advertising stop failed: {:?}", e),
        }
    }

    fn refresh_indicator(&mut self, advertise: bool) {
        let pattern = BlinkPattern::for_state(
            advertise,
            self.flags.waiting_confirm,
            self.flags.waiting_pairing,
        );
        if pattern != self.flags.pattern {
            debug!("Indicator {:?} -> {:?}", self.flags.pattern, pattern);
            self.flags.pattern = pattern;
            self.indicator.set_pattern(pattern);
        }
    }

    fn on_pairing_trigger(&mut self) {
        self.flags.waiting_confirm = self.table.any_pending();

        if self.flags.waiting_confirm {
            let radio = &mut self.radio;
            let confirmed = self.table.confirm_all(|peer| {
                if let Err(e) = radio.confirm_passkey(peer) {
                    warn!("Passkey confirm for {:?} failed: {:?}", peer, e);
                }
            });
            info!("Confirmed {} pending pairing(s)", confirmed);
            self.flags.waiting_confirm = false;
        } else if !self.flags.waiting_pairing {
            info!("Pairing window open");
            self.flags.waiting_pairing = true;
            self.timers.stop(TimerId::PairingTimeout);
            self.timers.start(TimerId::PairingTimeout, PAIRING_TIMEOUT);
        }

        self.recheck();
    }

    fn on_key(&mut self, pressed: bool) {
        info!(
            "Key {}: {:#x}",
            if pressed { "pressed" } else { "released" },
            self.keycode
        );

        if let Some(cadence) = self.speed.on_activity() {
            let peers = self.table.peers();
            self.apply_cadence(cadence, &peers);
        }
        self.arm_idle_timer();

        self.send_key_report(pressed);
    }

    /// Notify every connected central. The targets are a snapshot taken
    /// under the table lock; the first failure abandons the rest.
    fn send_key_report(&mut self, pressed: bool) {
        let report = KeyboardReport::single_key(self.keycode, pressed).to_bytes();
        for (peer, protocol) in self.table.report_targets() {
            if let Err(e) = self.radio.send_report(peer, protocol, &report) {
                warn!("Report to {:?} ({:?}) failed: {:?}", peer, protocol, e);
                return;
            }
        }
    }

    /// New connections count as activity: they join the fast cadence.
    fn apply_fresh_params(&mut self) {
        let fresh = self.table.take_fresh();
        if fresh.is_empty() {
            return;
        }
        match self.speed.on_activity() {
            Some(cadence) => {
                let peers = self.table.peers();
                self.apply_cadence(cadence, &peers);
            }
            None => {
                let cadence = self.speed.cadence();
                self.apply_cadence(cadence, &fresh);
            }
        }
        self.arm_idle_timer();
    }

    fn apply_cadence(&mut self, cadence: Cadence, peers: &[PeerId]) {
        info!("Fast mode: {}", cadence == Cadence::Fast);
        for &peer in peers {
            if let Err(e) = self.radio.update_conn_params(peer, cadence.params()) {
                warn!("Param update for {:?} failed: {:?}", peer, e);
            }
        }
    }

    fn arm_idle_timer(&mut self) {
        self.timers.stop(TimerId::FastModeIdle);
        self.timers.start(TimerId::FastModeIdle, FAST_MODE_TIMEOUT);
    }
}
