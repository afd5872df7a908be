//! Integration tests for the smallkb control core.
//!
//! Events travel the same path as on target: inputs and stack callbacks
//! post to the mailbox, the controller drains it, and the fakes record what
//! reached the platform.

use embassy_time::Duration;
use smallkb::ble::{Callbacks, ConnectionTable, PeerId, ReportProtocol, StackEvent};
use smallkb::config::{
    ConnParams, CONN_PARAMS_FAST, CONN_PARAMS_SLOW, DEFAULT_KEYCODE, FAST_MODE_TIMEOUT,
    MAILBOX_CAPACITY, PAIRING_TIMEOUT,
};
use smallkb::control::{should_advertise, Cadence, Controller, Indicator, Radio, TimerId, Timers};
use smallkb::indicator::BlinkPattern;
use smallkb::input::{KeyDebouncer, PairingTrigger};
use smallkb::{Event, Mailbox, RadioError};

const A: PeerId = PeerId(1);
const B: PeerId = PeerId(2);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Start,
    Stop,
    Params(PeerId, ConnParams),
    Confirm(PeerId),
    Report(PeerId, ReportProtocol, Vec<u8>),
}

#[derive(Default)]
struct FakeRadio {
    calls: Vec<Call>,
    live: bool,
}

impl FakeRadio {
    /// A central connecting ends the session, as the SoftDevice does.
    fn end_session(&mut self) {
        self.live = false;
    }

    fn take(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }
}

impl Radio for FakeRadio {
    fn start_advertising(&mut self) -> Result<(), RadioError> {
        self.calls.push(Call::Start);
        self.live = true;
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        self.calls.push(Call::Stop);
        self.live = false;
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.live
    }

    fn update_conn_params(&mut self, peer: PeerId, params: &ConnParams) -> Result<(), RadioError> {
        self.calls.push(Call::Params(peer, *params));
        Ok(())
    }

    fn confirm_passkey(&mut self, peer: PeerId) -> Result<(), RadioError> {
        self.calls.push(Call::Confirm(peer));
        Ok(())
    }

    fn send_report(
        &mut self,
        peer: PeerId,
        protocol: ReportProtocol,
        report: &[u8],
    ) -> Result<(), RadioError> {
        self.calls.push(Call::Report(peer, protocol, report.to_vec()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerCall {
    Start(TimerId, Duration),
    Stop(TimerId),
}

#[derive(Default)]
struct FakeTimers {
    calls: Vec<TimerCall>,
    running: Vec<TimerId>,
}

impl Timers for FakeTimers {
    fn start(&mut self, id: TimerId, after: Duration) {
        self.calls.push(TimerCall::Start(id, after));
        if !self.running.contains(&id) {
            self.running.push(id);
        }
    }

    fn stop(&mut self, id: TimerId) {
        self.calls.push(TimerCall::Stop(id));
        self.running.retain(|t| *t != id);
    }

    fn is_running(&self, id: TimerId) -> bool {
        self.running.contains(&id)
    }
}

#[derive(Default)]
struct FakeIndicator {
    patterns: Vec<BlinkPattern>,
}

impl Indicator for FakeIndicator {
    fn set_pattern(&mut self, pattern: BlinkPattern) {
        self.patterns.push(pattern);
    }
}

type TestController = Controller<'static, FakeRadio, FakeTimers, FakeIndicator>;

struct Rig {
    mailbox: &'static Mailbox,
    callbacks: &'static Callbacks<'static>,
    controller: TestController,
}

impl Rig {
    /// Boot: the first recheck runs with nobody connected.
    fn boot() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let table: &'static ConnectionTable = Box::leak(Box::new(ConnectionTable::new()));
        let mailbox: &'static Mailbox = Box::leak(Box::new(Mailbox::new()));
        let callbacks: &'static Callbacks<'static> =
            Box::leak(Box::new(Callbacks::new(table, mailbox)));
        let mut controller = Controller::new(
            table,
            FakeRadio::default(),
            FakeTimers::default(),
            FakeIndicator::default(),
            DEFAULT_KEYCODE,
        );
        controller.recheck();
        Self {
            mailbox,
            callbacks,
            controller,
        }
    }

    fn post(&self, event: Event) {
        self.mailbox.post(event).unwrap();
    }

    /// The timer fires: it stops running and its event lands in the mailbox.
    fn expire(&mut self, id: TimerId, event: Event) {
        self.controller.timers_mut().running.retain(|t| *t != id);
        self.post(event);
    }

    fn stack(&mut self, event: StackEvent) {
        self.callbacks.dispatch(event);
        self.controller.drain(self.mailbox);
    }

    fn run(&mut self) -> usize {
        self.controller.drain(self.mailbox)
    }

    fn connect(&mut self, peer: PeerId) {
        self.controller.radio_mut().end_session();
        self.stack(StackEvent::Connected(peer));
    }

    fn radio_calls(&mut self) -> Vec<Call> {
        self.controller.radio_mut().take()
    }

    fn starts(&self) -> usize {
        self.controller
            .radio()
            .calls
            .iter()
            .filter(|c| **c == Call::Start)
            .count()
    }
}

/// Drive the debouncer the way the key task does and post what settles.
fn feed_key(debouncer: &mut KeyDebouncer, mailbox: &Mailbox, samples: &[bool]) {
    let mut last = debouncer.is_pressed();
    for &level in samples {
        if level != last {
            debouncer.on_edge();
            last = level;
        }
        if let Some(transition) = debouncer.on_poll(level) {
            mailbox.post(transition.into()).unwrap();
        }
    }
}

#[test]
fn noisy_key_press_reaches_peers_once() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.radio_calls();

    let mut debouncer = KeyDebouncer::new();
    feed_key(
        &mut debouncer,
        rig.mailbox,
        &[true, false, true, true, false, true, true, true, true],
    );
    feed_key(&mut debouncer, rig.mailbox, &[false, true, false, false, false]);
    assert_eq!(rig.run(), 2);

    let reports: Vec<_> = rig
        .radio_calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Report(..)))
        .collect();
    assert_eq!(
        reports,
        vec![
            Call::Report(A, ReportProtocol::Report, vec![0, 0, DEFAULT_KEYCODE, 0, 0, 0, 0, 0]),
            Call::Report(A, ReportProtocol::Report, vec![0; 8]),
        ]
    );
}

#[test]
fn glitch_shorter_than_the_window_is_ignored() {
    let mailbox = Mailbox::new();
    let mut debouncer = KeyDebouncer::new();
    feed_key(&mut debouncer, &mailbox, &[true, false, false, false]);
    assert!(mailbox.is_empty());
    assert!(!debouncer.is_polling());
}

#[test]
fn pairing_button_needs_the_level_held() {
    let mut trigger = PairingTrigger::new();
    assert!(trigger.on_edge());
    assert!(!trigger.on_check(false));

    assert!(trigger.on_edge());
    assert!(trigger.on_check(true));
    assert!(!trigger.is_checking());
}

#[test]
fn advertise_condition_truth_table() {
    assert!(should_advertise(false, false));
    assert!(should_advertise(true, false));
    assert!(should_advertise(true, true));
    assert!(!should_advertise(false, true));
}

#[test]
fn advertising_follows_connection_state() {
    let mut rig = Rig::boot();
    assert_eq!(rig.radio_calls(), vec![Call::Start]);
    assert!(rig.controller.flags().advertising);

    // The session ended with the connection; nothing left to stop.
    rig.connect(A);
    assert!(!rig.controller.flags().advertising);
    assert!(!rig.radio_calls().contains(&Call::Stop));
    assert_eq!(rig.controller.flags().pattern, BlinkPattern::Off);

    rig.stack(StackEvent::Disconnected { peer: A, reason: 0x13 });
    assert_eq!(rig.radio_calls(), vec![Call::Start]);
    assert_eq!(rig.controller.flags().pattern, BlinkPattern::Advertising);
}

#[test]
fn repeated_rechecks_start_advertising_once() {
    let mut rig = Rig::boot();
    for _ in 0..5 {
        rig.post(Event::RecheckAdvertising);
    }
    assert_eq!(rig.run(), 5);
    assert_eq!(rig.starts(), 1);
    assert_eq!(
        rig.controller.indicator().patterns,
        vec![BlinkPattern::Advertising]
    );
}

#[test]
fn pairing_window_times_out() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.radio_calls();

    rig.post(Event::PairingButtonPressed);
    rig.run();
    let flags = rig.controller.flags();
    assert!(flags.waiting_pairing);
    assert!(flags.advertising);
    assert_eq!(rig.radio_calls(), vec![Call::Start]);
    assert!(rig
        .controller
        .timers()
        .calls
        .contains(&TimerCall::Start(TimerId::PairingTimeout, PAIRING_TIMEOUT)));

    // A second press inside the window does not restart it.
    let timer_calls = rig.controller.timers().calls.len();
    rig.post(Event::PairingButtonPressed);
    rig.run();
    assert_eq!(rig.controller.timers().calls.len(), timer_calls);

    rig.expire(TimerId::PairingTimeout, Event::PairingTimeout);
    rig.run();
    let flags = rig.controller.flags();
    assert!(!flags.waiting_pairing);
    assert!(!flags.advertising);
    assert_eq!(rig.radio_calls(), vec![Call::Stop]);
    assert_eq!(flags.pattern, BlinkPattern::Off);
}

#[test]
fn pairing_button_confirms_every_pending_peer() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.connect(B);
    rig.stack(StackEvent::PasskeyConfirm { peer: A, passkey: 123_456 });
    rig.stack(StackEvent::PasskeyConfirm { peer: B, passkey: 654_321 });
    assert!(rig.controller.flags().waiting_confirm);
    assert_eq!(rig.controller.flags().pattern, BlinkPattern::Confirming);
    rig.radio_calls();

    rig.post(Event::PairingButtonPressed);
    rig.run();
    assert_eq!(rig.radio_calls(), vec![Call::Confirm(A), Call::Confirm(B)]);
    let flags = rig.controller.flags();
    assert!(!flags.waiting_confirm);
    // Confirming does not open a pairing window.
    assert!(!flags.waiting_pairing);
    assert_eq!(flags.pattern, BlinkPattern::Off);

    rig.stack(StackEvent::PairingComplete { peer: A, bonded: true });
    assert!(rig.radio_calls().is_empty());
}

#[test]
fn pairing_failure_leaves_every_wait() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.post(Event::PairingButtonPressed);
    rig.run();
    rig.stack(StackEvent::PasskeyConfirm { peer: A, passkey: 1 });
    assert!(rig.controller.flags().waiting_confirm);

    rig.stack(StackEvent::PairingFailed { peer: A, reason: 0x04 });
    let flags = rig.controller.flags();
    assert!(!flags.waiting_confirm);
    assert!(!flags.waiting_pairing);
    assert!(!flags.advertising);
    assert!(rig
        .controller
        .timers()
        .calls
        .ends_with(&[TimerCall::Stop(TimerId::PairingTimeout)]));
    assert!(!rig.radio_calls().iter().any(|c| matches!(c, Call::Confirm(_))));
}

#[test]
fn cadence_switches_once_each_way() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.connect(B);
    rig.expire(TimerId::FastModeIdle, Event::FastModeIdleTimeout);
    rig.run();
    rig.radio_calls();

    rig.post(Event::KeyPressed);
    rig.post(Event::KeyReleased);
    rig.post(Event::KeyPressed);
    rig.run();
    let params: Vec<_> = rig
        .radio_calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Params(..)))
        .collect();
    assert_eq!(
        params,
        vec![
            Call::Params(A, CONN_PARAMS_FAST),
            Call::Params(B, CONN_PARAMS_FAST),
        ]
    );
    assert!(rig
        .controller
        .timers()
        .calls
        .ends_with(&[
            TimerCall::Stop(TimerId::FastModeIdle),
            TimerCall::Start(TimerId::FastModeIdle, FAST_MODE_TIMEOUT),
        ]));

    rig.expire(TimerId::FastModeIdle, Event::FastModeIdleTimeout);
    rig.post(Event::FastModeIdleTimeout);
    rig.run();
    assert_eq!(
        rig.radio_calls(),
        vec![
            Call::Params(A, CONN_PARAMS_SLOW),
            Call::Params(B, CONN_PARAMS_SLOW),
        ]
    );
}

#[test]
fn idle_timeout_queued_before_a_key_press_keeps_fast_cadence() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.expire(TimerId::FastModeIdle, Event::FastModeIdleTimeout);
    rig.run();
    assert_eq!(rig.controller.cadence(), Cadence::Slow);

    rig.post(Event::KeyPressed);
    rig.run();
    assert_eq!(rig.controller.cadence(), Cadence::Fast);
    rig.radio_calls();

    // Fired just before the press re-armed the timer, consumed after it.
    rig.controller.timers_mut().running.retain(|t| *t != TimerId::FastModeIdle);
    rig.post(Event::KeyPressed);
    rig.post(Event::FastModeIdleTimeout);
    rig.run();
    assert_eq!(rig.controller.cadence(), Cadence::Fast);
    assert!(!rig
        .radio_calls()
        .contains(&Call::Params(A, CONN_PARAMS_SLOW)));

    rig.expire(TimerId::FastModeIdle, Event::FastModeIdleTimeout);
    rig.run();
    assert_eq!(rig.controller.cadence(), Cadence::Slow);
}

#[test]
fn boot_protocol_peer_gets_boot_reports() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.connect(B);
    rig.stack(StackEvent::ProtocolMode {
        peer: B,
        protocol: ReportProtocol::Boot,
    });
    rig.radio_calls();

    rig.post(Event::KeyPressed);
    rig.run();
    let targets: Vec<_> = rig
        .radio_calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Report(peer, protocol, _) => Some((peer, protocol)),
            _ => None,
        })
        .collect();
    assert_eq!(
        targets,
        vec![(A, ReportProtocol::Report), (B, ReportProtocol::Boot)]
    );
}

#[test]
fn flooded_mailbox_recovers_on_next_recheck() {
    let mut rig = Rig::boot();
    rig.connect(A);
    rig.radio_calls();

    // Open a pairing window, then flood before the consumer runs.
    rig.post(Event::PairingButtonPressed);
    for _ in 0..MAILBOX_CAPACITY + 5 {
        let _ = rig.mailbox.post(Event::RecheckAdvertising);
    }
    assert_eq!(rig.mailbox.dropped(), 6);
    assert_eq!(rig.run(), MAILBOX_CAPACITY);
    assert_eq!(rig.starts(), 1);

    // The pairing timer still closes the window once the flood is gone.
    rig.expire(TimerId::PairingTimeout, Event::PairingTimeout);
    rig.run();
    assert!(!rig.controller.flags().advertising);

    rig.post(Event::RecheckAdvertising);
    rig.run();
    assert!(rig.radio_calls().ends_with(&[Call::Stop]));
    assert!(rig.mailbox.is_empty());
}
