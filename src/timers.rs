//! One-shot timers for the pairing window and the fast-mode idle timeout.
//!
//! Each timer is a task waiting on a [`Signal`]. A new command replaces
//! whatever the task was doing, so `start` on a running timer restarts it
//! and `stop` cancels it. On expiry the task clears the running flag and
//! posts its event.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::control::{TimerId, Timers};
use crate::event::{Event, Mailbox};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerCommand {
    Start(Duration),
    Stop,
}

pub struct OneShot {
    control: Signal<CriticalSectionRawMutex, TimerCommand>,
    running: AtomicBool,
}

impl OneShot {
    pub const fn new() -> Self {
        Self {
            control: Signal::new(),
            running: AtomicBool::new(false),
        }
    }

    fn start(&self, after: Duration) {
        self.running.store(true, Ordering::Release);
        self.control.signal(TimerCommand::Start(after));
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.control.signal(TimerCommand::Stop);
    }
}

pub static PAIRING_TIMER: OneShot = OneShot::new();
pub static FAST_MODE_TIMER: OneShot = OneShot::new();

/// [`Timers`] backed by [`oneshot_task`] instances.
pub struct SignalTimers;

impl SignalTimers {
    fn timer(id: TimerId) -> &'static OneShot {
        match id {
            TimerId::PairingTimeout => &PAIRING_TIMER,
            TimerId::FastModeIdle => &FAST_MODE_TIMER,
        }
    }
}

impl Timers for SignalTimers {
    fn start(&mut self, id: TimerId, after: Duration) {
        Self::timer(id).start(after);
    }

    fn stop(&mut self, id: TimerId) {
        Self::timer(id).stop();
    }

    fn is_running(&self, id: TimerId) -> bool {
        Self::timer(id).running.load(Ordering::Acquire)
    }
}

#[embassy_executor::task(pool_size = 2)]
pub async fn oneshot_task(timer: &'static OneShot, expired: Event, mailbox: &'static Mailbox) -> ! {
    loop {
        let mut command = timer.control.wait().await;
        while let TimerCommand::Start(after) = command {
            match select(Timer::after(after), timer.control.wait()).await {
                Either::First(()) => {
                    // A command signalled at the deadline wins over the expiry.
                    if !timer.control.signaled() {
                        timer.running.store(false, Ordering::Release);
                        let _ = mailbox.post(expired);
                    }
                    break;
                }
                Either::Second(next) => command = next,
            }
        }
    }
}
