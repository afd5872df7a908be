//! Status LED task.
//!
//! The consumer publishes a [`BlinkPattern`] through [`LedIndicator`]; this
//! task owns the pin and the half-period schedule, and posts
//! `RecheckAdvertising` on every off-edge.

use core::future::pending;

use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::control::Indicator;
use crate::event::{Event, Mailbox};
use crate::indicator::{BlinkPattern, IndicatorDriver, PatternChange};

/// Latest pattern requested by the consumer.
static PATTERN: Signal<CriticalSectionRawMutex, BlinkPattern> = Signal::new();

/// [`Indicator`] that hands the pattern to [`led_task`].
pub struct LedIndicator;

impl Indicator for LedIndicator {
    fn set_pattern(&mut self, pattern: BlinkPattern) {
        PATTERN.signal(pattern);
    }
}

async fn sleep(next: Option<Duration>) {
    match next {
        Some(after) => Timer::after(after).await,
        None => pending().await,
    }
}

#[embassy_executor::task]
pub async fn led_task(pin: AnyPin, mailbox: &'static Mailbox) -> ! {
    let mut led = Output::new(pin, Level::Low, OutputDrive::Standard);
    let mut driver = IndicatorDriver::new();
    let mut next: Option<Duration> = None;

    loop {
        match select(PATTERN.wait(), sleep(next)).await {
            Either::First(pattern) => match driver.set_pattern(pattern) {
                PatternChange::Start(after) => next = Some(after),
                PatternChange::Stop => {
                    led.set_low();
                    next = None;
                }
                PatternChange::Unchanged => {}
            },
            Either::Second(()) => {
                let Some(tick) = driver.on_tick() else {
                    next = None;
                    continue;
                };
                if tick.level {
                    led.set_high();
                } else {
                    led.set_low();
                }
                if tick.recheck {
                    let _ = mailbox.post(Event::RecheckAdvertising);
                }
                next = Some(tick.next);
            }
        }
    }
}
