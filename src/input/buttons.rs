//! GPIO tasks for the key and the pairing button.
//!
//! Both inputs are active-low with the internal pull-up. Each task waits
//! for an edge, runs its debounce engine, and posts the result to the
//! mailbox. Neither task ever blocks on the mailbox.

use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_time::{Duration, Ticker, Timer};

use crate::config::{KEY_POLL_INTERVAL_MS, PAIRING_CHECK_DELAY_MS};
use crate::event::{Event, Mailbox};
use crate::fmt::debug;
use crate::input::{KeyDebouncer, PairingTrigger};

/// Key input: an edge starts a 10 ms poller that runs until the level has
/// been stable for the debounce window.
#[embassy_executor::task]
pub async fn key_task(pin: AnyPin, mailbox: &'static Mailbox) -> ! {
    let mut key = Input::new(pin, Pull::Up);
    let mut debouncer = KeyDebouncer::new();

    loop {
        key.wait_for_any_edge().await;
        if !debouncer.on_edge() {
            continue;
        }

        let mut ticker = Ticker::every(Duration::from_millis(KEY_POLL_INTERVAL_MS));
        while debouncer.is_polling() {
            ticker.next().await;
            if let Some(transition) = debouncer.on_poll(key.is_low()) {
                debug!("Key {:?}", transition);
                let _ = mailbox.post(transition.into());
            }
        }
    }
}

/// Pairing button: an edge schedules one re-sample 30 ms later; a button
/// still held at that point is a pairing trigger.
#[embassy_executor::task]
pub async fn pairing_button_task(pin: AnyPin, mailbox: &'static Mailbox) -> ! {
    let mut button = Input::new(pin, Pull::Up);
    let mut trigger = PairingTrigger::new();

    loop {
        button.wait_for_falling_edge().await;
        if !trigger.on_edge() {
            continue;
        }

        Timer::after(Duration::from_millis(PAIRING_CHECK_DELAY_MS)).await;
        if trigger.on_check(button.is_low()) {
            debug!("Pairing button");
            let _ = mailbox.post(Event::PairingButtonPressed);
        }
    }
}
