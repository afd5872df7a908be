//! Event mailbox.
//!
//! Every execution context that is not the consumer loop (GPIO edge
//! handlers, timer expiries, SoftDevice callbacks) hands work to the core
//! by posting a one-byte tag here. Posting never blocks: when the queue is
//! full the event is dropped, counted and logged. Dropping is safe because
//! the indicator re-posts `RecheckAdvertising` on every blink, and every
//! other decision is re-derived from current state on the next recheck.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::config::MAILBOX_CAPACITY;
use crate::error::Error;
use crate::fmt::warn;

/// Tagged events consumed by the main loop, in arrival order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Debounced pairing button press.
    PairingButtonPressed,
    /// Debounced key press.
    KeyPressed,
    /// Debounced key release.
    KeyReleased,
    /// The pairing window timer expired.
    PairingTimeout,
    /// Re-evaluate whether to advertise.
    RecheckAdvertising,
    /// No key activity for the fast-mode window.
    FastModeIdleTimeout,
    /// Pairing finished, failed or was cancelled; leave every pairing wait.
    PairingReset,
}

/// Bounded multi-producer, single-consumer event queue.
pub struct Mailbox {
    channel: Channel<CriticalSectionRawMutex, Event, MAILBOX_CAPACITY>,
    dropped: AtomicU32,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue without blocking. Safe from any context.
    pub fn post(&self, event: Event) -> Result<(), Error> {
        match self.channel.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Mailbox full, dropped {:?}", event);
                Err(Error::MailboxFull(event))
            }
        }
    }

    /// Wait for the next event. Only the consumer loop calls this.
    pub async fn next(&self) -> Event {
        self.channel.receive().await
    }

    /// Take the next event if one is queued.
    pub fn try_next(&self) -> Option<Event> {
        self.channel.try_receive().ok()
    }

    /// Number of events dropped on overflow since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_come_out_in_post_order() {
        let mailbox = Mailbox::new();
        mailbox.post(Event::KeyPressed).unwrap();
        mailbox.post(Event::RecheckAdvertising).unwrap();
        mailbox.post(Event::KeyReleased).unwrap();

        assert_eq!(mailbox.try_next(), Some(Event::KeyPressed));
        assert_eq!(mailbox.try_next(), Some(Event::RecheckAdvertising));
        assert_eq!(mailbox.try_next(), Some(Event::KeyReleased));
        assert_eq!(mailbox.try_next(), None);
    }

    #[test]
    fn overflow_drops_newest_and_counts() {
        let mailbox = Mailbox::new();
        for _ in 0..MAILBOX_CAPACITY {
            mailbox.post(Event::RecheckAdvertising).unwrap();
        }

        let err = mailbox.post(Event::PairingTimeout).unwrap_err();
        assert_eq!(err, Error::MailboxFull(Event::PairingTimeout));
        assert_eq!(mailbox.dropped(), 1);
        assert_eq!(mailbox.len(), MAILBOX_CAPACITY);

        // Queued events are untouched by the overflow.
        for _ in 0..MAILBOX_CAPACITY {
            assert_eq!(mailbox.try_next(), Some(Event::RecheckAdvertising));
        }
        assert!(mailbox.is_empty());
    }

    #[test]
    fn mailbox_accepts_posts_again_after_draining() {
        let mailbox = Mailbox::new();
        for _ in 0..MAILBOX_CAPACITY + 3 {
            let _ = mailbox.post(Event::KeyPressed);
        }
        assert_eq!(mailbox.dropped(), 3);

        while mailbox.try_next().is_some() {}
        assert!(mailbox.post(Event::KeyReleased).is_ok());
        assert_eq!(mailbox.try_next(), Some(Event::KeyReleased));
    }
}
