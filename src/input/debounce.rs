//! Key debounce engine.
//!
//! A GPIO edge arms a fixed-interval poller; each poll shifts one raw
//! sample into a short history. When the last `WINDOW` samples agree the
//! key is settled: a changed level emits exactly one transition, an
//! unchanged level (a glitch that bounced back) emits nothing, and either
//! way the poller disarms.

/// Number of consecutive equal samples that make a level stable.
pub const WINDOW: u32 = 3;

const MASK: u8 = (1 << WINDOW) - 1;

/// Debounced key transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyTransition {
    Pressed,
    Released,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct KeyDebouncer {
    history: u8,
    pressed: bool,
    polling: bool,
}

impl KeyDebouncer {
    pub const fn new() -> Self {
        Self {
            history: 0,
            pressed: false,
            polling: false,
        }
    }

    /// Edge interrupt. Returns `true` when the caller must start the poll
    /// timer; overlapping edges while polling return `false`.
    pub fn on_edge(&mut self) -> bool {
        if self.polling {
            return false;
        }
        self.polling = true;
        true
    }

    /// Poll tick with the raw pin level (`true` = key held). Returns the
    /// settled transition, if any. Once this settles `is_polling()` is
    /// `false` and the caller stops the timer.
    pub fn on_poll(&mut self, active: bool) -> Option<KeyTransition> {
        if !self.polling {
            return None;
        }

        self.history = (self.history << 1) | u8::from(active);

        let settled = match self.history & MASK {
            MASK => Some(true),
            0 => Some(false),
            _ => None,
        }?;

        self.polling = false;
        if settled == self.pressed {
            return None;
        }
        self.pressed = settled;
        Some(if settled {
            KeyTransition::Pressed
        } else {
            KeyTransition::Released
        })
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}
