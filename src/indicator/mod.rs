//! Status LED indicator.
//!
//! The pattern is a pure function of the pairing state:
//!
//! | state                                   | pattern      |
//! |-----------------------------------------|--------------|
//! | waiting for confirmation                | `Confirming` |
//! | advertising or waiting for pairing      | `Advertising`|
//! | otherwise                               | `Off`        |
//!
//! While blinking, every half-period tick toggles the LED. The tick that
//! turns the LED off also asks the consumer to re-check advertising, so the
//! blink cadence doubles as the advertising re-evaluation cadence.

#[cfg(feature = "embedded")]
pub mod led;

use embassy_time::Duration;

use crate::config::{ADV_BLINK_OFF_MS, ADV_BLINK_ON_MS, CONFIRM_BLINK_OFF_MS, CONFIRM_BLINK_ON_MS};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlinkPattern {
    #[default]
    Off,
    Advertising,
    Confirming,
}

impl BlinkPattern {
    pub fn for_state(should_advertise: bool, waiting_confirm: bool, waiting_pairing: bool) -> Self {
        if waiting_confirm {
            BlinkPattern::Confirming
        } else if should_advertise || waiting_pairing {
            BlinkPattern::Advertising
        } else {
            BlinkPattern::Off
        }
    }

    pub fn is_blinking(self) -> bool {
        self != BlinkPattern::Off
    }

    pub fn on_time(self) -> Duration {
        match self {
            BlinkPattern::Confirming => Duration::from_millis(CONFIRM_BLINK_ON_MS),
            _ => Duration::from_millis(ADV_BLINK_ON_MS),
        }
    }

    pub fn off_time(self) -> Duration {
        match self {
            BlinkPattern::Confirming => Duration::from_millis(CONFIRM_BLINK_OFF_MS),
            _ => Duration::from_millis(ADV_BLINK_OFF_MS),
        }
    }
}

/// What the LED task must do after a pattern change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PatternChange {
    /// Blinking starts; first tick after this delay.
    Start(Duration),
    /// Blinking stops; drive the LED low and cancel the tick.
    Stop,
    /// Keep the current tick schedule.
    Unchanged,
}

/// Result of one half-period tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tick {
    pub level: bool,
    pub next: Duration,
    pub recheck: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IndicatorDriver {
    pattern: BlinkPattern,
    next_on: bool,
}

impl IndicatorDriver {
    pub const fn new() -> Self {
        Self {
            pattern: BlinkPattern::Off,
            next_on: false,
        }
    }

    pub fn pattern(&self) -> BlinkPattern {
        self.pattern
    }

    pub fn set_pattern(&mut self, pattern: BlinkPattern) -> PatternChange {
        let was_blinking = self.pattern.is_blinking();
        self.pattern = pattern;
        match (was_blinking, pattern.is_blinking()) {
            (false, true) => {
                // LED is dark; the first tick is an off-edge.
                self.next_on = false;
                PatternChange::Start(pattern.on_time())
            }
            (true, false) => PatternChange::Stop,
            _ => PatternChange::Unchanged,
        }
    }

    pub fn on_tick(&mut self) -> Option<Tick> {
        if !self.pattern.is_blinking() {
            return None;
        }
        let tick = if self.next_on {
            Tick {
                level: true,
                next: self.pattern.on_time(),
                recheck: false,
            }
        } else {
            Tick {
                level: false,
                next: self.pattern.off_time(),
                recheck: true,
            }
        };
        self.next_on = !self.next_on;
        Some(tick)
    }
}
