//! Radio cadence tracking.
//!
//! One fast/slow flag covers every connection. The controller only reports
//! *transitions*; the consumer turns a transition into parameter requests,
//! so repeated key events never repeat a protocol call.

use crate::config::{ConnParams, CONN_PARAMS_FAST, CONN_PARAMS_SLOW};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cadence {
    Fast,
    #[default]
    Slow,
}

impl Cadence {
    pub fn params(self) -> &'static ConnParams {
        match self {
            Cadence::Fast => &CONN_PARAMS_FAST,
            Cadence::Slow => &CONN_PARAMS_SLOW,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SpeedController {
    cadence: Cadence,
}

impl SpeedController {
    pub const fn new() -> Self {
        Self {
            cadence: Cadence::Slow,
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Key press/release or a new connection. Returns `Some(Fast)` only when
    /// the cadence actually changes.
    pub fn on_activity(&mut self) -> Option<Cadence> {
        self.switch(Cadence::Fast)
    }

    /// Idle timer expiry. Returns `Some(Slow)` only when the cadence
    /// actually changes.
    pub fn on_idle_timeout(&mut self) -> Option<Cadence> {
        self.switch(Cadence::Slow)
    }

    fn switch(&mut self, to: Cadence) -> Option<Cadence> {
        if self.cadence == to {
            return None;
        }
        self.cadence = to;
        Some(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_slow() {
        assert_eq!(SpeedController::new().cadence(), Cadence::Slow);
    }

    #[test]
    fn repeated_activity_switches_once() {
        let mut speed = SpeedController::new();
        assert_eq!(speed.on_activity(), Some(Cadence::Fast));
        assert_eq!(speed.on_activity(), None);
        assert_eq!(speed.on_activity(), None);
        assert_eq!(speed.cadence(), Cadence::Fast);
    }

    #[test]
    fn idle_timeout_drops_back_once() {
        let mut speed = SpeedController::new();
        speed.on_activity();
        assert_eq!(speed.on_idle_timeout(), Some(Cadence::Slow));
        assert_eq!(speed.on_idle_timeout(), None);
    }

    #[test]
    fn idle_timeout_while_slow_is_silent() {
        let mut speed = SpeedController::new();
        assert_eq!(speed.on_idle_timeout(), None);
    }

    #[test]
    fn cadence_maps_to_parameter_sets() {
        assert_eq!(Cadence::Fast.params(), &CONN_PARAMS_FAST);
        assert_eq!(Cadence::Slow.params(), &CONN_PARAMS_SLOW);
        assert!(Cadence::Fast.params().interval_max < Cadence::Slow.params().interval_max);
    }
}
