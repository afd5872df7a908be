//! Pairing button one-shot debounce.
//!
//! The first edge arms a single delayed re-sample; edges that arrive while
//! that check is in flight are ignored. If the button is still held at the
//! re-sample, it counts as one pairing trigger.

#[derive(Clone, Copy, Debug, Default)]
pub struct PairingTrigger {
    checking: bool,
}

impl PairingTrigger {
    pub const fn new() -> Self {
        Self { checking: false }
    }

    /// Edge interrupt. Returns `true` when the caller must start the
    /// one-shot check timer.
    pub fn on_edge(&mut self) -> bool {
        if self.checking {
            return false;
        }
        self.checking = true;
        true
    }

    /// Check timer expiry with the re-sampled level (`true` = held).
    /// Returns `true` if a pairing trigger should be emitted.
    pub fn on_check(&mut self, asserted: bool) -> bool {
        let fire = self.checking && asserted;
        self.checking = false;
        fire
    }

    pub fn is_checking(&self) -> bool {
        self.checking
    }
}
