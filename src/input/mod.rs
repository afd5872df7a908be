//! Physical inputs: the keyboard key and the pairing button.
//!
//! ## Components
//!
//! - **Debounce**: shift-register debouncer for the key (press and release)
//! - **Pairing trigger**: one-shot re-sample for the pairing button
//! - **Buttons** (feature `embedded`): async tasks that wait for GPIO edges,
//!   run the engines above, and post the results to the mailbox

pub mod debounce;
pub mod pairing_trigger;

#[cfg(feature = "embedded")]
pub mod buttons;

pub use debounce::{KeyDebouncer, KeyTransition};
pub use pairing_trigger::PairingTrigger;

use crate::event::Event;

impl From<KeyTransition> for Event {
    fn from(t: KeyTransition) -> Self {
        match t {
            KeyTransition::Pressed => Event::KeyPressed,
            KeyTransition::Released => Event::KeyReleased,
        }
    }
}
