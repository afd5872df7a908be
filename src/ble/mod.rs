//! Bluetooth Low Energy subsystem.
//!
//! The keyboard runs the Nordic SoftDevice S140 in **Peripheral** role:
//!
//! 1. **Connection Table** - fixed set of connected centrals, the one piece
//!    of state the stack callbacks touch directly.
//! 2. **Callbacks** - turns stack notifications into table edits and
//!    mailbox posts.
//! 3. **Advertiser / GATT server / security** (feature `embedded`) - the
//!    SoftDevice-facing glue that produces those notifications.
//!
//! Decisions (advertise or not, confirm or not, which cadence) are made by
//! the consumer loop in `control`.

pub mod callbacks;
pub mod conn_table;

#[cfg(feature = "embedded")]
pub mod advertiser;
#[cfg(feature = "embedded")]
pub mod gatt;
#[cfg(feature = "embedded")]
pub mod radio;
#[cfg(feature = "embedded")]
pub mod security;

pub use callbacks::{Callbacks, StackEvent};
pub use conn_table::{ConnectionSlot, ConnectionTable, ReportProtocol};

/// Opaque identity of a connected central (the SoftDevice connection handle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerId(pub u16);
