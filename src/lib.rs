//! Control core for a single-key BLE HID keyboard.
//!
//! Everything that decides (debouncing, the mailbox, the connection table,
//! the advertising/pairing state machine, cadence control, the LED
//! pattern) is plain logic that builds and tests on the host:
//!
//! ```text
//! cargo test                         # host, logs through `log`
//! cargo build --release --features embedded --target thumbv7em-none-eabihf
//! ```
//!
//! The nRF52840 glue (SoftDevice, GPIO tasks, flash bonds) sits behind the
//! `embedded` feature and is driven by `main.rs`.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod ble;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod hid;
pub mod indicator;
pub mod input;
pub mod storage;

#[cfg(feature = "embedded")]
pub mod timers;

pub use error::{Error, RadioError, Result};
pub use event::{Event, Mailbox};
