//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.

use embassy_time::Duration;

// Device

/// Complete local name carried in the scan response.
pub const DEVICE_NAME: &str = "SmallKB";

/// GAP appearance: HID keyboard.
pub const APPEARANCE_KEYBOARD: u16 = 0x03C1;

/// HID usage emitted while the key is held ("a").
pub const DEFAULT_KEYCODE: u8 = 0x04;

/// Wait after power-up before sampling the keycode source.
pub const BOOT_SETTLE_MS: u64 = 100;

// Input

/// Key poll interval while the debouncer is settling.
pub const KEY_POLL_INTERVAL_MS: u64 = 10;

/// Delay between a pairing-button edge and its confirming re-sample.
pub const PAIRING_CHECK_DELAY_MS: u64 = 30;

// Pairing / advertising

/// How long the pairing window stays open after a trigger.
pub const PAIRING_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Advertising interval (in 0.625 ms units). 320 = 200 ms.
pub const ADV_INTERVAL: u32 = 320;

// Indicator

/// LED on/off times while advertising or waiting for a pairing trigger.
pub const ADV_BLINK_ON_MS: u64 = 20;
pub const ADV_BLINK_OFF_MS: u64 = 500;

/// LED on/off times while a passkey confirmation is pending.
pub const CONFIRM_BLINK_ON_MS: u64 = 20;
pub const CONFIRM_BLINK_OFF_MS: u64 = 200;

// Radio cadence

/// Connection parameter set requested from the central.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    /// Minimum connection interval (1.25 ms units).
    pub interval_min: u16,
    /// Maximum connection interval (1.25 ms units).
    pub interval_max: u16,
    /// Peripheral latency (connection events that may be skipped).
    pub latency: u16,
    /// Supervision timeout (10 ms units).
    pub supervision_timeout: u16,
}

/// Parameters while the key is in use: 60-120 ms, latency 2, 20 s timeout.
pub const CONN_PARAMS_FAST: ConnParams = ConnParams {
    interval_min: 0x30,
    interval_max: 0x60,
    latency: 2,
    supervision_timeout: 2000,
};

/// Parameters once idle: 120-240 ms, latency 4, 20 s timeout.
pub const CONN_PARAMS_SLOW: ConnParams = ConnParams {
    interval_min: 96,
    interval_max: 192,
    latency: 4,
    supervision_timeout: 2000,
};

/// Time without key activity before dropping back to the slow cadence.
pub const FAST_MODE_TIMEOUT: Duration = Duration::from_millis(30_000);

// Core

/// Event mailbox depth.
pub const MAILBOX_CAPACITY: usize = 10;

/// Maximum simultaneously connected centrals.
pub const MAX_CONNECTIONS: usize = 2;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   Key button      → P0.11 (active low, pull-up)
//   Pairing button  → P0.12 (active low, pull-up)
//   Status LED      → P0.13 (active high)

// Bond storage

/// Maximum number of bonds kept in RAM and flash.
pub const MAX_BONDS: usize = 4;

/// Flash page index where bond storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for bond storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;
