//! Unified error type for smallkb.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

use core::fmt;

use crate::event::Event;

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Radio
    /// A protocol-stack call failed.
    Radio(RadioError),

    // Input
    /// GPIO or timer backing an input was not available; the input is disabled.
    InputUnavailable(InputKind),

    // Core
    /// The event mailbox was full and the event was dropped.
    MailboxFull(Event),

    /// A connection arrived while every slot was occupied.
    TableFull,

    /// The peer is not registered in the connection table.
    UnknownPeer,

    // Storage
    /// Bond storage could not be read or written.
    Storage,
}

/// Failures reported by the radio transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Advertising is already running. Callers treat this as success.
    AlreadyAdvertising,
    /// Advertising could not be started.
    AdvertiseFailed,
    /// Advertising could not be stopped.
    StopFailed,
    /// Connection parameter update request was rejected.
    ParamUpdate,
    /// Security level request failed.
    Security,
    /// Passkey confirmation reply failed.
    Authorize,
    /// Input report notification failed.
    Notify,
    /// Raw error code from the SoftDevice.
    Raw(u32),
}

/// Which physical input an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputKind {
    Key,
    PairingButton,
    Indicator,
}

// Convenience conversions

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Error::Radio(e)
    }
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::AlreadyAdvertising => f.write_str("advertising already running"),
            RadioError::AdvertiseFailed => f.write_str("advertising start failed"),
            RadioError::StopFailed => f.write_str("advertising stop failed"),
            RadioError::ParamUpdate => f.write_str("connection parameter update failed"),
            RadioError::Security => f.write_str("security request failed"),
            RadioError::Authorize => f.write_str("passkey confirmation failed"),
            RadioError::Notify => f.write_str("report notification failed"),
            RadioError::Raw(code) => write!(f, "softdevice error {:#x}", code),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Radio(e) => write!(f, "radio: {}", e),
            Error::InputUnavailable(kind) => write!(f, "{:?} input unavailable", kind),
            Error::MailboxFull(event) => write!(f, "mailbox full, dropped {:?}", event),
            Error::TableFull => f.write_str("no free connection slot"),
            Error::UnknownPeer => f.write_str("peer not registered"),
            Error::Storage => f.write_str("bond storage access failed"),
        }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
