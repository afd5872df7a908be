//! SoftDevice callback dispatch.
//!
//! The stack notifies us on a context we do not control. Each notification
//! becomes a `StackEvent` and goes through `Callbacks::dispatch`, which is
//! allowed exactly two kinds of side effect: an O(1) connection table edit
//! and a non-blocking mailbox post. Everything else happens on the consumer
//! loop when the posted event is processed.

use crate::ble::conn_table::{ConnectionTable, ReportProtocol};
use crate::ble::PeerId;
use crate::error::Error;
use crate::event::{Event, Mailbox};
use crate::fmt::{info, warn};

/// Notifications delivered by the protocol stack, once per occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackEvent {
    /// A central connected.
    Connected(PeerId),
    /// A connection attempt failed before a link existed (HCI status).
    ConnectFailed(u8),
    /// A central disconnected (HCI reason).
    Disconnected { peer: PeerId, reason: u8 },
    /// Link security level changed. Level 2 and up is encrypted, which
    /// ends a pairing started by `PasskeyConfirm` on that link.
    SecurityChanged { peer: PeerId, level: u8 },
    /// Link security procedure failed.
    SecurityFailed { peer: PeerId, code: u8 },
    /// Numeric comparison: the user must accept `passkey`.
    PasskeyConfirm { peer: PeerId, passkey: u32 },
    /// The pairing procedure was cancelled.
    PairingCancelled(PeerId),
    /// Pairing finished.
    PairingComplete { peer: PeerId, bonded: bool },
    /// Pairing failed with an SMP reason code.
    PairingFailed { peer: PeerId, reason: u8 },
    /// The HID service switched protocol mode for `peer`.
    ProtocolMode { peer: PeerId, protocol: ReportProtocol },
}

/// Handler the stack glue calls for every `StackEvent`.
pub struct Callbacks<'a> {
    table: &'a ConnectionTable,
    mailbox: &'a Mailbox,
}

impl<'a> Callbacks<'a> {
    pub const fn new(table: &'a ConnectionTable, mailbox: &'a Mailbox) -> Self {
        Self { table, mailbox }
    }

    pub fn dispatch(&self, event: StackEvent) {
        match event {
            StackEvent::Connected(peer) => {
                info!("Connected {:?}", peer);
                if let Err(e) = self.table.register(peer) {
                    warn!("No slot for {:?}: {:?}", peer, e);
                    return;
                }
                self.recheck();
            }
            StackEvent::ConnectFailed(code) => {
                warn!("Failed to connect: {:#x}", code);
            }
            StackEvent::Disconnected { peer, reason } => {
                info!("Disconnected from {:?}, reason {:#x}", peer, reason);
                if self.table.is_pending(peer) {
                    info!("Pairing with {:?} dropped with the link", peer);
                    self.reset_pairing();
                }
                if !self.table.unregister(peer) {
                    warn!("Disconnect for unregistered {:?}", peer);
                }
                self.recheck();
            }
            StackEvent::SecurityChanged { peer, level } => {
                info!("Security changed: {:?} level {}", peer, level);
                if level >= 2 && self.table.finish_pairing(peer) {
                    info!("Pairing with {:?} ended by encryption", peer);
                    self.reset_pairing();
                }
            }
            StackEvent::SecurityFailed { peer, code } => {
                warn!("Security failed: {:?} err {}", peer, code);
            }
            StackEvent::PasskeyConfirm { peer, passkey } => {
                info!("Confirm passkey for {:?}: {}", peer, passkey);
                match self.table.mark_pending_confirmation(peer) {
                    Ok(()) => self.recheck(),
                    Err(e) => warn!("Cannot mark {:?} pending: {:?}", peer, e),
                }
            }
            StackEvent::PairingCancelled(peer) => {
                info!("Pairing cancelled: {:?}", peer);
                self.reset_pairing();
            }
            StackEvent::PairingComplete { peer, bonded } => {
                info!("Pairing completed: {:?}, bonded: {}", peer, bonded);
                self.reset_pairing();
            }
            StackEvent::PairingFailed { peer, reason } => {
                warn!("Pairing failed: {:?}, reason {}", peer, reason);
                self.reset_pairing();
            }
            StackEvent::ProtocolMode { peer, protocol } => {
                info!("{:?} entered {:?} mode", peer, protocol);
                if self.table.set_protocol(peer, protocol) == Err(Error::UnknownPeer) {
                    warn!("Cannot find connection for protocol mode change");
                }
            }
        }
    }

    fn recheck(&self) {
        let _ = self.mailbox.post(Event::RecheckAdvertising);
    }

    /// Whatever ended the pairing, no slot may stay pending and the
    /// consumer must leave both pairing waits.
    fn reset_pairing(&self) {
        self.table.cancel_all_pending();
        let _ = self.mailbox.post(Event::PairingReset);
    }
}
