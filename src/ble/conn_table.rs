//! Connection table.
//!
//! Fixed-capacity registry of connected centrals. This is the only state
//! the SoftDevice callbacks mutate directly, so it sits behind a blocking
//! critical-section mutex.
//!
//! Lock discipline: every method holds the lock for a bounded walk over
//! `MAX_CONNECTIONS` slots and nothing else. Stack calls (passkey replies,
//! parameter updates, notifications) are made on a snapshot after the lock
//! is released.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::ble::PeerId;
use crate::config::MAX_CONNECTIONS;
use crate::error::Error;

/// HID protocol a central selected for its input reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportProtocol {
    /// Boot keyboard input report characteristic.
    Boot,
    /// Report-map input report characteristic.
    #[default]
    Report,
}

/// Peers captured under the lock.
pub type PeerList = Vec<PeerId, MAX_CONNECTIONS>;

/// One connected central. Occupied iff `peer` is `Some`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionSlot {
    pub peer: Option<PeerId>,
    pub protocol: ReportProtocol,
    pub pending_confirm: bool,
    /// A passkey was requested on this link and pairing has not ended.
    pub pairing: bool,
    /// Set on registration, cleared once the cadence controller has sent
    /// this peer its first parameter request.
    pub needs_params: bool,
}

impl ConnectionSlot {
    pub const fn empty() -> Self {
        Self {
            peer: None,
            protocol: ReportProtocol::Report,
            pending_confirm: false,
            pairing: false,
            needs_params: false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.peer.is_some()
    }
}

struct Slots {
    slots: [ConnectionSlot; MAX_CONNECTIONS],
    any_connected: bool,
}

impl Slots {
    fn find(&mut self, peer: PeerId) -> Option<&mut ConnectionSlot> {
        self.slots.iter_mut().find(|s| s.peer == Some(peer))
    }

    fn refresh(&mut self) {
        self.any_connected = self.slots.iter().any(ConnectionSlot::is_occupied);
    }
}

pub struct ConnectionTable {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Slots>>,
}

impl ConnectionTable {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Slots {
                slots: [ConnectionSlot::empty(); MAX_CONNECTIONS],
                any_connected: false,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Slots) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Put `peer` in the first free slot. Registering a peer twice returns
    /// its existing slot.
    pub fn register(&self, peer: PeerId) -> Result<usize, Error> {
        self.with(|t| {
            if let Some(index) = t.slots.iter().position(|s| s.peer == Some(peer)) {
                return Ok(index);
            }
            let index = t
                .slots
                .iter()
                .position(|s| !s.is_occupied())
                .ok_or(Error::TableFull)?;
            t.slots[index] = ConnectionSlot {
                peer: Some(peer),
                protocol: ReportProtocol::Report,
                pending_confirm: false,
                pairing: false,
                needs_params: true,
            };
            t.refresh();
            Ok(index)
        })
    }

    /// Free the slot held by `peer`. Returns `false` if it was not registered.
    pub fn unregister(&self, peer: PeerId) -> bool {
        self.with(|t| {
            let found = match t.find(peer) {
                Some(slot) => {
                    *slot = ConnectionSlot::empty();
                    true
                }
                None => false,
            };
            t.refresh();
            found
        })
    }

    pub fn mark_pending_confirmation(&self, peer: PeerId) -> Result<(), Error> {
        self.with(|t| {
            let slot = t.find(peer).ok_or(Error::UnknownPeer)?;
            slot.pending_confirm = true;
            slot.pairing = true;
            Ok(())
        })
    }

    /// Clear every pending confirmation in one critical section, then call
    /// `authorize` for each peer that was pending. Returns how many were
    /// confirmed.
    ///
    /// No reader can see a table where some pending flags are cleared and
    /// others are not.
    pub fn confirm_all(&self, mut authorize: impl FnMut(PeerId)) -> usize {
        let confirmed = self.with(|t| {
            let mut peers = PeerList::new();
            for slot in t.slots.iter_mut() {
                if let (Some(peer), true) = (slot.peer, slot.pending_confirm) {
                    slot.pending_confirm = false;
                    // Capacity equals slot count.
                    let _ = peers.push(peer);
                }
            }
            peers
        });
        for &peer in &confirmed {
            authorize(peer);
        }
        confirmed.len()
    }

    /// Clear every pending confirmation without authorizing, and end every
    /// pairing in progress. Returns how many confirmations were cleared.
    pub fn cancel_all_pending(&self) -> usize {
        self.with(|t| {
            let mut cleared = 0;
            for slot in t.slots.iter_mut() {
                if slot.pending_confirm {
                    slot.pending_confirm = false;
                    cleared += 1;
                }
                slot.pairing = false;
            }
            cleared
        })
    }

    /// End the pairing a passkey request started on `peer`. Returns false
    /// if none was in progress.
    pub fn finish_pairing(&self, peer: PeerId) -> bool {
        self.with(|t| match t.find(peer) {
            Some(slot) if slot.pairing => {
                slot.pairing = false;
                true
            }
            _ => false,
        })
    }

    pub fn set_protocol(&self, peer: PeerId, protocol: ReportProtocol) -> Result<(), Error> {
        self.with(|t| {
            let slot = t.find(peer).ok_or(Error::UnknownPeer)?;
            slot.protocol = protocol;
            Ok(())
        })
    }

    pub fn any_connected(&self) -> bool {
        self.with(|t| t.any_connected)
    }

    pub fn any_pending(&self) -> bool {
        self.with(|t| t.slots.iter().any(|s| s.is_occupied() && s.pending_confirm))
    }

    pub fn is_pending(&self, peer: PeerId) -> bool {
        self.with(|t| t.find(peer).is_some_and(|s| s.pending_confirm))
    }

    pub fn len(&self) -> usize {
        self.with(|t| t.slots.iter().filter(|s| s.is_occupied()).count())
    }

    pub fn is_empty(&self) -> bool {
        !self.any_connected()
    }

    /// Snapshot of every occupied slot's peer.
    pub fn peers(&self) -> PeerList {
        self.with(|t| t.slots.iter().filter_map(|s| s.peer).collect())
    }

    /// Snapshot of every occupied slot's peer with its report protocol.
    pub fn report_targets(&self) -> Vec<(PeerId, ReportProtocol), MAX_CONNECTIONS> {
        self.with(|t| {
            t.slots
                .iter()
                .filter_map(|s| s.peer.map(|peer| (peer, s.protocol)))
                .collect()
        })
    }

    /// Peers registered since the last call, clearing their marker.
    pub fn take_fresh(&self) -> PeerList {
        self.with(|t| {
            let mut fresh = PeerList::new();
            for slot in t.slots.iter_mut().filter(|s| s.needs_params) {
                slot.needs_params = false;
                if let Some(peer) = slot.peer {
                    let _ = fresh.push(peer);
                }
            }
            fresh
        })
    }

    /// Copy of one slot, for diagnostics and tests.
    pub fn slot(&self, index: usize) -> Option<ConnectionSlot> {
        self.with(|t| t.slots.get(index).copied())
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PeerId = PeerId(1);
    const B: PeerId = PeerId(2);
    const C: PeerId = PeerId(3);

    #[test]
    fn register_takes_first_free_slot() {
        let table = ConnectionTable::new();
        assert!(!table.any_connected());

        assert_eq!(table.register(A), Ok(0));
        assert_eq!(table.register(B), Ok(1));
        assert!(table.any_connected());
        assert_eq!(table.len(), 2);

        assert!(table.unregister(A));
        assert_eq!(table.register(C), Ok(0));
    }

    #[test]
    fn register_twice_keeps_one_slot() {
        let table = ConnectionTable::new();
        assert_eq!(table.register(A), Ok(0));
        assert_eq!(table.register(A), Ok(0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn register_when_full_fails() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.register(B).unwrap();
        assert_eq!(table.register(C), Err(Error::TableFull));
        assert_eq!(table.peers().as_slice(), &[A, B]);
    }

    #[test]
    fn any_connected_tracks_last_unregister() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.register(B).unwrap();

        assert!(table.unregister(A));
        assert!(table.any_connected());
        assert!(table.unregister(B));
        assert!(!table.any_connected());
        assert!(table.is_empty());
    }

    #[test]
    fn unregister_unknown_peer_is_noop() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        assert!(!table.unregister(C));
        assert!(table.any_connected());
    }

    #[test]
    fn confirm_all_clears_and_authorizes_every_pending_peer() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.register(B).unwrap();
        table.mark_pending_confirmation(A).unwrap();
        table.mark_pending_confirmation(B).unwrap();
        assert!(table.any_pending());

        let mut authorized = PeerList::new();
        let count = table.confirm_all(|peer| {
            // Flags are already clear by the time the stack is called.
            assert!(!table.any_pending());
            authorized.push(peer).unwrap();
        });

        assert_eq!(count, 2);
        assert_eq!(authorized.as_slice(), &[A, B]);
        assert!(!table.any_pending());
    }

    #[test]
    fn confirm_all_skips_peers_not_pending() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.register(B).unwrap();
        table.mark_pending_confirmation(B).unwrap();

        let mut authorized = PeerList::new();
        table.confirm_all(|peer| authorized.push(peer).unwrap());
        assert_eq!(authorized.as_slice(), &[B]);
    }

    #[test]
    fn cancel_all_pending_does_not_authorize() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.register(B).unwrap();
        table.mark_pending_confirmation(A).unwrap();
        table.mark_pending_confirmation(B).unwrap();

        assert_eq!(table.cancel_all_pending(), 2);
        assert!(!table.any_pending());
        assert_eq!(table.confirm_all(|_| panic!("nothing to confirm")), 0);
    }

    #[test]
    fn mark_pending_for_unknown_peer_fails() {
        let table = ConnectionTable::new();
        assert_eq!(table.mark_pending_confirmation(A), Err(Error::UnknownPeer));
    }

    #[test]
    fn pending_flag_is_dropped_with_the_slot() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.mark_pending_confirmation(A).unwrap();
        assert!(table.is_pending(A));
        table.unregister(A);
        assert!(!table.is_pending(A));
        assert!(!table.any_pending());
        assert_eq!(table.slot(0), Some(ConnectionSlot::empty()));
    }

    #[test]
    fn protocol_is_tracked_per_slot() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.register(B).unwrap();
        table.set_protocol(B, ReportProtocol::Boot).unwrap();

        assert_eq!(
            table.report_targets().as_slice(),
            &[(A, ReportProtocol::Report), (B, ReportProtocol::Boot)]
        );
        assert_eq!(table.set_protocol(C, ReportProtocol::Boot), Err(Error::UnknownPeer));
    }

    #[test]
    fn fresh_peers_are_reported_once() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        assert_eq!(table.take_fresh().as_slice(), &[A]);
        assert!(table.take_fresh().is_empty());

        table.register(B).unwrap();
        assert_eq!(table.take_fresh().as_slice(), &[B]);
    }

    #[test]
    fn pairing_ends_once_and_with_any_reset() {
        let table = ConnectionTable::new();
        table.register(A).unwrap();
        table.register(B).unwrap();
        assert!(!table.finish_pairing(A));

        table.mark_pending_confirmation(A).unwrap();
        table.confirm_all(|_| {});
        // Confirming leaves the pairing running until the link encrypts.
        assert!(table.finish_pairing(A));
        assert!(!table.finish_pairing(A));

        table.mark_pending_confirmation(B).unwrap();
        assert_eq!(table.cancel_all_pending(), 1);
        assert!(!table.finish_pairing(B));
    }
}
