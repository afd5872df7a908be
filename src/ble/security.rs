//! Pairing and bonding.
//!
//! [`Bonder`] is the SoftDevice [`SecurityHandler`]. It advertises
//! display-yes/no IO capability so the host shows a passkey the user
//! accepts with the pairing button, turns the stack's security callbacks
//! into [`StackEvent`]s, and keeps bonds in [`BONDS`] together with each
//! host's GATT system attributes. Flash writes happen in [`bond_task`],
//! woken through [`BOND_SAVE`].

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::gatt_server::{get_sys_attrs, set_sys_attrs};
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{
    Address, AddressType, Connection, EncryptionInfo, IdentityKey, IdentityResolutionKey,
    MasterId, SecurityMode,
};
use nrf_softdevice::{raw, Flash};

use crate::ble::{Callbacks, PeerId, StackEvent};
use crate::fmt::{debug, info, warn};
use crate::storage::{BondRecord, BondStore, SYS_ATTR_MAX};

/// Bonds shared by the security handler and the flash task.
pub static BONDS: Mutex<CriticalSectionRawMutex, RefCell<BondStore>> =
    Mutex::new(RefCell::new(BondStore::new()));

/// Raised whenever [`BONDS`] changes.
pub static BOND_SAVE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub struct Bonder {
    callbacks: &'static Callbacks<'static>,
    /// The passkey callback carries no connection; pairing runs on the most
    /// recent link.
    pairing_peer: Mutex<CriticalSectionRawMutex, Cell<Option<PeerId>>>,
}

impl Bonder {
    pub const fn new(callbacks: &'static Callbacks<'static>) -> Self {
        Self {
            callbacks,
            pairing_peer: Mutex::new(Cell::new(None)),
        }
    }

    pub fn set_pairing_peer(&self, peer: PeerId) {
        self.pairing_peer.lock(|p| p.set(Some(peer)));
    }

    pub fn clear_pairing_peer(&self, peer: PeerId) {
        self.pairing_peer.lock(|p| {
            if p.get() == Some(peer) {
                p.set(None);
            }
        });
    }

    fn pairing_peer(&self) -> Option<PeerId> {
        self.pairing_peer.lock(Cell::get)
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::DisplayYesNo
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        let Some(peer) = self.pairing_peer() else {
            warn!("Passkey without a connection");
            return;
        };
        self.callbacks.dispatch(StackEvent::PasskeyConfirm {
            peer,
            passkey: passkey_value(passkey),
        });
    }

    fn on_security_update(&self, conn: &Connection, security_mode: SecurityMode) {
        if let Some(handle) = conn.handle() {
            self.callbacks.dispatch(StackEvent::SecurityChanged {
                peer: PeerId(handle),
                level: security_level(security_mode),
            });
        }
    }

    fn on_bonded(
        &self,
        conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        debug!("Storing bond for {}", master_id);
        BONDS.lock(|b| b.borrow_mut().upsert(bond_record(&master_id, &key, &peer_id)));
        BOND_SAVE.signal(());

        if let Some(handle) = conn.handle() {
            self.callbacks.dispatch(StackEvent::PairingComplete {
                peer: PeerId(handle),
                bonded: true,
            });
        }
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        BONDS.lock(|b| {
            b.borrow()
                .find_by_master(master_id.ediv, &master_id.rand)
                .map(|r| EncryptionInfo {
                    ltk: r.ltk,
                    flags: r.enc_flags,
                })
        })
    }

    fn save_sys_attrs(&self, conn: &Connection) {
        let addr = conn.peer_address();
        let mut buf = [0u8; SYS_ATTR_MAX];
        let len = match get_sys_attrs(conn, &mut buf) {
            Ok(len) => len,
            Err(e) => {
                warn!("Get system attributes failed: {:?}", e);
                return;
            }
        };
        let changed = BONDS.lock(|b| {
            b.borrow_mut()
                .update_sys_attrs(|r| identity(r).is_match(addr), &buf[..len])
        });
        if changed {
            debug!("System attributes updated, {} bytes", len);
            BOND_SAVE.signal(());
        }
    }

    fn load_sys_attrs(&self, conn: &Connection) {
        let addr = conn.peer_address();
        let mut buf = [0u8; SYS_ATTR_MAX];
        let len = BONDS.lock(|b| {
            let store = b.borrow();
            let saved = store
                .find(|r| identity(r).is_match(addr))
                .and_then(BondRecord::sys_attrs)?;
            buf[..saved.len()].copy_from_slice(saved);
            Some(saved.len())
        });
        info!("Loading system attributes: {}", len.is_some());
        // `None` makes the stack start from its defaults.
        if let Err(e) = set_sys_attrs(conn, len.map(|len| &buf[..len])) {
            warn!("Set system attributes failed: {:?}", e);
        }
    }
}

/// Persist [`BONDS`] whenever the security handler changes it.
#[embassy_executor::task]
pub async fn bond_task(mut flash: Flash) -> ! {
    loop {
        BOND_SAVE.wait().await;
        let mut snapshot = BONDS.lock(|b| b.borrow().clone());
        if snapshot.save_to_flash(&mut flash).await.is_ok() {
            BONDS.lock(|b| b.borrow_mut().mark_clean());
        }
    }
}

/// The SoftDevice hands the passkey over as six ASCII digits.
fn passkey_value(digits: &[u8; 6]) -> u32 {
    digits
        .iter()
        .fold(0, |acc, d| acc * 10 + u32::from(d.wrapping_sub(b'0') % 10))
}

fn security_level(mode: SecurityMode) -> u8 {
    match mode {
        SecurityMode::Open => 1,
        SecurityMode::JustWorks => 2,
        SecurityMode::Mitm => 3,
        SecurityMode::LescMitm => 4,
        _ => 0,
    }
}

fn address_type(t: AddressType) -> u8 {
    match t {
        AddressType::Public => 0,
        AddressType::RandomStatic => 1,
        AddressType::RandomPrivateResolvable => 2,
        AddressType::RandomPrivateNonResolvable => 3,
        AddressType::Anonymous => 4,
    }
}

fn address_type_from(raw: u8) -> AddressType {
    match raw {
        0 => AddressType::Public,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        4 => AddressType::Anonymous,
        _ => AddressType::RandomStatic,
    }
}

fn bond_record(master_id: &MasterId, key: &EncryptionInfo, peer_id: &IdentityKey) -> BondRecord {
    BondRecord {
        ediv: master_id.ediv,
        rand: master_id.rand,
        ltk: key.ltk,
        enc_flags: key.flags,
        irk: peer_id.irk.as_raw().irk,
        addr: peer_id.addr.bytes(),
        addr_type: address_type(peer_id.addr.address_type()),
        ..BondRecord::default()
    }
}

/// Identity of a stored host, for matching a possibly resolvable address.
fn identity(record: &BondRecord) -> IdentityKey {
    IdentityKey {
        irk: IdentityResolutionKey::from_raw(raw::ble_gap_irk_t { irk: record.irk }),
        addr: Address::new(address_type_from(record.addr_type), record.addr),
    }
}
