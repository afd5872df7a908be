//! Bond persistence.
//!
//! Bonds are kept in RAM as fixed-size [`BondRecord`]s and written to the
//! nRF52840's internal flash through `sequential-storage` as a single map
//! item, so the keyboard reconnects to its hosts after a power cycle. Each
//! record also carries the host's GATT system attributes (CCCD state), so
//! notification subscriptions survive a reconnect.
//!
//! Storage layout (one item under [`KEY_BONDS`]):
//! ```text
//! [count: u8][record 0: 115 bytes][record 1]...
//! record = [ediv: u16 LE][rand: 8][ltk: 16][enc flags: 1][irk: 16][addr: 6][addr type: 1]
//!          [sys attr len: 1][sys attr: 64]
//! ```

use heapless::Vec;

use crate::config::MAX_BONDS;
use crate::fmt::{debug, info, warn};

/// Room for the system attributes of one host.
pub const SYS_ATTR_MAX: usize = 64;

/// Serialized size of one record.
pub const BOND_RECORD_SIZE: usize = 2 + 8 + 16 + 1 + 16 + 6 + 1 + 1 + SYS_ATTR_MAX;

/// Largest serialized store: count byte plus every record.
pub const MAX_STORE_SIZE: usize = 1 + MAX_BONDS * BOND_RECORD_SIZE;

/// Map key of the bond list. Changes with the record layout.
pub const KEY_BONDS: u8 = 0x02;

/// One bonded central: the keys the SoftDevice hands over in `on_bonded`,
/// flattened to plain bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BondRecord {
    pub ediv: u16,
    pub rand: [u8; 8],
    pub ltk: [u8; 16],
    pub enc_flags: u8,
    pub irk: [u8; 16],
    pub addr: [u8; 6],
    pub addr_type: u8,
    pub(crate) sys_attr: [u8; SYS_ATTR_MAX],
    pub(crate) sys_attr_len: u8,
}

impl Default for BondRecord {
    fn default() -> Self {
        Self {
            ediv: 0,
            rand: [0; 8],
            ltk: [0; 16],
            enc_flags: 0,
            irk: [0; 16],
            addr: [0; 6],
            addr_type: 0,
            sys_attr: [0; SYS_ATTR_MAX],
            sys_attr_len: 0,
        }
    }
}

impl BondRecord {
    /// Saved system attributes, `None` until the host has written any.
    pub fn sys_attrs(&self) -> Option<&[u8]> {
        let len = usize::from(self.sys_attr_len);
        (len > 0).then(|| &self.sys_attr[..len])
    }

    /// Replace the system attributes. Returns false if nothing changed or
    /// `data` does not fit.
    pub fn set_sys_attrs(&mut self, data: &[u8]) -> bool {
        if data.len() > SYS_ATTR_MAX {
            warn!("System attributes too long: {}", data.len());
            return false;
        }
        if self.sys_attrs().unwrap_or(&[]) == data {
            return false;
        }
        self.sys_attr[..data.len()].copy_from_slice(data);
        self.sys_attr_len = data.len() as u8;
        true
    }

    /// Whether this record was created for the given master identifier.
    pub fn matches_master(&self, ediv: u16, rand: &[u8; 8]) -> bool {
        self.ediv == ediv && &self.rand == rand
    }

    fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < BOND_RECORD_SIZE {
            return 0;
        }
        buf[0..2].copy_from_slice(&self.ediv.to_le_bytes());
        buf[2..10].copy_from_slice(&self.rand);
        buf[10..26].copy_from_slice(&self.ltk);
        buf[26] = self.enc_flags;
        buf[27..43].copy_from_slice(&self.irk);
        buf[43..49].copy_from_slice(&self.addr);
        buf[49] = self.addr_type;
        buf[50] = self.sys_attr_len;
        buf[51..51 + SYS_ATTR_MAX].copy_from_slice(&self.sys_attr);
        BOND_RECORD_SIZE
    }

    fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < BOND_RECORD_SIZE {
            return None;
        }
        let mut record = Self {
            ediv: u16::from_le_bytes([data[0], data[1]]),
            enc_flags: data[26],
            addr_type: data[49],
            sys_attr_len: data[50].min(SYS_ATTR_MAX as u8),
            ..Self::default()
        };
        record.rand.copy_from_slice(&data[2..10]);
        record.ltk.copy_from_slice(&data[10..26]);
        record.irk.copy_from_slice(&data[27..43]);
        record.addr.copy_from_slice(&data[43..49]);
        record.sys_attr.copy_from_slice(&data[51..51 + SYS_ATTR_MAX]);
        Some(record)
    }
}

/// In-memory bond list, synced with flash.
#[derive(Clone, Debug, Default)]
pub struct BondStore {
    bonds: Vec<BondRecord, MAX_BONDS>,
    /// True if the list differs from flash.
    dirty: bool,
}

impl BondStore {
    pub const fn new() -> Self {
        Self {
            bonds: Vec::new(),
            dirty: false,
        }
    }

    /// Add or refresh a bond. A record with the same master id is replaced;
    /// otherwise the oldest bond is evicted when full.
    pub fn upsert(&mut self, record: BondRecord) {
        if let Some(existing) = self
            .bonds
            .iter_mut()
            .find(|b| b.matches_master(record.ediv, &record.rand))
        {
            *existing = record;
            self.dirty = true;
            debug!("Bond refreshed");
            return;
        }

        if self.bonds.is_full() {
            warn!("Bond store full, evicting oldest");
            self.bonds.remove(0);
        }

        let _ = self.bonds.push(record);
        self.dirty = true;
        info!("Bond added, now storing {}", self.bonds.len());
    }

    pub fn find_by_master(&self, ediv: u16, rand: &[u8; 8]) -> Option<&BondRecord> {
        self.bonds.iter().find(|b| b.matches_master(ediv, rand))
    }

    pub fn find(&self, matches: impl Fn(&BondRecord) -> bool) -> Option<&BondRecord> {
        self.bonds.iter().find(|b| matches(b))
    }

    /// Store system attributes on the first bond `matches` accepts.
    /// Returns true if the store changed and needs saving.
    pub fn update_sys_attrs(&mut self, matches: impl Fn(&BondRecord) -> bool, data: &[u8]) -> bool {
        let Some(bond) = self.bonds.iter_mut().find(|b| matches(b)) else {
            debug!("No bond for system attributes");
            return false;
        };
        let changed = bond.set_sys_attrs(data);
        self.dirty |= changed;
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = &BondRecord> {
        self.bonds.iter()
    }

    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serialize all bonds. Returns the number of bytes written, or 0 if
    /// `buf` is too short.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let total = 1 + self.bonds.len() * BOND_RECORD_SIZE;
        if buf.len() < total {
            return 0;
        }
        buf[0] = self.bonds.len() as u8;
        let mut offset = 1;
        for bond in &self.bonds {
            offset += bond.serialize(&mut buf[offset..]);
        }
        offset
    }

    /// Replace the list with the records in `data`. A truncated tail is
    /// dropped. Returns how many records were loaded.
    pub fn load(&mut self, data: &[u8]) -> usize {
        self.bonds.clear();
        self.dirty = false;
        let Some((&count, mut rest)) = data.split_first() else {
            return 0;
        };
        for _ in 0..count {
            let Some(record) = BondRecord::deserialize(rest) else {
                warn!("Bond data truncated");
                break;
            };
            if self.bonds.push(record).is_err() {
                break;
            }
            rest = &rest[BOND_RECORD_SIZE..];
        }
        self.bonds.len()
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(feature = "embedded")]
mod flash {
    use core::ops::Range;

    use embedded_storage_async::nor_flash::NorFlash;
    use sequential_storage::cache::NoCache;
    use sequential_storage::map::{fetch_item, store_item};

    use super::{BondStore, KEY_BONDS, MAX_STORE_SIZE};
    use crate::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
    use crate::error::Error;
    use crate::fmt::{debug, error, info};

    /// Flash page size for nRF52840 (4 KB).
    const FLASH_PAGE_SIZE: u32 = 4096;

    const STORAGE_RANGE: Range<u32> = (STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE)
        ..((STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE);

    /// Scratch buffer for `sequential-storage`, a little above the item size.
    const SCRATCH_SIZE: usize = MAX_STORE_SIZE + 32;

    impl BondStore {
        /// Load bonds from flash. An empty region is a successful load of
        /// zero bonds.
        pub async fn load_from_flash(&mut self, flash: &mut impl NorFlash) -> Result<usize, Error> {
            let mut buf = [0u8; SCRATCH_SIZE];
            match fetch_item::<u8, &[u8], _>(
                flash,
                STORAGE_RANGE,
                &mut NoCache::new(),
                &mut buf,
                &KEY_BONDS,
            )
            .await
            {
                Ok(Some(data)) => {
                    let loaded = self.load(data);
                    info!("Loaded {} bonds from flash", loaded);
                    Ok(loaded)
                }
                Ok(None) => {
                    info!("No bonds in flash");
                    self.load(&[]);
                    Ok(0)
                }
                Err(e) => {
                    error!("Flash read error: {:?}", defmt::Debug2Format(&e));
                    self.load(&[]);
                    Err(Error::Storage)
                }
            }
        }

        /// Persist the bond list if it changed since the last load or save.
        pub async fn save_to_flash(&mut self, flash: &mut impl NorFlash) -> Result<(), Error> {
            if !self.is_dirty() {
                debug!("BondStore: no changes to save");
                return Ok(());
            }

            let mut buf = [0u8; SCRATCH_SIZE];
            let mut data = [0u8; MAX_STORE_SIZE];
            let len = self.serialize(&mut data);
            let item = &data[..len];

            match store_item::<u8, &[u8], _>(
                flash,
                STORAGE_RANGE,
                &mut NoCache::new(),
                &mut buf,
                &KEY_BONDS,
                &item,
            )
            .await
            {
                Ok(()) => {
                    info!("Saved {} bonds to flash", self.len());
                    self.mark_clean();
                    Ok(())
                }
                Err(e) => {
                    error!("Flash write error: {:?}", defmt::Debug2Format(&e));
                    Err(Error::Storage)
                }
            }
        }
    }
}
