//! Persisted ring of previously paired host addresses
//!
//! The record is three 17-character Bluetooth addresses plus the index of
//! the slot written last:
//!
//! ```text
//! +-------------+-------------+-------------+-------------+
//! | mac[0] 17B  | mac[1] 17B  | mac[2] 17B  | last (1B)   |
//! +-------------+-------------+-------------+-------------+
//! ```
//!
//! It is read and written whole. A new pairing evicts the slot after the
//! last-written one, round robin. Erased storage (all `0xFF`) reads back as
//! an empty ring whose first pairing lands in slot 0.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IwrapError, Result};

/// Number of remembered hosts
pub const PAIRED_DEVICE_SLOTS: usize = 3;

/// `xx:xx:xx:xx:xx:xx`
pub const MAC_LEN: usize = 17;

/// Serialized size of [`PairedDevices`]
pub const RECORD_SIZE: usize = PAIRED_DEVICE_SLOTS * MAC_LEN + 1;

/// Bluetooth device address in the module's textual form
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacAddress([u8; MAC_LEN]);

impl MacAddress {
    /// Slot content of erased storage
    pub const ERASED: Self = Self([0xFF; MAC_LEN]);

    /// Parse the first 17 bytes of `text` as `xx:xx:xx:xx:xx:xx`
    pub fn parse(text: &[u8]) -> Option<Self> {
        let text = text.get(..MAC_LEN)?;
        let well_formed = text.iter().enumerate().all(|(i, &c)| {
            if i % 3 == 2 {
                c == b':'
            } else {
                c.is_ascii_hexdigit()
            }
        });
        if !well_formed {
            return None;
        }
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(text);
        Some(Self(mac))
    }

    pub fn is_valid(&self) -> bool {
        Self::parse(&self.0).is_some()
    }

    pub fn as_bytes(&self) -> &[u8; MAC_LEN] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("<invalid>")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MacAddress {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

/// The persisted pairing ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairedDevices {
    macs: [MacAddress; PAIRED_DEVICE_SLOTS],
    last_paired: u8,
}

impl PairedDevices {
    /// An empty ring
    pub const fn new() -> Self {
        Self {
            macs: [MacAddress::ERASED; PAIRED_DEVICE_SLOTS],
            last_paired: 0xFF,
        }
    }

    /// Address stored in `slot`, if the slot holds one
    pub fn get(&self, slot: usize) -> Option<&MacAddress> {
        self.macs.get(slot).filter(|mac| mac.is_valid())
    }

    /// Slot written by the most recent pairing
    pub fn last_paired(&self) -> Option<usize> {
        let last = self.last_paired as usize;
        (last < PAIRED_DEVICE_SLOTS).then_some(last)
    }

    /// Slot the next pairing will overwrite
    pub fn next_slot(&self) -> usize {
        match self.last_paired() {
            Some(last) => (last + 1) % PAIRED_DEVICE_SLOTS,
            None => 0,
        }
    }

    /// Remember `mac` in the next slot and return that slot
    pub fn record(&mut self, mac: MacAddress) -> usize {
        let slot = self.next_slot();
        self.macs[slot] = mac;
        self.last_paired = slot as u8;
        slot
    }

    /// Encode into the fixed on-storage layout
    pub fn serialize(&self) -> Result<[u8; RECORD_SIZE]> {
        let mut buf = [0u8; RECORD_SIZE];
        let used = postcard::to_slice(self, &mut buf)
            .map_err(|_| IwrapError::Storage)?
            .len();
        if used != RECORD_SIZE {
            return Err(IwrapError::Storage);
        }
        Ok(buf)
    }

    /// Decode the fixed on-storage layout
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        postcard::from_bytes(data).map_err(|_| IwrapError::Storage)
    }
}

impl Default for PairedDevices {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-volatile home of the pairing ring
///
/// Both operations move the whole record and block until the storage is
/// ready; nothing is written outside `commit`.
pub trait PairingStore {
    /// Read the stored ring
    fn load(&mut self) -> Result<PairedDevices>;

    /// Persist `devices`, replacing the stored ring
    fn commit(&mut self, devices: &PairedDevices) -> Result<()>;
}

/// Pairing ring kept in RAM, for boards without spare flash
#[derive(Debug, Default)]
pub struct RamPairingStore {
    devices: PairedDevices,
    commits: usize,
}

impl RamPairingStore {
    pub fn new(devices: PairedDevices) -> Self {
        Self { devices, commits: 0 }
    }

    pub fn devices(&self) -> &PairedDevices {
        &self.devices
    }

    /// Number of commits so far
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl PairingStore for RamPairingStore {
    fn load(&mut self) -> Result<PairedDevices> {
        Ok(self.devices.clone())
    }

    fn commit(&mut self, devices: &PairedDevices) -> Result<()> {
        self.devices = devices.clone();
        self.commits += 1;
        Ok(())
    }
}

#[cfg(feature = "storage")]
pub use flash::FlashPairingStore;

#[cfg(feature = "storage")]
mod flash {
    use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

    use super::{PairedDevices, PairingStore, RECORD_SIZE};
    use crate::error::{IwrapError, Result};

    /// Staging buffer, large enough for the record padded to any write size
    /// up to 64 bytes
    const BUFFER_SIZE: usize = 64;

    /// Pairing ring stored at a fixed, erase-aligned flash offset
    ///
    /// The record owns the whole erase sector starting at `offset`.
    pub struct FlashPairingStore<F> {
        flash: F,
        offset: u32,
    }

    impl<F: NorFlash> FlashPairingStore<F> {
        pub fn new(flash: F, offset: u32) -> Self {
            Self { flash, offset }
        }

        pub fn release(self) -> F {
            self.flash
        }

        fn padded(size: usize) -> usize {
            RECORD_SIZE.div_ceil(size) * size
        }
    }

    impl<F: NorFlash> PairingStore for FlashPairingStore<F> {
        fn load(&mut self) -> Result<PairedDevices> {
            let len = Self::padded(F::READ_SIZE);
            if len > BUFFER_SIZE {
                return Err(IwrapError::Storage);
            }
            let mut buf = [0xFFu8; BUFFER_SIZE];
            self.flash.read(self.offset, &mut buf[..len]).map_err(|_| {
                error!("Pairing store: read at {} failed", self.offset);
                IwrapError::Storage
            })?;
            PairedDevices::deserialize(&buf[..RECORD_SIZE])
        }

        fn commit(&mut self, devices: &PairedDevices) -> Result<()> {
            let len = Self::padded(F::WRITE_SIZE);
            if len > BUFFER_SIZE || self.offset as usize % F::ERASE_SIZE != 0 {
                return Err(IwrapError::Storage);
            }
            let mut buf = [0xFFu8; BUFFER_SIZE];
            buf[..RECORD_SIZE].copy_from_slice(&devices.serialize()?);

            self.flash
                .erase(self.offset, self.offset + F::ERASE_SIZE as u32)
                .map_err(|_| {
                    error!("Pairing store: erase at {} failed", self.offset);
                    IwrapError::Storage
                })?;
            self.flash.write(self.offset, &buf[..len]).map_err(|_| {
                error!("Pairing store: write at {} failed", self.offset);
                IwrapError::Storage
            })?;
            debug!("Pairing store: committed {} bytes", len);
            Ok(())
        }
    }
}
