use nvb_core::{
    BondError, BondResult, Chip, BOND_DATA_LEN, BOND_REGION_SIZE, CCCD_REGION_OFFSET,
    MAX_DEVNAME_LEN, MAX_FIELD_LEN,
};

use crate::field::encoded_len;

/// Placement of the bond slot inside the reserved flash page.
///
/// ```text
/// base + 0           record field   (1 + 80)
/// base + 81          name field     (1 + up to 64)
/// base + cccd_offset attribute field (1 + up to 255)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondLayout {
    pub base: u32,
    pub cccd_offset: u32,
    pub region_size: u32,
}

impl BondLayout {
    /// Worst case footprint of record + name.
    pub const KEY_SLOT_LEN: usize = encoded_len(BOND_DATA_LEN) + encoded_len(MAX_DEVNAME_LEN);
    /// Worst case footprint of the attribute field.
    pub const CCCD_SLOT_LEN: usize = encoded_len(MAX_FIELD_LEN);

    pub const fn for_chip(chip: Chip) -> Self {
        Self {
            base: chip.bond_flash_addr(),
            cccd_offset: CCCD_REGION_OFFSET,
            region_size: BOND_REGION_SIZE,
        }
    }

    pub const fn keys_addr(&self) -> u32 {
        self.base
    }

    pub const fn cccd_addr(&self) -> u32 {
        self.base + self.cccd_offset
    }

    /// The key slot and the attribute slot must never overlap, and both must
    /// fit in the page.
    pub fn validate(&self) -> BondResult<()> {
        if (self.cccd_offset as usize) < Self::KEY_SLOT_LEN {
            return Err(BondError::InvalidLayout);
        }
        if self.cccd_offset as usize + Self::CCCD_SLOT_LEN > self.region_size as usize {
            return Err(BondError::InvalidLayout);
        }
        if self.base.checked_add(self.region_size).is_none() {
            return Err(BondError::InvalidLayout);
        }
        Ok(())
    }

    pub fn contains(&self, addr: u32, len: usize) -> bool {
        let end = addr as u64 + len as u64;
        addr >= self.base && end <= self.base as u64 + self.region_size as u64
    }
}

impl Default for BondLayout {
    fn default() -> Self {
        Self::for_chip(Chip::default())
    }
}
