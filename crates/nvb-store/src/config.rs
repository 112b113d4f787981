use nvb_codec::BondLayout;
use nvb_core::{BondError, BondResult, Chip};

/// Deferred saves that may be in flight at once (each holds a payload slot).
pub const DEFAULT_POOL_CAPACITY: usize = 4;
/// Jobs, with or without payload, waiting for the worker.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondConfig {
    pub layout: BondLayout,
    pub pool_capacity: usize,
    pub queue_depth: usize,
}

impl BondConfig {
    pub const fn for_chip(chip: Chip) -> Self {
        Self {
            layout: BondLayout::for_chip(chip),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    pub fn validate(&self) -> BondResult<()> {
        self.layout.validate()?;
        if self.queue_depth == 0 { return Err(BondError::InvalidConfig); }
        Ok(())
    }
}

impl Default for BondConfig {
    fn default() -> Self {
        Self::for_chip(Chip::default())
    }
}
