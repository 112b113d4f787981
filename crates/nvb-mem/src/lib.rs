//! Pre-sized payload slots for deferred bond writes.
//!
//! A save copies its bytes into a slot before the caller returns; the slot
//! travels with the job and is wiped when the job is done with it. Running
//! out of slots is the allocation failure callers see.

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;
use zeroize::Zeroize;

use nvb_core::{BondError, BondResult, BOND_DATA_LEN, MAX_DEVNAME_LEN};

/// Largest deferred payload: one bond record plus its peer name.
pub const PAYLOAD_SIZE: usize = BOND_DATA_LEN + MAX_DEVNAME_LEN;

type SlotBuf = Box<[u8; PAYLOAD_SIZE]>;

pub struct PayloadPool {
    free: Mutex<Vec<SlotBuf>>,
    capacity: usize,
    low_water: AtomicUsize,
}

/// Bytes owned by one pending job.
pub struct Payload {
    buf: Option<SlotBuf>,
    len: usize,
    pool: Arc<PayloadPool>,
}

impl PayloadPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        let free = (0..capacity).map(|_| Box::new([0u8; PAYLOAD_SIZE])).collect();
        Arc::new(Self {
            free: Mutex::new(free),
            capacity,
            low_water: AtomicUsize::new(capacity),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Fewest free slots seen since the pool was created.
    pub fn low_water(&self) -> usize {
        self.low_water.load(Ordering::Relaxed)
    }

    /// Private copy of `src`.
    pub fn copy_in(self: &Arc<Self>, src: &[u8]) -> BondResult<Payload> {
        self.stage(&[src])
    }

    /// Bond record followed by the peer name, in a single slot.
    pub fn stage_bond(self: &Arc<Self>, record: &[u8], name: &[u8]) -> BondResult<Payload> {
        if record.len() != BOND_DATA_LEN { return Err(BondError::WireFormatError); }
        if name.len() >= MAX_DEVNAME_LEN { return Err(BondError::FieldOverflow); }
        self.stage(&[record, name])
    }

    fn stage(self: &Arc<Self>, parts: &[&[u8]]) -> BondResult<Payload> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        if len > PAYLOAD_SIZE { return Err(BondError::FieldOverflow); }

        let mut buf = self.take()?;
        let mut at = 0;
        for part in parts {
            buf[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        Ok(Payload { buf: Some(buf), len, pool: self.clone() })
    }

    fn take(&self) -> BondResult<SlotBuf> {
        let mut free = self.free.lock();
        let buf = free.pop().ok_or(BondError::AllocationFailure)?;
        self.low_water.fetch_min(free.len(), Ordering::Relaxed);
        Ok(buf)
    }

    // Bytes past `used` were never written and are still zero.
    fn put_back(&self, mut buf: SlotBuf, used: usize) {
        buf[..used].zeroize();
        self.free.lock().push(buf);
    }
}

impl Payload {
    pub fn as_slice(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => &buf[..self.len],
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record and name halves of a payload built by `stage_bond`.
    pub fn bond_parts(&self) -> Option<(&[u8], &[u8])> {
        let bytes = self.as_slice();
        if bytes.len() < BOND_DATA_LEN { return None; }
        Some(bytes.split_at(BOND_DATA_LEN))
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put_back(buf, self.len);
        }
    }
}
