//! Bond persistence for a single flash page.
//!
//! Key slot and attribute slot live at fixed offsets from the page base (see
//! `nvb_codec::BondLayout`). Saves coming from the BLE event path are handed
//! to the deferred pipeline and written by the worker; loads are synchronous.

#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod config;
pub mod resolve;

pub use config::BondConfig;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, info, warn};
use spin::Mutex;
use zeroize::Zeroizing;

use nvb_codec::{self as codec, BondLayout};
use nvb_core::{
    check_ediv, AddrType, BondData, BondError, BondResult, ConnHandle, DeviceName, Ediv, GapAddr,
    Role, BOND_DATA_LEN, ERASED_PREFIX, MAX_ATTR_LEN, MAX_DEVNAME_LEN,
};
use nvb_dfr::{DeferredQueue, JobContext};
use nvb_hal::{FlashStorage, GapStack, SVC_CONTEXT_FLAGS};
use nvb_mem::PayloadPool;

#[cfg(feature = "std")]
use nvb_dfr::Worker;

/// One line of a bond listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondEntry {
    pub ediv: Ediv,
    pub peer_addr: GapAddr,
    pub name: DeviceName,
}

/// Flash + stack, shared between the manager (loads) and the worker (saves).
///
/// Every write sequence holds the flash lock until its flush returns, so a
/// reader never sees a record without its name or a half cleared page.
pub struct BondStore<F, S> {
    flash: Mutex<F>,
    stack: S,
    layout: BondLayout,
}

impl<F: FlashStorage, S: GapStack> BondStore<F, S> {
    pub fn layout(&self) -> &BondLayout {
        &self.layout
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Raw flash access, for diagnostics.
    pub fn with_flash<R>(&self, f: impl FnOnce(&mut F) -> R) -> R {
        let mut flash = self.flash.lock();
        f(&mut *flash)
    }

    fn commit(flash: &mut F) -> BondResult<()> {
        nb::block!(flash.flush())
    }

    /// Worker half of `save_keys`. Payload: record bytes, then name bytes.
    fn save_keys_dfr(store: &Self, ctx: &JobContext, payload: Option<&[u8]>) {
        let Some(payload) = payload.filter(|p| p.len() >= BOND_DATA_LEN) else {
            warn!("BOND: malformed keys payload, conn {}", ctx.conn_hdl);
            return;
        };
        let (record, name) = payload.split_at(BOND_DATA_LEN);
        let name = DeviceName::from_bytes(name);

        match store.write_keys(record, name.as_bytes()) {
            Ok(()) => info!("BOND: Keys for \"{}\" saved ({:?}, ediv 0x{:04X})", name, ctx.role, ctx.ediv),
            Err(e) => warn!("BOND: Failed to save keys for \"{}\": {}", name, e),
        }
    }

    /// Worker half of `save_cccd`. The blob is pulled from the stack here,
    /// not on the caller's context.
    fn save_cccd_dfr(store: &Self, ctx: &JobContext, _payload: Option<&[u8]>) {
        match store.write_cccd(ctx.conn_hdl) {
            Ok(len) => info!("BOND: CCCD setting saved ({} bytes, ediv 0x{:04X})", len, ctx.ediv),
            Err(e) => warn!("BOND: Failed to save CCCD setting on conn {}: {}", ctx.conn_hdl, e),
        }
    }

    fn write_keys(&self, record: &[u8], name: &[u8]) -> BondResult<()> {
        let mut flash = self.flash.lock();
        let mut addr = self.layout.keys_addr();

        addr += codec::write_field(&mut *flash, addr, record)?;
        codec::write_cstr_field(&mut *flash, addr, name)?;

        Self::commit(&mut flash)
    }

    fn write_cccd(&self, conn: ConnHandle) -> BondResult<usize> {
        // 1. Size, then contents
        let len = self.stack.sys_attr_len(conn, SVC_CONTEXT_FLAGS)?;
        if len > MAX_ATTR_LEN { return Err(BondError::FieldOverflow); }

        let mut attrs = vec![0u8; len];
        let got = self.stack.sys_attr_get(conn, &mut attrs, SVC_CONTEXT_FLAGS)?;
        if got > attrs.len() { return Err(BondError::ProtocolRejection); }
        attrs.truncate(got);

        // 2. Persist
        let mut flash = self.flash.lock();
        codec::write_field(&mut *flash, self.layout.cccd_addr(), &attrs)?;
        Self::commit(&mut flash)?;
        Ok(attrs.len())
    }

    /// Prefix 0 is a cleared slot, `ERASED_PREFIX` one never written.
    fn check_stored_len(flash: &mut F, addr: u32) -> BondResult<usize> {
        match codec::read_len(flash, addr)? {
            0 | ERASED_PREFIX => Err(BondError::NotFound),
            len => Ok(len as usize),
        }
    }

    /// Anything but a full record is foreign data.
    fn check_record_len(flash: &mut F, addr: u32) -> BondResult<()> {
        match Self::check_stored_len(flash, addr)? {
            BOND_DATA_LEN => Ok(()),
            _ => Err(BondError::WireFormatError),
        }
    }

    fn read_keys(&self) -> BondResult<BondData> {
        let mut flash = self.flash.lock();
        let addr = self.layout.keys_addr();
        Self::check_record_len(&mut flash, addr)?;

        let mut raw = Zeroizing::new([0u8; BOND_DATA_LEN]);
        codec::read_field(&mut *flash, addr, &mut raw[..])?;
        BondData::from_bytes(&raw[..])
    }

    fn read_name(&self) -> BondResult<DeviceName> {
        let mut flash = self.flash.lock();
        let keys = self.layout.keys_addr();
        Self::check_record_len(&mut flash, keys)?;

        let name_addr = codec::skip_field(&mut *flash, keys)?;
        let mut raw = [0u8; MAX_DEVNAME_LEN];
        let len = codec::read_field(&mut *flash, name_addr, &mut raw)?;
        if len == 0 { return Err(BondError::NotFound); }
        Ok(DeviceName::from_bytes(&raw[..len]))
    }

    fn read_cccd(&self) -> BondResult<Vec<u8>> {
        let mut flash = self.flash.lock();
        let addr = self.layout.cccd_addr();
        Self::check_stored_len(&mut flash, addr)?;
        codec::read_field_vec(&mut *flash, addr)
    }

    fn clear_slots(&self) -> BondResult<()> {
        let mut flash = self.flash.lock();
        codec::clear_field(&mut *flash, self.layout.keys_addr())?;
        codec::clear_field(&mut *flash, self.layout.cccd_addr())?;
        Self::commit(&mut flash)
    }
}

/// Public bonding contract used by the BLE stack glue.
pub struct BondManager<F, S> {
    store: Arc<BondStore<F, S>>,
    queue: Arc<DeferredQueue<BondStore<F, S>>>,
    pool: Arc<PayloadPool>,
}

impl<F: FlashStorage, S: GapStack> BondManager<F, S> {
    pub fn new(flash: F, stack: S, config: BondConfig) -> BondResult<Self> {
        config.validate()?;

        let pool = PayloadPool::new(config.pool_capacity);
        let queue = DeferredQueue::new(pool.clone(), config.queue_depth);
        let store = Arc::new(BondStore {
            flash: Mutex::new(flash),
            stack,
            layout: config.layout,
        });

        debug!(
            "BOND: page 0x{:05X}, cccd at +{}, {} payload slots",
            config.layout.base, config.layout.cccd_offset, config.pool_capacity
        );
        Ok(Self { store, queue, pool })
    }

    pub fn store(&self) -> &Arc<BondStore<F, S>> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<DeferredQueue<BondStore<F, S>>> {
        &self.queue
    }

    pub fn free_payload_slots(&self) -> usize {
        self.pool.available()
    }

    /// Drain queued writes on the calling context. For targets without a
    /// worker thread, or for tests.
    pub fn process_pending(&self) -> usize {
        self.queue.run_pending(&self.store)
    }

    #[cfg(feature = "std")]
    pub fn spawn_worker(&self) -> std::io::Result<Worker<BondStore<F, S>>>
    where
        F: 'static,
        S: 'static,
    {
        Worker::spawn(self.queue.clone(), self.store.clone())
    }

    /// Queue the bond record and peer name for persistence.
    ///
    /// `true` means accepted, not yet durable. Never touches flash.
    pub fn save_keys(&self, role: Role, conn_hdl: ConnHandle, bdata: &BondData) -> bool {
        let ediv = bdata.ediv_for(role);

        // 1. Resolve a display name, falling back to the peer address
        let name = match self.store.stack.peer_name(conn_hdl) {
            Some(name) if !name.is_empty() => name,
            _ => DeviceName::from_peer_addr(&bdata.peer_addr().addr),
        };

        // 2. Stage record + name in a payload slot
        let mut record = Zeroizing::new([0u8; BOND_DATA_LEN]);
        let staged = bdata
            .to_bytes(&mut record[..])
            .and_then(|()| self.pool.stage_bond(&record[..], name.as_bytes()));
        let payload = match staged {
            Ok(payload) => payload,
            Err(e) => {
                warn!("BOND: keys for \"{}\" not staged: {}", name, e);
                return false;
            }
        };

        // 3. Hand off to the worker
        let ctx = JobContext { role, conn_hdl, ediv };
        match self.queue.enqueue_payload(payload, BondStore::<F, S>::save_keys_dfr, ctx) {
            Ok(()) => {
                debug!("BOND: keys for \"{}\" queued", name);
                true
            }
            Err(e) => {
                warn!("BOND: keys for \"{}\" not queued: {}", name, e);
                false
            }
        }
    }

    /// Read back the stored record.
    ///
    /// Single slot: whatever is stored is returned, `role`/`ediv` are not
    /// matched. `None` for a cleared, erased or unreadable slot.
    pub fn load_keys(&self, role: Role, ediv: Ediv) -> Option<BondData> {
        match self.store.read_keys() {
            Ok(bdata) => {
                if bdata.ediv_for(role) != ediv {
                    debug!("BOND: stored ediv 0x{:04X}, asked for 0x{:04X}", bdata.ediv_for(role), ediv);
                }
                info!("BOND: Keys loaded ({:?})", role);
                Some(bdata)
            }
            Err(BondError::NotFound) => {
                debug!("BOND: Keys not found");
                None
            }
            Err(e) => {
                warn!("BOND: Keys not loaded: {}", e);
                None
            }
        }
    }

    /// Queue a snapshot of the connection's system attributes.
    pub fn save_cccd(&self, role: Role, conn_hdl: ConnHandle, ediv: Ediv) -> bool {
        if let Err(e) = check_ediv(ediv) {
            debug!("BOND: CCCD not saved on conn {}: {}", conn_hdl, e);
            return false;
        }

        let ctx = JobContext { role, conn_hdl, ediv };
        match self.queue.enqueue(None, BondStore::<F, S>::save_cccd_dfr, ctx) {
            Ok(()) => true,
            Err(e) => {
                warn!("BOND: CCCD save not queued: {}", e);
                false
            }
        }
    }

    /// Apply stored system attributes to the live connection.
    ///
    /// On any failure the connection is reset to an empty attribute set and
    /// `false` is returned.
    pub fn load_cccd(&self, role: Role, conn_hdl: ConnHandle, ediv: Ediv) -> bool {
        let applied = self.store.read_cccd().and_then(|attrs| {
            self.store
                .stack
                .sys_attr_set(conn_hdl, Some(&attrs), SVC_CONTEXT_FLAGS)
                .map_err(|_| BondError::ProtocolRejection)
        });

        match applied {
            Ok(()) => {
                info!("BOND: CCCD loaded ({:?}, ediv 0x{:04X})", role, ediv);
                true
            }
            Err(e) => {
                if e == BondError::NotFound {
                    debug!("BOND: CCCD setting not found");
                } else {
                    warn!("BOND: CCCD not applied: {}", e);
                }
                if let Err(e) = self.store.stack.sys_attr_clear(conn_hdl) {
                    warn!("BOND: empty attribute set refused on conn {}: {}", conn_hdl, e);
                }
                false
            }
        }
    }

    /// Name stored next to the record.
    pub fn load_peer_name(&self) -> Option<DeviceName> {
        self.store.read_name().ok()
    }

    /// Occupied slots. At most one entry until bonds get a directory.
    pub fn list_bonds(&self, role: Role) -> Vec<BondEntry> {
        let Ok(bdata) = self.store.read_keys() else {
            return Vec::new();
        };
        let name = self
            .store
            .read_name()
            .unwrap_or_else(|_| DeviceName::from_peer_addr(&bdata.peer_addr().addr));

        vec![BondEntry {
            ediv: bdata.ediv_for(role),
            peer_addr: *bdata.peer_addr(),
            name,
        }]
    }

    pub fn print_list(&self, role: Role) {
        for entry in self.list_bonds(role) {
            info!("  {:04X} : {} [{}]", entry.ediv, entry.name, entry.peer_addr);
        }
    }

    /// Look up a central by the address it is connecting from: identity
    /// address first, then resolvable private address via the stored IRK.
    pub fn find_central_by_address(&self, addr: &GapAddr) -> Option<BondData> {
        let bdata = self.store.read_keys().ok()?;

        if bdata.peer_addr().addr == addr.addr {
            return Some(bdata);
        }
        if addr.addr_type == AddrType::RandomPrivateResolvable
            && resolve::resolve_rpa(&addr.addr, &bdata.peer_id.irk)
        {
            debug!("BOND: {} resolved to {}", addr, bdata.peer_addr());
            return Some(bdata);
        }
        None
    }

    /// Zero both slot prefixes.
    pub fn clear_all(&self) -> bool {
        match self.store.clear_slots() {
            Ok(()) => {
                info!("BOND: all bonds cleared");
                true
            }
            Err(e) => {
                warn!("BOND: clear failed: {}", e);
                false
            }
        }
    }

    /// The single slot is shared by both roles.
    pub fn clear_peripheral(&self) -> bool {
        self.clear_all()
    }

    /// The single slot is shared by both roles.
    pub fn clear_central(&self) -> bool {
        self.clear_all()
    }

    /// Clear the slot only if it holds the bond identified by `role`/`ediv`.
    pub fn remove_key(&self, role: Role, ediv: Ediv) -> bool {
        match self.store.read_keys() {
            Ok(bdata) if bdata.ediv_for(role) == ediv => self.clear_all(),
            _ => {
                debug!("BOND: no {:?} bond with ediv 0x{:04X}", role, ediv);
                false
            }
        }
    }
}
