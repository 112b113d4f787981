#![no_std]
#![forbid(unsafe_code)]

use nvb_core::{BondError, BondResult, ConnHandle, DeviceName};

/// System attributes of the built-in services (GAP/GATT).
pub const SYS_ATTR_FLAG_SYS_SRVCS: u32 = 1 << 0;
/// System attributes of application services.
pub const SYS_ATTR_FLAG_USR_SRVCS: u32 = 1 << 1;
/// Everything a bonded peer subscribed to.
pub const SVC_CONTEXT_FLAGS: u32 = SYS_ATTR_FLAG_SYS_SRVCS | SYS_ATTR_FLAG_USR_SRVCS;

/// Byte addressable non-volatile memory.
///
/// Addresses are absolute. Writes may be cached by the driver; data is only
/// durable once `flush` has returned `Ok`.
pub trait FlashStorage: Send {
    /// Returns the number of bytes written.
    fn write(&mut self, addr: u32, data: &[u8]) -> BondResult<usize>;

    fn read(&mut self, dst: &mut [u8], addr: u32) -> BondResult<()>;

    /// Commit cached writes.
    /// INVARIANT: Must be Non-Blocking. `WouldBlock` while an erase or
    /// program cycle is still running.
    fn flush(&mut self) -> nb::Result<(), BondError>;

    fn write8(&mut self, addr: u32, byte: u8) -> BondResult<usize> {
        self.write(addr, &[byte])
    }

    fn read8(&mut self, addr: u32) -> BondResult<u8> {
        let mut b = [0u8; 1];
        self.read(&mut b, addr)?;
        Ok(b[0])
    }
}

/// The slice of the BLE stack the bond store talks to.
pub trait GapStack: Send + Sync {
    /// Name of the peer on `conn`, if the stack has one cached.
    fn peer_name(&self, conn: ConnHandle) -> Option<DeviceName>;

    /// Size of the system attribute blob for `conn`.
    fn sys_attr_len(&self, conn: ConnHandle, flags: u32) -> BondResult<usize>;

    /// Copies the blob into `buf`, returns its length.
    fn sys_attr_get(&self, conn: ConnHandle, buf: &mut [u8], flags: u32) -> BondResult<usize>;

    /// Applies stored attributes to the live connection. `None` with zero
    /// flags resets the connection to an empty attribute set.
    fn sys_attr_set(&self, conn: ConnHandle, attrs: Option<&[u8]>, flags: u32) -> BondResult<()>;

    fn sys_attr_clear(&self, conn: ConnHandle) -> BondResult<()> {
        self.sys_attr_set(conn, None, 0)
    }
}
