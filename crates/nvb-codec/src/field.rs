//! StoredField: a one byte length prefix followed by that many payload bytes.
//!
//! Fields are laid end to end without a directory, so a later field is found
//! by walking the prefixes in front of it.

use alloc::vec;
use alloc::vec::Vec;
use nvb_core::{BondError, BondResult};
use nvb_hal::FlashStorage;

pub const LEN_PREFIX: usize = 1;

pub const fn encoded_len(payload_len: usize) -> usize {
    LEN_PREFIX + payload_len
}

fn prefix_for(len: usize) -> BondResult<u8> {
    u8::try_from(len).map_err(|_| BondError::FieldOverflow)
}

/// Encode into a RAM buffer. Returns bytes used.
pub fn encode_into(buf: &mut [u8], payload: &[u8]) -> BondResult<usize> {
    let prefix = prefix_for(payload.len())?;
    let total = encoded_len(payload.len());
    if buf.len() < total { return Err(BondError::FieldOverflow); }
    buf[0] = prefix;
    buf[LEN_PREFIX..total].copy_from_slice(payload);
    Ok(total)
}

/// Decode from a RAM buffer. The returned view is exactly `prefix` bytes.
pub fn decode_from(buf: &[u8]) -> BondResult<&[u8]> {
    let (&len, rest) = buf.split_first().ok_or(BondError::WireFormatError)?;
    rest.get(..len as usize).ok_or(BondError::WireFormatError)
}

/// Write `payload` as a field at `addr`. Returns bytes written.
pub fn write_field<F: FlashStorage + ?Sized>(flash: &mut F, addr: u32, payload: &[u8]) -> BondResult<u32> {
    let prefix = prefix_for(payload.len())?;
    let mut n = flash.write8(addr, prefix)?;
    n += flash.write(addr + n as u32, payload)?;

    if n != encoded_len(payload.len()) { return Err(BondError::StorageIo); }
    Ok(n as u32)
}

/// Write text followed by a NUL. The prefix counts the terminator.
pub fn write_cstr_field<F: FlashStorage + ?Sized>(flash: &mut F, addr: u32, text: &[u8]) -> BondResult<u32> {
    let prefix = prefix_for(text.len() + 1)?;
    let mut n = flash.write8(addr, prefix)?;
    n += flash.write(addr + n as u32, text)?;
    n += flash.write8(addr + n as u32, 0)?;

    if n != encoded_len(text.len() + 1) { return Err(BondError::StorageIo); }
    Ok(n as u32)
}

pub fn read_len<F: FlashStorage + ?Sized>(flash: &mut F, addr: u32) -> BondResult<u8> {
    flash.read8(addr)
}

/// Read the field at `addr` into `dst`. Never reads past the prefix.
pub fn read_field<F: FlashStorage + ?Sized>(flash: &mut F, addr: u32, dst: &mut [u8]) -> BondResult<usize> {
    let len = flash.read8(addr)? as usize;
    if len > dst.len() { return Err(BondError::FieldOverflow); }
    flash.read(&mut dst[..len], addr + LEN_PREFIX as u32)?;
    Ok(len)
}

pub fn read_field_vec<F: FlashStorage + ?Sized>(flash: &mut F, addr: u32) -> BondResult<Vec<u8>> {
    let len = flash.read8(addr)? as usize;
    let mut out = vec![0u8; len];
    flash.read(&mut out, addr + LEN_PREFIX as u32)?;
    Ok(out)
}

/// Address of the field that follows the one at `addr`.
pub fn skip_field<F: FlashStorage + ?Sized>(flash: &mut F, addr: u32) -> BondResult<u32> {
    let len = flash.read8(addr)?;
    Ok(addr + encoded_len(len as usize) as u32)
}

/// Zero the prefix. A zero length field reads back as "nothing stored".
pub fn clear_field<F: FlashStorage + ?Sized>(flash: &mut F, addr: u32) -> BondResult<()> {
    flash.write8(addr, 0)?;
    Ok(())
}
