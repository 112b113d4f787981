//! Resolvable private address check against a stored IRK.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use zeroize::Zeroizing;

/// Random address hash `ah(k, r)`. `irk`, `prand` and the result are LSB
/// first, the order the stack stores them in.
pub fn ah(irk: &[u8; 16], prand: &[u8; 3]) -> [u8; 3] {
    // AES-128 works MSB first: reverse the key, right-align r in a zero block.
    let mut key = Zeroizing::new([0u8; 16]);
    for (dst, src) in key.iter_mut().zip(irk.iter().rev()) {
        *dst = *src;
    }

    let mut block = Block::default();
    for (i, b) in prand.iter().enumerate() {
        block[15 - i] = *b;
    }

    Aes128::new(GenericArray::from_slice(&key[..])).encrypt_block(&mut block);
    [block[15], block[14], block[13]]
}

/// True if `addr` (LSB first) is a resolvable private address generated
/// from `irk`.
pub fn resolve_rpa(addr: &[u8; 6], irk: &[u8; 16]) -> bool {
    // Two most significant bits are 0b01 for an RPA.
    if addr[5] & 0xC0 != 0x40 { return false; }

    let hash = [addr[0], addr[1], addr[2]];
    let prand = [addr[3], addr[4], addr[5]];
    ah(irk, &prand) == hash
}
