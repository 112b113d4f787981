use nvb_store::resolve::{ah, resolve_rpa};

// Bluetooth Core Vol 3 Part H, ah() sample data.
// IRK ec0234a357c8ad05341010a60a397d9b, prand 708194, hash 0dfbaa.
const IRK: [u8; 16] = [
    0x9b, 0x7d, 0x39, 0x0a, 0xa6, 0x10, 0x10, 0x34, 0x05, 0xad, 0xc8, 0x57, 0xa3, 0x34, 0x02, 0xec,
];
const PRAND: [u8; 3] = [0x94, 0x81, 0x70];
const HASH: [u8; 3] = [0xaa, 0xfb, 0x0d];

#[test]
fn test_ah_sample_vector() {
    assert_eq!(ah(&IRK, &PRAND), HASH);
}

#[test]
fn test_resolve_sample_address() {
    let addr = [HASH[0], HASH[1], HASH[2], PRAND[0], PRAND[1], PRAND[2]];
    assert!(resolve_rpa(&addr, &IRK));
}

#[test]
fn test_resolve_rejects_other_irk() {
    let addr = [HASH[0], HASH[1], HASH[2], PRAND[0], PRAND[1], PRAND[2]];
    let mut other = IRK;
    other[0] ^= 0x01;
    assert!(!resolve_rpa(&addr, &other));
}

#[test]
fn test_resolve_requires_rpa_marker_bits() {
    // Same hash, but the top bits say static random (0b11).
    let addr = [HASH[0], HASH[1], HASH[2], PRAND[0], PRAND[1], PRAND[2] | 0xC0];
    assert!(!resolve_rpa(&addr, &IRK));
}
