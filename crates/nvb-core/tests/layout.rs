use nvb_core::{
    check_ediv, AddrType, BondData, BondError, Chip, DeviceName, EncKey, GapAddr, IdKey, Role,
    BOND_DATA_LEN, EDIV_INVALID, MAX_LTK_LEN,
};

fn sample_bond() -> BondData {
    BondData {
        own_enc: EncKey {
            ltk: [0x11; 16],
            lesc: true,
            auth: false,
            ltk_len: 16,
            ediv: 0x1234,
            rand: [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7],
        },
        peer_enc: EncKey {
            ltk: [0x22; 16],
            lesc: false,
            auth: true,
            ltk_len: 7,
            ediv: 0xBEEF,
            rand: [0x01; 8],
        },
        peer_id: IdKey {
            irk: [0x33; 16],
            addr: GapAddr { id_peer: true, addr_type: AddrType::RandomStatic, addr: [1, 2, 3, 4, 5, 6] },
        },
    }
}

#[test]
fn test_bond_data_is_80_bytes() {
    assert_eq!(BOND_DATA_LEN, 80);
    assert_eq!(BondData::SIZE, 80);
}

#[test]
fn test_bond_data_field_offsets() {
    let bond = sample_bond();
    let mut buf = [0u8; BOND_DATA_LEN];
    bond.to_bytes(&mut buf).unwrap();

    // own_enc
    assert_eq!(&buf[0..16], &[0x11; 16]);
    assert_eq!(buf[16], 0x01 | (16 << 2));
    assert_eq!(buf[17], 0);
    assert_eq!(&buf[18..20], &[0x34, 0x12]);
    assert_eq!(buf[20], 0xA0);

    // peer_enc
    assert_eq!(buf[28 + 16], 0x02 | (7 << 2));
    assert_eq!(&buf[28 + 18..28 + 20], &[0xEF, 0xBE]);

    // peer_id
    assert_eq!(&buf[56..72], &[0x33; 16]);
    assert_eq!(buf[72], 0x01 | (0x01 << 1));
    assert_eq!(&buf[73..79], &[1, 2, 3, 4, 5, 6]);
    assert_eq!(buf[79], 0);

    let back = BondData::from_bytes(&buf).unwrap();
    assert_eq!(back, bond);
}

#[test]
fn test_short_buffer_rejected() {
    let bond = sample_bond();
    let mut buf = [0u8; 79];
    assert_eq!(bond.to_bytes(&mut buf), Err(BondError::WireFormatError));
    assert_eq!(BondData::from_bytes(&buf).err(), Some(BondError::WireFormatError));
}

#[test]
fn test_ltk_len_must_fit_six_bits() {
    let mut bond = sample_bond();
    bond.own_enc.ltk_len = MAX_LTK_LEN;
    let mut buf = [0u8; BOND_DATA_LEN];
    bond.to_bytes(&mut buf).unwrap();
    assert_eq!(BondData::from_bytes(&buf).unwrap(), bond);

    // 64 would come back as 0.
    bond.peer_enc.ltk_len = MAX_LTK_LEN + 1;
    let mut untouched = [0xEEu8; BOND_DATA_LEN];
    assert_eq!(bond.to_bytes(&mut untouched), Err(BondError::WireFormatError));
    assert!(untouched.iter().all(|&b| b == 0xEE));
}

#[test]
fn test_sentinel_ediv_rejected() {
    assert_eq!(check_ediv(EDIV_INVALID), Err(BondError::InvalidEdiv));
    assert_eq!(check_ediv(0), Ok(()));
    assert_eq!(check_ediv(0xFFFE), Ok(()));
}

#[test]
fn test_unknown_addr_type_rejected() {
    let mut buf = [0u8; BOND_DATA_LEN];
    sample_bond().to_bytes(&mut buf).unwrap();
    buf[72] = 0x10 << 1;
    assert_eq!(BondData::from_bytes(&buf).err(), Some(BondError::WireFormatError));
}

#[test]
fn test_ediv_follows_role() {
    let bond = sample_bond();
    assert_eq!(bond.ediv_for(Role::Peripheral), 0x1234);
    assert_eq!(bond.ediv_for(Role::Central), 0xBEEF);
}

#[test]
fn test_fallback_name_is_msb_first() {
    let name = DeviceName::from_peer_addr(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    assert_eq!(name.as_str(), Some("06:05:04:03:02:01"));

    let name = DeviceName::from_peer_addr(&[0xab, 0x0c, 0xff, 0x00, 0x10, 0xe1]);
    assert_eq!(name.as_str(), Some("E1:10:00:FF:0C:AB"));
}

#[test]
fn test_name_cut_at_nul_and_truncated() {
    let name = DeviceName::from_bytes(b"Keyboard\0garbage");
    assert_eq!(name.as_bytes(), b"Keyboard");

    let long = [b'x'; 100];
    let name = DeviceName::from_bytes(&long);
    assert_eq!(name.len(), DeviceName::CAPACITY);
    assert_eq!(DeviceName::CAPACITY, 63);
}

#[test]
fn test_gap_addr_display() {
    let addr = GapAddr::new(AddrType::Public, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    assert_eq!(format!("{}", addr), "06:05:04:03:02:01");
}

#[test]
fn test_chip_base_address() {
    assert_eq!(Chip::Nrf52832.bond_flash_addr(), 0x73000);
    assert_eq!(Chip::Nrf52840.bond_flash_addr(), 0xF3000);
    assert_eq!(Chip::default(), Chip::Nrf52832);
}

#[test]
fn test_debug_hides_key_material() {
    let bond = sample_bond();
    let dbg = format!("{:?}", bond);
    assert!(dbg.contains("ediv"));
    assert!(!dbg.contains("ltk:"));
    assert!(!dbg.contains("irk"));
}
