use nvb_core::{AddrType, BondError, GapAddr, Role, BOND_FLASH_ADDR_NRF52832, BOND_REGION_SIZE};
use nvb_hal::{FlashStorage, GapStack};
use nvb_linux::{FileFlash, HostStack, ERASED};
use nvb_store::{BondConfig, BondManager};
use std::path::PathBuf;

const BASE: u32 = BOND_FLASH_ADDR_NRF52832;

fn image_path(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("nvb-{}-{}.img", tag, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn test_new_image_is_erased() {
    let path = image_path("erased");
    let mut flash = FileFlash::open(&path, BASE, BOND_REGION_SIZE).unwrap();
    assert_eq!(flash.read8(BASE).unwrap(), ERASED);
    assert!(flash.image().iter().all(|&b| b == ERASED));
    // Nothing written, nothing to sync.
    flash.flush().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_flushed_writes_survive_reopen() {
    let path = image_path("flushed");
    {
        let mut flash = FileFlash::open(&path, BASE, BOND_REGION_SIZE).unwrap();
        flash.write(BASE + 10, &[1, 2, 3]).unwrap();
        flash.flush().unwrap();
    }
    let mut flash = FileFlash::open(&path, BASE, BOND_REGION_SIZE).unwrap();
    let mut out = [0u8; 3];
    flash.read(&mut out, BASE + 10).unwrap();
    assert_eq!(out, [1, 2, 3]);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_unflushed_writes_lost_on_reopen() {
    let path = image_path("unflushed");
    {
        let mut flash = FileFlash::open(&path, BASE, BOND_REGION_SIZE).unwrap();
        flash.write(BASE, &[0x50]).unwrap();
        flash.flush().unwrap();
        flash.write(BASE, &[0x00]).unwrap();
        // Dropped before flush.
    }
    let mut flash = FileFlash::open(&path, BASE, BOND_REGION_SIZE).unwrap();
    assert_eq!(flash.read8(BASE).unwrap(), 0x50);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_out_of_range_access() {
    let path = image_path("range");
    let mut flash = FileFlash::open(&path, BASE, BOND_REGION_SIZE).unwrap();
    assert_eq!(flash.write(BASE - 1, &[0]), Err(BondError::StorageIo));
    assert_eq!(flash.write(BASE + BOND_REGION_SIZE - 1, &[0, 0]), Err(BondError::StorageIo));
    assert_eq!(flash.read8(BASE + BOND_REGION_SIZE), Err(BondError::StorageIo));
}

#[test]
fn test_wrong_image_size_rejected() {
    let path = image_path("size");
    std::fs::write(&path, [0u8; 100]).unwrap();
    assert!(FileFlash::open(&path, BASE, BOND_REGION_SIZE).is_err());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_host_stack_attrs() {
    let stack = HostStack::new();
    assert_eq!(stack.sys_attr_len(1, 0), Err(BondError::ProtocolRejection));

    stack.connect(1, Some("Remote"));
    stack.subscribe(1, &[4, 5, 6]);
    assert_eq!(stack.peer_name(1).unwrap().as_str(), Some("Remote"));
    assert_eq!(stack.sys_attr_len(1, 0).unwrap(), 3);

    let mut small = [0u8; 2];
    assert_eq!(stack.sys_attr_get(1, &mut small, 0), Err(BondError::ProtocolRejection));

    stack.sys_attr_clear(1).unwrap();
    assert_eq!(stack.applied_attrs(1), Some(Vec::new()));
}

#[test]
fn test_pairing_never_yields_invalid_ediv() {
    let stack = HostStack::new();
    let peer = GapAddr::new(AddrType::RandomStatic, [1, 2, 3, 4, 5, 0xC6]);
    for _ in 0..64 {
        let bdata = stack.pair(0, peer);
        assert_ne!(bdata.own_enc.ediv, 0xFFFF);
        assert_ne!(bdata.peer_enc.ediv, 0xFFFF);
        assert_eq!(bdata.peer_id.addr, peer);
    }
}

#[test]
fn test_bond_survives_restart() {
    let path = image_path("restart");
    let config = BondConfig::default();
    let peer = GapAddr::new(AddrType::Public, [0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);

    let bdata = {
        let flash = FileFlash::open(&path, config.layout.base, config.layout.region_size).unwrap();
        let stack = HostStack::new();
        stack.connect(0, Some("Keyboard"));
        stack.subscribe(0, &[1, 0, 2, 0]);
        let manager = BondManager::new(flash, stack, config).unwrap();

        let bdata = manager.store().stack().pair(0, peer);
        let ediv = bdata.ediv_for(Role::Peripheral);
        let worker = manager.spawn_worker().unwrap();
        assert!(manager.save_keys(Role::Peripheral, 0, &bdata));
        assert!(manager.save_cccd(Role::Peripheral, 0, ediv));
        worker.shutdown();
        bdata
    };

    // Power cycle.
    let flash = FileFlash::open(&path, config.layout.base, config.layout.region_size).unwrap();
    let stack = HostStack::new();
    stack.connect(7, None);
    let manager = BondManager::new(flash, stack, config).unwrap();
    let ediv = bdata.ediv_for(Role::Peripheral);

    assert_eq!(manager.load_keys(Role::Peripheral, ediv), Some(bdata));
    assert_eq!(manager.load_peer_name().unwrap().as_str(), Some("Keyboard"));
    assert!(manager.load_cccd(Role::Peripheral, 7, ediv));
    assert_eq!(manager.store().stack().applied_attrs(7), Some(vec![1, 0, 2, 0]));
    let _ = std::fs::remove_file(&path);
}
