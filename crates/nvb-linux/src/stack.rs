use std::collections::BTreeMap;

use log::debug;
use rand::{Rng, RngCore};
use spin::Mutex;

use nvb_core::{
    BondData, BondError, BondResult, ConnHandle, DeviceName, Ediv, EncKey, GapAddr, IdKey,
    EDIV_INVALID,
};
use nvb_hal::GapStack;

#[derive(Default)]
struct Link {
    name: Option<DeviceName>,
    attrs: Vec<u8>,
    applied: Option<Vec<u8>>,
}

/// In-process stand-in for the BLE stack: one entry per live connection.
#[derive(Default)]
pub struct HostStack {
    links: Mutex<BTreeMap<ConnHandle, Link>>,
}

impl HostStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, conn: ConnHandle, name: Option<&str>) {
        let link = Link { name: name.map(DeviceName::from), ..Link::default() };
        self.links.lock().insert(conn, link);
        debug!("STACK: conn {} up", conn);
    }

    pub fn disconnect(&self, conn: ConnHandle) {
        self.links.lock().remove(&conn);
    }

    /// What the peer has subscribed to on this link.
    pub fn subscribe(&self, conn: ConnHandle, attrs: &[u8]) {
        if let Some(link) = self.links.lock().get_mut(&conn) {
            link.attrs = attrs.to_vec();
        }
    }

    /// Last attribute set applied to `conn`. `Some(empty)` after a reset.
    pub fn applied_attrs(&self, conn: ConnHandle) -> Option<Vec<u8>> {
        self.links.lock().get(&conn).and_then(|l| l.applied.clone())
    }

    /// Run a simulated pairing with `peer` and return the distributed keys.
    pub fn pair(&self, conn: ConnHandle, peer: GapAddr) -> BondData {
        let mut rng = rand::thread_rng();
        let bdata = BondData {
            own_enc: random_enc_key(&mut rng),
            peer_enc: random_enc_key(&mut rng),
            peer_id: IdKey { irk: rng.gen(), addr: peer },
        };
        debug!("STACK: conn {} paired with {}", conn, peer);
        bdata
    }
}

fn random_enc_key(rng: &mut impl RngCore) -> EncKey {
    let mut key = EncKey { lesc: true, ltk_len: 16, ..EncKey::default() };
    rng.fill_bytes(&mut key.ltk);
    rng.fill_bytes(&mut key.rand);
    key.ediv = loop {
        let ediv: Ediv = rng.gen();
        if ediv != EDIV_INVALID { break ediv; }
    };
    key
}

impl GapStack for HostStack {
    fn peer_name(&self, conn: ConnHandle) -> Option<DeviceName> {
        self.links.lock().get(&conn).and_then(|l| l.name.clone())
    }

    fn sys_attr_len(&self, conn: ConnHandle, _flags: u32) -> BondResult<usize> {
        let links = self.links.lock();
        let link = links.get(&conn).ok_or(BondError::ProtocolRejection)?;
        Ok(link.attrs.len())
    }

    fn sys_attr_get(&self, conn: ConnHandle, buf: &mut [u8], _flags: u32) -> BondResult<usize> {
        let links = self.links.lock();
        let link = links.get(&conn).ok_or(BondError::ProtocolRejection)?;
        let dst = buf.get_mut(..link.attrs.len()).ok_or(BondError::ProtocolRejection)?;
        dst.copy_from_slice(&link.attrs);
        Ok(link.attrs.len())
    }

    fn sys_attr_set(&self, conn: ConnHandle, attrs: Option<&[u8]>, _flags: u32) -> BondResult<()> {
        let mut links = self.links.lock();
        let link = links.get_mut(&conn).ok_or(BondError::ProtocolRejection)?;
        link.applied = Some(attrs.map(|a| a.to_vec()).unwrap_or_default());
        Ok(())
    }
}
