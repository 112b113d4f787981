#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

use core::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bond page on nRF52832 (below the bootloader).
pub const BOND_FLASH_ADDR_NRF52832: u32 = 0x73000;
/// Bond page on nRF52840.
pub const BOND_FLASH_ADDR_NRF52840: u32 = 0xF3000;

/// One flash page is reserved for bonding.
pub const BOND_REGION_SIZE: u32 = 4096;

/// System attributes sit at a fixed offset past the key slot.
pub const CCCD_REGION_OFFSET: u32 = 256;

pub const ENC_KEY_LEN: usize = 28;
pub const ID_KEY_LEN: usize = 24;
pub const BOND_DATA_LEN: usize = 2 * ENC_KEY_LEN + ID_KEY_LEN;

/// Peer name buffer, terminator included.
pub const MAX_DEVNAME_LEN: usize = 64;

/// Every stored field carries a one byte length prefix.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// Prefix read back from a field that was never written.
pub const ERASED_PREFIX: u8 = 0xFF;

/// Longest attribute blob that can be stored. One below `MAX_FIELD_LEN` so a
/// stored prefix is never mistaken for erased flash.
pub const MAX_ATTR_LEN: usize = MAX_FIELD_LEN - 1;

/// Largest `EncKey::ltk_len`; the field is 6 bits wide on media.
pub const MAX_LTK_LEN: u8 = 0x3F;

/// EDIV reported by the stack for a link that is not bonded.
pub const EDIV_INVALID: Ediv = 0xFFFF;

/// Rejects the "not bonded" sentinel.
pub fn check_ediv(ediv: Ediv) -> BondResult<()> {
    if ediv == EDIV_INVALID { Err(BondError::InvalidEdiv) } else { Ok(()) }
}

pub type ConnHandle = u16;
pub type Ediv = u16;

/// Target silicon. Only the bond page address differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chip {
    #[default]
    Nrf52832,
    Nrf52840,
}

impl Chip {
    pub const fn bond_flash_addr(self) -> u32 {
        match self {
            Chip::Nrf52832 => BOND_FLASH_ADDR_NRF52832,
            Chip::Nrf52840 => BOND_FLASH_ADDR_NRF52840,
        }
    }
}

/// GAP role of the local device on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    Peripheral = 1,
    Central = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AddrType {
    #[default]
    Public = 0x00,
    RandomStatic = 0x01,
    RandomPrivateResolvable = 0x02,
    RandomPrivateNonResolvable = 0x03,
    Anonymous = 0x7F,
}

impl AddrType {
    pub fn from_u8(raw: u8) -> BondResult<Self> {
        match raw {
            0x00 => Ok(AddrType::Public),
            0x01 => Ok(AddrType::RandomStatic),
            0x02 => Ok(AddrType::RandomPrivateResolvable),
            0x03 => Ok(AddrType::RandomPrivateNonResolvable),
            0x7F => Ok(AddrType::Anonymous),
            _ => Err(BondError::WireFormatError),
        }
    }
}

/// Bluetooth device address. `addr` is LSB first, as the stack hands it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Zeroize)]
pub struct GapAddr {
    pub id_peer: bool,
    #[zeroize(skip)]
    pub addr_type: AddrType,
    pub addr: [u8; 6],
}

impl GapAddr {
    pub const fn new(addr_type: AddrType, addr: [u8; 6]) -> Self {
        Self { id_peer: false, addr_type, addr }
    }
}

impl fmt::Display for GapAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.addr;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a[5], a[4], a[3], a[2], a[1], a[0])
    }
}

/// Encryption key set (LTK + master identification).
#[derive(Clone, Default, PartialEq, Eq, Zeroize)]
pub struct EncKey {
    pub ltk: [u8; 16],
    pub lesc: bool,
    pub auth: bool,
    /// At most `MAX_LTK_LEN`.
    pub ltk_len: u8,
    pub ediv: Ediv,
    pub rand: [u8; 8],
}

impl EncKey {
    pub const SIZE: usize = ENC_KEY_LEN;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..16].copy_from_slice(&self.ltk);
        buf[16] = (self.lesc as u8) | ((self.auth as u8) << 1) | (self.ltk_len << 2);
        buf[17] = 0;
        buf[18..20].copy_from_slice(&self.ediv.to_le_bytes());
        buf[20..28].copy_from_slice(&self.rand);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut key = Self::default();
        key.ltk.copy_from_slice(&buf[0..16]);
        key.lesc = buf[16] & 0x01 != 0;
        key.auth = buf[16] & 0x02 != 0;
        key.ltk_len = buf[16] >> 2;
        key.ediv = u16::from_le_bytes([buf[18], buf[19]]);
        key.rand.copy_from_slice(&buf[20..28]);
        key
    }
}

// Key bytes stay out of logs.
impl fmt::Debug for EncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncKey")
            .field("ediv", &self.ediv)
            .field("ltk_len", &self.ltk_len)
            .field("lesc", &self.lesc)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// Identity information: IRK plus identity address.
#[derive(Clone, Default, PartialEq, Eq, Zeroize)]
pub struct IdKey {
    pub irk: [u8; 16],
    pub addr: GapAddr,
}

impl IdKey {
    pub const SIZE: usize = ID_KEY_LEN;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..16].copy_from_slice(&self.irk);
        buf[16] = (self.addr.id_peer as u8) | ((self.addr.addr_type as u8) << 1);
        buf[17..23].copy_from_slice(&self.addr.addr);
        buf[23] = 0;
    }

    fn read_from(buf: &[u8]) -> BondResult<Self> {
        let mut key = Self::default();
        key.irk.copy_from_slice(&buf[0..16]);
        key.addr.id_peer = buf[16] & 0x01 != 0;
        key.addr.addr_type = AddrType::from_u8(buf[16] >> 1)?;
        key.addr.addr.copy_from_slice(&buf[17..23]);
        Ok(key)
    }
}

impl fmt::Debug for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdKey").field("addr", &self.addr).finish_non_exhaustive()
    }
}

/// Security material exchanged during bonding. Fixed size on media.
#[derive(Debug, Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BondData {
    pub own_enc: EncKey,
    pub peer_enc: EncKey,
    pub peer_id: IdKey,
}

impl BondData {
    pub const SIZE: usize = BOND_DATA_LEN;

    /// The EDIV that identifies this bond from the local role's point of view.
    pub fn ediv_for(&self, role: Role) -> Ediv {
        match role {
            Role::Peripheral => self.own_enc.ediv,
            Role::Central => self.peer_enc.ediv,
        }
    }

    pub fn peer_addr(&self) -> &GapAddr {
        &self.peer_id.addr
    }

    pub fn to_bytes(&self, buf: &mut [u8]) -> BondResult<()> {
        if buf.len() < Self::SIZE { return Err(BondError::WireFormatError); }
        if self.own_enc.ltk_len > MAX_LTK_LEN || self.peer_enc.ltk_len > MAX_LTK_LEN {
            return Err(BondError::WireFormatError);
        }
        self.own_enc.write_to(&mut buf[0..ENC_KEY_LEN]);
        self.peer_enc.write_to(&mut buf[ENC_KEY_LEN..2 * ENC_KEY_LEN]);
        self.peer_id.write_to(&mut buf[2 * ENC_KEY_LEN..Self::SIZE]);
        Ok(())
    }

    pub fn from_bytes(buf: &[u8]) -> BondResult<Self> {
        if buf.len() < Self::SIZE { return Err(BondError::WireFormatError); }
        Ok(Self {
            own_enc: EncKey::read_from(&buf[0..ENC_KEY_LEN]),
            peer_enc: EncKey::read_from(&buf[ENC_KEY_LEN..2 * ENC_KEY_LEN]),
            peer_id: IdKey::read_from(&buf[2 * ENC_KEY_LEN..Self::SIZE])?,
        })
    }
}

/// Peer display name. Holds at most `MAX_DEVNAME_LEN - 1` bytes so the
/// stored form always has room for its terminator.
#[derive(Clone)]
pub struct DeviceName {
    buf: [u8; MAX_DEVNAME_LEN],
    len: usize,
}

impl DeviceName {
    pub const CAPACITY: usize = MAX_DEVNAME_LEN - 1;

    pub const fn empty() -> Self {
        Self { buf: [0u8; MAX_DEVNAME_LEN], len: 0 }
    }

    /// Takes bytes up to the first NUL, truncated to capacity.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let len = end.min(Self::CAPACITY);
        let mut name = Self::empty();
        name.buf[..len].copy_from_slice(&raw[..len]);
        name.len = len;
        name
    }

    /// Fallback name: colon separated uppercase hex, most significant byte first.
    pub fn from_peer_addr(addr: &[u8; 6]) -> Self {
        use core::fmt::Write;
        let mut name = Self::empty();
        let _ = write!(
            name,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            addr[5], addr[4], addr[3], addr[2], addr[1], addr[0]
        );
        name
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for DeviceName {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for DeviceName {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl PartialEq for DeviceName {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for DeviceName {}

impl fmt::Write for DeviceName {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = Self::CAPACITY - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => {
                for b in self.as_bytes() { write!(f, "\\x{:02x}", b)?; }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceName(\"{}\")", self)
    }
}

pub type BondResult<T> = Result<T, BondError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondError {
    /// Deferred payload could not be copied.
    AllocationFailure,
    QueueFull,
    StorageIo,
    /// The stack refused the stored system attributes.
    ProtocolRejection,
    /// EDIV equals `EDIV_INVALID`.
    InvalidEdiv,
    FieldOverflow,
    WireFormatError,
    InvalidLayout,
    InvalidConfig,
    NotFound,
}

impl fmt::Display for BondError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BondError {}
