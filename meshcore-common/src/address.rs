//! Mesh addresses: unassigned, unicast, group (including the fixed
//! groups) and virtual with their label UUIDs.

use crate::ParseError;

/// Indicates an invalid address.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidAddress;

impl From<InvalidAddress> for ParseError {
    fn from(_: InvalidAddress) -> Self {
        ParseError::InvalidValue
    }
}

/// A nonzero address with the top bit clear, identifying a single
/// element of a single node.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnicastAddress(u16);

impl UnicastAddress {
    pub fn new(addr: u16) -> Result<Self, InvalidAddress> {
        if Self::is_unicast_address(addr) {
            Ok(Self(addr))
        } else {
            Err(InvalidAddress)
        }
    }

    /// Create a unicast address.
    ///
    /// # Safety
    /// The value is not checked for the unicast bit-pattern. See
    /// `is_unicast_address(...)`.
    pub unsafe fn new_unchecked(addr: u16) -> Self {
        Self(addr)
    }

    pub fn is_unicast_address(addr: u16) -> bool {
        addr != 0 && addr & 0x8000 == 0
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UnicastAddress {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=u16:04x}", self.0);
    }
}

impl From<UnicastAddress> for u16 {
    fn from(addr: UnicastAddress) -> Self {
        addr.0
    }
}

impl TryFrom<u16> for UnicastAddress {
    type Error = InvalidAddress;

    fn try_from(addr: u16) -> Result<Self, Self::Error> {
        Self::new(addr)
    }
}

/// A multicast address, representing zero or more elements across one
/// or more nodes.
#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupAddress {
    Normal(u16),
    RFU(u16),
    AllProxies,
    AllFriends,
    AllRelays,
    AllNodes,
}

impl GroupAddress {
    pub fn is_group_address(addr: u16) -> bool {
        addr & 0xC000 == 0xC000
    }

    pub fn new(addr: u16) -> Result<Self, InvalidAddress> {
        if Self::is_group_address(addr) {
            // Safety: pattern checked above.
            Ok(unsafe { Self::new_unchecked(addr) })
        } else {
            Err(InvalidAddress)
        }
    }

    /// Classify a group address value.
    ///
    /// # Safety
    /// The value must match the group-address bit pattern. See
    /// `is_group_address(...)`.
    pub unsafe fn new_unchecked(addr: u16) -> Self {
        match addr {
            0xFFFC => Self::AllProxies,
            0xFFFD => Self::AllFriends,
            0xFFFE => Self::AllRelays,
            0xFFFF => Self::AllNodes,
            0xFF00..=0xFFFB => Self::RFU(addr),
            _ => Self::Normal(addr),
        }
    }

    pub fn value(&self) -> u16 {
        match self {
            Self::Normal(addr) | Self::RFU(addr) => *addr,
            Self::AllProxies => 0xFFFC,
            Self::AllFriends => 0xFFFD,
            Self::AllRelays => 0xFFFE,
            Self::AllNodes => 0xFFFF,
        }
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.value().to_be_bytes()
    }
}

/// The 16-bit hash surfacing one or more label UUIDs on the network
/// layer.
///
/// The conversion from label UUID to virtual address is deterministic
/// but not invertible; resolving a virtual address back to a label
/// requires node-local state.
#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualAddress(u16);

impl VirtualAddress {
    pub fn new(addr: u16) -> Result<Self, InvalidAddress> {
        if Self::is_virtual_address(addr) {
            Ok(Self(addr))
        } else {
            Err(InvalidAddress)
        }
    }

    /// Create a virtual address.
    ///
    /// # Safety
    /// The value is not checked for the virtual-address bit-pattern.
    /// See `is_virtual_address(...)`.
    pub unsafe fn new_unchecked(addr: u16) -> Self {
        Self(addr)
    }

    pub fn is_virtual_address(addr: u16) -> bool {
        addr & 0xC000 == 0x8000
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for VirtualAddress {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=u16:04x}", self.0);
    }
}

/// A 16-octet label UUID together with the virtual address it hashes
/// to.
///
/// The address is derived with `s1`/AES-CMAC by the security layer;
/// this type only pairs the two so table lookups can compare full
/// labels instead of ambiguous 16-bit hashes.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelUuid {
    uuid: [u8; 16],
    address: VirtualAddress,
}

impl LabelUuid {
    pub fn new(uuid: [u8; 16], address: VirtualAddress) -> Self {
        Self { uuid, address }
    }

    pub fn parse(uuid: &[u8], address: VirtualAddress) -> Result<Self, ParseError> {
        let uuid = uuid.try_into().map_err(|_| ParseError::InvalidLength)?;
        Ok(Self::new(uuid, address))
    }

    pub fn label_uuid(&self) -> &[u8; 16] {
        &self.uuid
    }

    pub fn virtual_address(&self) -> VirtualAddress {
        self.address
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LabelUuid {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "label={=[u8]:02x}; {}", &self.uuid[..], self.address)
    }
}

/// Any destination a mesh PDU can carry.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Address {
    Unassigned,
    Unicast(UnicastAddress),
    Virtual(VirtualAddress),
    Group(GroupAddress),
}

impl Address {
    /// Classify a raw 16-bit address value.
    pub fn parse(addr: u16) -> Self {
        if addr == 0 {
            Self::Unassigned
        } else if UnicastAddress::is_unicast_address(addr) {
            // Safety: pattern checked above.
            unsafe { Self::Unicast(UnicastAddress::new_unchecked(addr)) }
        } else if GroupAddress::is_group_address(addr) {
            // Safety: pattern checked above.
            unsafe { Self::Group(GroupAddress::new_unchecked(addr)) }
        } else {
            // Safety: remaining pattern is virtual.
            unsafe { Self::Virtual(VirtualAddress::new_unchecked(addr)) }
        }
    }

    pub fn value(&self) -> u16 {
        match self {
            Self::Unassigned => 0,
            Self::Unicast(inner) => inner.value(),
            Self::Virtual(inner) => inner.value(),
            Self::Group(inner) => inner.value(),
        }
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.value().to_be_bytes()
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self, Self::Unassigned)
    }

    pub fn is_unicast(&self) -> bool {
        matches!(self, Self::Unicast(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }
}

impl From<UnicastAddress> for Address {
    fn from(addr: UnicastAddress) -> Self {
        Self::Unicast(addr)
    }
}

impl From<GroupAddress> for Address {
    fn from(addr: GroupAddress) -> Self {
        Self::Group(addr)
    }
}

impl From<VirtualAddress> for Address {
    fn from(addr: VirtualAddress) -> Self {
        Self::Virtual(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unassigned() {
        assert_eq!(Address::parse(0x0000), Address::Unassigned);
    }

    #[test]
    fn parse_unicast() {
        assert_eq!(
            Address::parse(0x000A),
            Address::Unicast(UnicastAddress::new(0x000A).unwrap())
        );
        assert_eq!(
            Address::parse(0x7FFF),
            Address::Unicast(UnicastAddress::new(0x7FFF).unwrap())
        );
    }

    #[test]
    fn parse_virtual() {
        assert_eq!(
            Address::parse(0x800A),
            Address::Virtual(VirtualAddress::new(0x800A).unwrap())
        );
        assert_eq!(
            Address::parse(0xBFFF),
            Address::Virtual(VirtualAddress::new(0xBFFF).unwrap())
        );
    }

    #[test]
    fn parse_group() {
        assert_eq!(
            Address::parse(0xC000),
            Address::Group(GroupAddress::Normal(0xC000))
        );
        assert_eq!(
            Address::parse(0xFF0A),
            Address::Group(GroupAddress::RFU(0xFF0A))
        );
        assert_eq!(
            Address::parse(0xFFFC),
            Address::Group(GroupAddress::AllProxies)
        );
        assert_eq!(
            Address::parse(0xFFFD),
            Address::Group(GroupAddress::AllFriends)
        );
        assert_eq!(
            Address::parse(0xFFFE),
            Address::Group(GroupAddress::AllRelays)
        );
        assert_eq!(Address::parse(0xFFFF), Address::Group(GroupAddress::AllNodes));
    }

    #[test]
    fn unicast_rejects_other_patterns() {
        assert_eq!(UnicastAddress::new(0x0000), Err(InvalidAddress));
        assert_eq!(UnicastAddress::new(0x8000), Err(InvalidAddress));
        assert_eq!(UnicastAddress::new(0xC000), Err(InvalidAddress));
    }

    #[test]
    fn value_round_trip() {
        for addr in [0x0000, 0x0001, 0x7FFF, 0x8000, 0xBFFF, 0xC000, 0xFFFF] {
            assert_eq!(Address::parse(addr).value(), addr);
        }
    }

    #[test]
    fn label_uuid_pairs_address() {
        let address = VirtualAddress::new(0x800F).unwrap();
        let label = LabelUuid::parse(&[0xA0; 16], address).unwrap();
        assert_eq!(label.virtual_address(), address);
        assert_eq!(label.label_uuid(), &[0xA0; 16]);
        assert!(LabelUuid::parse(&[0u8; 15], address).is_err());
    }
}
