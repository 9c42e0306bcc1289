//! Key material and key-index vocabulary shared between the config
//! store and the network management state machine.

use crate::ParseError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 128-bit network-layer key material.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkKey([u8; 16]);

impl NetworkKey {
    pub const fn new(key: [u8; 16]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetworkKey {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=[u8]:02x}", &self.0[..])
    }
}

/// 128-bit application-layer key material.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ApplicationKey([u8; 16]);

impl ApplicationKey {
    pub const fn new(key: [u8; 16]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ApplicationKey {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=[u8]:02x}", &self.0[..])
    }
}

/// 128-bit device key assigned during provisioning.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceKey([u8; 16]);

impl DeviceKey {
    pub const fn new(key: [u8; 16]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeviceKey {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=[u8]:02x}", &self.0[..])
    }
}

/// Largest global key index; key indexes are 12 bits on the wire.
pub const KEY_INDEX_MAX: u16 = 0x0FFF;

#[derive(PartialEq, Eq, PartialOrd, Copy, Clone, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyIndex(u16);

impl KeyIndex {
    pub fn parse(index: u16) -> Result<Self, ParseError> {
        if index <= KEY_INDEX_MAX {
            Ok(Self(index))
        } else {
            Err(ParseError::InvalidValue)
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for KeyIndex {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0);
    }
}

/// Global identifier of a NetKey.
#[derive(PartialEq, Eq, PartialOrd, Copy, Clone, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetKeyIndex(KeyIndex);

impl NetKeyIndex {
    /// Index of the primary subnet's NetKey.
    pub const PRIMARY: NetKeyIndex = NetKeyIndex(KeyIndex(0));

    pub const fn new(index: u16) -> Self {
        Self(KeyIndex(index))
    }

    pub fn parse(index: u16) -> Result<Self, ParseError> {
        Ok(Self(KeyIndex::parse(index)?))
    }

    pub fn value(&self) -> u16 {
        self.0.value()
    }

    pub fn is_primary(&self) -> bool {
        *self == Self::PRIMARY
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetKeyIndex {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0)
    }
}

/// Global identifier of an AppKey.
#[derive(PartialEq, Eq, PartialOrd, Copy, Clone, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AppKeyIndex(KeyIndex);

impl AppKeyIndex {
    pub const fn new(index: u16) -> Self {
        Self(KeyIndex(index))
    }

    pub fn parse(index: u16) -> Result<Self, ParseError> {
        Ok(Self(KeyIndex::parse(index)?))
    }

    pub fn value(&self) -> u16 {
        self.0.value()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AppKeyIndex {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0)
    }
}

/// Key Refresh procedure phase of one subnet.
///
/// `Phase3` is transient; observing it always collapses into
/// `NotActive` once the old key material is revoked.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyRefreshPhase {
    #[default]
    NotActive,
    Phase1,
    Phase2,
    Phase3,
}

impl KeyRefreshPhase {
    /// Rewrite the transient third phase to `NotActive`.
    pub fn collapse(self) -> Self {
        match self {
            Self::Phase3 => Self::NotActive,
            other => other,
        }
    }
}

/// Node Identity advertising state for one subnet.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeIdentityState {
    NotSupported,
    #[default]
    Stopped,
    Running,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_index_range() {
        assert!(KeyIndex::parse(0x0FFF).is_ok());
        assert_eq!(KeyIndex::parse(0x1000), Err(ParseError::InvalidValue));
    }

    #[test]
    fn primary_subnet_index() {
        assert!(NetKeyIndex::new(0).is_primary());
        assert!(!NetKeyIndex::new(1).is_primary());
        assert_eq!(NetKeyIndex::PRIMARY.value(), 0);
    }

    #[test]
    fn phase3_collapses() {
        assert_eq!(KeyRefreshPhase::Phase3.collapse(), KeyRefreshPhase::NotActive);
        assert_eq!(KeyRefreshPhase::Phase2.collapse(), KeyRefreshPhase::Phase2);
        assert_eq!(KeyRefreshPhase::Phase1.collapse(), KeyRefreshPhase::Phase1);
        assert_eq!(
            KeyRefreshPhase::NotActive.collapse(),
            KeyRefreshPhase::NotActive
        );
    }
}
