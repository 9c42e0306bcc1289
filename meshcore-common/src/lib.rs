#![cfg_attr(not(test), no_std)]

use core::ops::{Add, Sub};
use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod address;
pub mod beacon;
pub mod keys;

/// The emit buffer was too small for the encoded value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InsufficientBuffer;

impl From<()> for InsufficientBuffer {
    fn from(_: ()) -> Self {
        InsufficientBuffer
    }
}

impl From<u8> for InsufficientBuffer {
    fn from(_: u8) -> Self {
        InsufficientBuffer
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    InvalidValue,
    InvalidLength,
}

/// IV Update flag carried by secure network beacons and node state.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Default, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IvUpdateFlag {
    #[default]
    Normal,
    InProgress,
}

impl IvUpdateFlag {
    pub fn parse(data: u8) -> Self {
        if data == 0 {
            Self::Normal
        } else {
            Self::InProgress
        }
    }

    pub fn emit(&self, data: &mut u8) {
        if self == &Self::InProgress {
            *data |= 0b00000010;
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl From<bool> for IvUpdateFlag {
    fn from(in_progress: bool) -> Self {
        if in_progress {
            Self::InProgress
        } else {
            Self::Normal
        }
    }
}

/// Key Refresh flag carried by secure network beacons.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyRefreshFlag(pub bool);

impl KeyRefreshFlag {
    pub fn parse(data: u8) -> Self {
        Self(data != 0)
    }

    pub fn emit(&self, data: &mut u8) {
        if self.0 {
            *data |= 0b00000001;
        }
    }
}

/// The 32-bit IV index shared by all subnets of a node.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IvIndex(u32);

#[cfg(feature = "defmt")]
impl defmt::Format for IvIndex {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0)
    }
}

impl IvIndex {
    pub const fn new(iv_index: u32) -> Self {
        Self(iv_index)
    }

    pub fn parse(iv_index: &[u8]) -> Result<Self, ParseError> {
        if iv_index.len() == 4 {
            Ok(Self(u32::from_be_bytes([
                iv_index[0],
                iv_index[1],
                iv_index[2],
                iv_index[3],
            ])))
        } else {
            Err(ParseError::InvalidLength)
        }
    }

    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Add<u32> for IvIndex {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub<u32> for IvIndex {
    type Output = Self;

    fn sub(self, rhs: u32) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

/// Time-to-live for published and forwarded PDUs.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ttl(u8);

impl Ttl {
    pub const fn new(ttl: u8) -> Self {
        Self(ttl)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Largest sequence number representable in a network PDU.
pub const SEQ_MAX: u32 = 0x00FF_FFFF;

pub struct SeqRolloverError;

/// A 24-bit element sequence number.
#[derive(Default, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Seq(u32);

impl Seq {
    pub const fn new(seq: u32) -> Self {
        Self(seq)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl Add<u32> for Seq {
    type Output = Result<Seq, SeqRolloverError>;

    fn add(self, rhs: u32) -> Self::Output {
        match self.0.checked_add(rhs) {
            Some(val) if val <= SEQ_MAX => Ok(Self(val)),
            _ => Err(SeqRolloverError),
        }
    }
}

/// An 8-byte subnet identifier derived from a NetKey.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkId([u8; 8]);

impl NetworkId {
    pub const fn new(network_id: [u8; 8]) -> Self {
        Self(network_id)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetworkId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=[u8]:02x}", &self.0[..])
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompanyIdentifier(pub u16);

#[derive(Eq, PartialEq, Copy, Clone, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProductIdentifier(pub u16);

#[derive(Eq, PartialEq, Copy, Clone, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VersionIdentifier(pub u16);

/// SIG-defined descriptor code for the placement of an element.
#[derive(Eq, PartialEq, Copy, Clone, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location(pub u16);

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModelIdentifier {
    Sig(u16),
    Vendor(CompanyIdentifier, u16),
}

impl ModelIdentifier {
    pub fn parse(parameters: &[u8]) -> Result<Self, ParseError> {
        if parameters.len() == 2 {
            Ok(ModelIdentifier::Sig(u16::from_le_bytes([
                parameters[0],
                parameters[1],
            ])))
        } else if parameters.len() == 4 {
            Ok(ModelIdentifier::Vendor(
                CompanyIdentifier(u16::from_le_bytes([parameters[0], parameters[1]])),
                u16::from_le_bytes([parameters[2], parameters[3]]),
            ))
        } else {
            Err(ParseError::InvalidLength)
        }
    }

    // NOTE: model identifiers are little-endian on the wire, unlike
    // nearly everything else in the profile.
    pub fn emit<const N: usize>(&self, xmit: &mut Vec<u8, N>) -> Result<(), InsufficientBuffer> {
        match self {
            ModelIdentifier::Sig(model_id) => {
                xmit.extend_from_slice(&model_id.to_le_bytes())
                    .map_err(|_| InsufficientBuffer)?;
            }
            ModelIdentifier::Vendor(company_id, model_id) => {
                xmit.extend_from_slice(&company_id.0.to_le_bytes())
                    .map_err(|_| InsufficientBuffer)?;
                xmit.extend_from_slice(&model_id.to_le_bytes())
                    .map_err(|_| InsufficientBuffer)?;
            }
        }
        Ok(())
    }

    pub fn is_sig(&self) -> bool {
        matches!(self, Self::Sig(_))
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ModelIdentifier {
    fn format(&self, fmt: defmt::Formatter) {
        match *self {
            ModelIdentifier::Sig(id) => {
                defmt::write!(fmt, "SIG(0x{=u16:04x})", id);
            }
            ModelIdentifier::Vendor(company_id, model_id) => {
                defmt::write!(fmt, "Vendor({}, 0x{=u16:04x})", company_id, model_id);
            }
        }
    }
}

/// Optional node features advertised in the composition and echoed in
/// heartbeat publications.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Features {
    pub relay: bool,
    pub proxy: bool,
    pub friend: bool,
    pub low_power: bool,
}

impl Features {
    pub fn to_bits(self) -> u16 {
        let mut bits = 0;
        if self.relay {
            bits |= 0b0001;
        }
        if self.proxy {
            bits |= 0b0010;
        }
        if self.friend {
            bits |= 0b0100;
        }
        if self.low_power {
            bits |= 0b1000;
        }
        bits
    }

    pub fn from_bits(bits: u16) -> Self {
        Self {
            relay: bits & 0b0001 != 0,
            proxy: bits & 0b0010 != 0,
            friend: bits & 0b0100 != 0,
            low_power: bits & 0b1000 != 0,
        }
    }
}

/// Upper bound on elements per node.
pub const MAX_ELEMENTS: usize = 4;

/// Upper bound on model instances per element.
pub const MAX_MODELS_PER_ELEMENT: usize = 4;

/// Identifies a model instance within a composition by element index
/// and model identifier.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModelRef {
    pub element_index: u8,
    pub model_identifier: ModelIdentifier,
}

/// Subscription-list dimensioning for one model instance.
///
/// A model either owns a slice of the node-wide subscription list or
/// shares the slice of a root model declared elsewhere in the
/// composition. Mutations through a sharing model are visible through
/// the root and vice versa.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscriptionCapacity {
    Owned(u8),
    Shared(ModelRef),
}

#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModelDescriptor {
    pub model_identifier: ModelIdentifier,
    pub app_key_bind_capacity: u8,
    pub subscription_capacity: SubscriptionCapacity,
}

impl ModelDescriptor {
    pub fn new(
        model_identifier: ModelIdentifier,
        app_key_bind_capacity: u8,
        subscription_capacity: SubscriptionCapacity,
    ) -> Self {
        Self {
            model_identifier,
            app_key_bind_capacity,
            subscription_capacity,
        }
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElementDescriptor {
    pub location: Location,
    pub models: Vec<ModelDescriptor, MAX_MODELS_PER_ELEMENT>,
}

impl ElementDescriptor {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            models: Default::default(),
        }
    }

    pub fn add_model(&mut self, model: ModelDescriptor) -> Result<(), InsufficientBuffer> {
        self.models.push(model).map_err(|_| InsufficientBuffer)
    }

    pub fn has_model(&self, model_identifier: ModelIdentifier) -> bool {
        self.models
            .iter()
            .any(|m| m.model_identifier == model_identifier)
    }

    pub fn models_iter(&self) -> impl Iterator<Item = &ModelDescriptor> + '_ {
        self.models.iter()
    }
}

/// Static description of the node: identity plus the element/model
/// topology every table in the config store is dimensioned from.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Composition {
    cid: CompanyIdentifier,
    pid: ProductIdentifier,
    vid: VersionIdentifier,
    features: Features,
    elements: Vec<ElementDescriptor, MAX_ELEMENTS>,
}

impl Composition {
    pub fn new(
        cid: CompanyIdentifier,
        pid: ProductIdentifier,
        vid: VersionIdentifier,
        features: Features,
    ) -> Self {
        Self {
            cid,
            pid,
            vid,
            features,
            elements: Default::default(),
        }
    }

    pub fn add_element(&mut self, element: ElementDescriptor) -> Result<(), InsufficientBuffer> {
        self.elements.push(element).map_err(|_| InsufficientBuffer)
    }

    pub fn cid(&self) -> CompanyIdentifier {
        self.cid
    }

    pub fn pid(&self) -> ProductIdentifier {
        self.pid
    }

    pub fn vid(&self) -> VersionIdentifier {
        self.vid
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn number_of_elements(&self) -> u8 {
        self.elements.len() as u8
    }

    pub fn element(&self, element_index: u8) -> Option<&ElementDescriptor> {
        self.elements.get(element_index as usize)
    }

    pub fn elements_iter(&self) -> impl Iterator<Item = &ElementDescriptor> + '_ {
        self.elements.iter()
    }
}
