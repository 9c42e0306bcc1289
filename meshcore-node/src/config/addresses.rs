//! Deduplicated destination-address arena with publish/subscribe
//! reference counting.
//!
//! Non-virtual (unicast/group) and virtual (label UUID) destinations
//! live in independently sized lists. Entries are created by the
//! first publish- or subscribe-reference and freed when both counts
//! reach zero. Subscribe-count transitions across zero surface a
//! [`SubscriptionChange`] so the Friend feature can track what the
//! node listens to.

use crate::error::ConfigError;
use crate::{NON_VIRTUAL_ADDRESS_LIST_SIZE, VIRTUAL_ADDRESS_LIST_SIZE};
use heapless::Vec;
use meshcore_common::address::{Address, LabelUuid};
use serde::{Deserialize, Serialize};

/// Index of an occupied entry in the non-virtual address list.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NonVirtualSlot(pub(crate) u16);

impl NonVirtualSlot {
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Index of an occupied entry in the virtual address list.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VirtualSlot(pub(crate) u16);

impl VirtualSlot {
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Reference into either address list.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressSlot {
    NonVirtual(NonVirtualSlot),
    Virtual(VirtualSlot),
}

/// Which reference count an insert or release applies to.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReferenceSide {
    Publish,
    Subscribe,
}

/// Subscribed-address set change, reported on every 0↔1 transition of
/// a subscribe count and fanned out to the Friend feature.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscriptionChange {
    Added { address: Address, slot: AddressSlot },
    Removed { address: Address, slot: AddressSlot },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct NonVirtualEntry {
    address: Address,
    publish_count: u16,
    subscribe_count: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct VirtualEntry {
    label: LabelUuid,
    publish_count: u16,
    subscribe_count: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressTable<
    const N: usize = NON_VIRTUAL_ADDRESS_LIST_SIZE,
    const V: usize = VIRTUAL_ADDRESS_LIST_SIZE,
> {
    pub(crate) non_virtual: Vec<Option<NonVirtualEntry>, N>,
    pub(crate) virtuals: Vec<Option<VirtualEntry>, V>,
}

impl<const N: usize, const V: usize> Default for AddressTable<N, V> {
    fn default() -> Self {
        let mut non_virtual = Vec::new();
        non_virtual.resize(N, None).ok();
        let mut virtuals = Vec::new();
        virtuals.resize(V, None).ok();
        Self {
            non_virtual,
            virtuals,
        }
    }
}

impl<const N: usize, const V: usize> AddressTable<N, V> {
    /// Look up a non-virtual address.
    pub fn find(&self, address: Address) -> Option<NonVirtualSlot> {
        self.non_virtual.iter().enumerate().find_map(|(i, e)| {
            e.as_ref()
                .filter(|entry| entry.address == address)
                .map(|_| NonVirtualSlot(i as u16))
        })
    }

    /// Look up a virtual address by its full `(address, label)` pair;
    /// distinct labels hashing to the same 16-bit address are distinct
    /// entries.
    pub fn find_virtual(&self, label: &LabelUuid) -> Option<VirtualSlot> {
        self.virtuals.iter().enumerate().find_map(|(i, e)| {
            e.as_ref()
                .filter(|entry| entry.label == *label)
                .map(|_| VirtualSlot(i as u16))
        })
    }

    /// Insert a unicast or group address, or take another reference on
    /// it if it is already present.
    pub fn insert(
        &mut self,
        address: Address,
        side: ReferenceSide,
    ) -> Result<(NonVirtualSlot, Option<SubscriptionChange>), ConfigError> {
        if !address.is_unicast() && !address.is_group() {
            return Err(ConfigError::InvalidParams);
        }

        if let Some(slot) = self.find(address) {
            let change = self.retain(AddressSlot::NonVirtual(slot), side);
            return Ok((slot, change));
        }

        // First free slot in scan order.
        for (i, entry) in self.non_virtual.iter_mut().enumerate() {
            if entry.is_none() {
                let slot = NonVirtualSlot(i as u16);
                let (publish_count, subscribe_count) = match side {
                    ReferenceSide::Publish => (1, 0),
                    ReferenceSide::Subscribe => (0, 1),
                };
                entry.replace(NonVirtualEntry {
                    address,
                    publish_count,
                    subscribe_count,
                });
                let change = (side == ReferenceSide::Subscribe).then(|| {
                    SubscriptionChange::Added {
                        address,
                        slot: AddressSlot::NonVirtual(slot),
                    }
                });
                return Ok((slot, change));
            }
        }
        Err(ConfigError::OutOfMemory)
    }

    /// Insert a label UUID, or take another reference on it if the
    /// same `(address, label)` pair is already present.
    pub fn insert_virtual(
        &mut self,
        label: &LabelUuid,
        side: ReferenceSide,
    ) -> Result<(VirtualSlot, Option<SubscriptionChange>), ConfigError> {
        if let Some(slot) = self.find_virtual(label) {
            let change = self.retain(AddressSlot::Virtual(slot), side);
            return Ok((slot, change));
        }

        for (i, entry) in self.virtuals.iter_mut().enumerate() {
            if entry.is_none() {
                let slot = VirtualSlot(i as u16);
                let (publish_count, subscribe_count) = match side {
                    ReferenceSide::Publish => (1, 0),
                    ReferenceSide::Subscribe => (0, 1),
                };
                entry.replace(VirtualEntry {
                    label: *label,
                    publish_count,
                    subscribe_count,
                });
                let change = (side == ReferenceSide::Subscribe).then(|| {
                    SubscriptionChange::Added {
                        address: label.virtual_address().into(),
                        slot: AddressSlot::Virtual(slot),
                    }
                });
                return Ok((slot, change));
            }
        }
        Err(ConfigError::OutOfMemory)
    }

    /// Take an additional reference on an occupied slot.
    pub fn retain(&mut self, slot: AddressSlot, side: ReferenceSide) -> Option<SubscriptionChange> {
        let address = self.address_of(slot)?;
        let (publish_count, subscribe_count) = self.counts_mut(slot)?;
        match side {
            ReferenceSide::Publish => {
                *publish_count += 1;
                None
            }
            ReferenceSide::Subscribe => {
                *subscribe_count += 1;
                (*subscribe_count == 1)
                    .then_some(SubscriptionChange::Added { address, slot })
            }
        }
    }

    /// Drop a reference; the entry is freed once both counts are zero.
    pub fn release(&mut self, slot: AddressSlot, side: ReferenceSide) -> Option<SubscriptionChange> {
        let address = self.address_of(slot)?;
        let (publish_count, subscribe_count) = self.counts_mut(slot)?;

        let mut change = None;
        match side {
            ReferenceSide::Publish => {
                if *publish_count > 0 {
                    *publish_count -= 1;
                }
            }
            ReferenceSide::Subscribe => {
                if *subscribe_count > 0 {
                    *subscribe_count -= 1;
                    if *subscribe_count == 0 {
                        change = Some(SubscriptionChange::Removed { address, slot });
                    }
                }
            }
        }

        let free = *publish_count == 0 && *subscribe_count == 0;
        if free {
            match slot {
                AddressSlot::NonVirtual(inner) => {
                    self.non_virtual[inner.0 as usize] = None;
                }
                AddressSlot::Virtual(inner) => {
                    self.virtuals[inner.0 as usize] = None;
                }
            }
        }
        change
    }

    pub fn address_of(&self, slot: AddressSlot) -> Option<Address> {
        match slot {
            AddressSlot::NonVirtual(inner) => self
                .non_virtual
                .get(inner.0 as usize)?
                .as_ref()
                .map(|e| e.address),
            AddressSlot::Virtual(inner) => self
                .virtuals
                .get(inner.0 as usize)?
                .as_ref()
                .map(|e| e.label.virtual_address().into()),
        }
    }

    pub fn label_of(&self, slot: VirtualSlot) -> Option<&LabelUuid> {
        self.virtuals
            .get(slot.0 as usize)?
            .as_ref()
            .map(|e| &e.label)
    }

    pub fn publish_count(&self, slot: AddressSlot) -> u16 {
        self.counts(slot).map(|(publish, _)| publish).unwrap_or(0)
    }

    pub fn subscribe_count(&self, slot: AddressSlot) -> u16 {
        self.counts(slot)
            .map(|(_, subscribe)| subscribe)
            .unwrap_or(0)
    }

    pub fn is_occupied(&self, slot: AddressSlot) -> bool {
        self.address_of(slot).is_some()
    }

    /// Whether any entry with this address value holds a live
    /// subscribe reference. Virtual entries match on the 16-bit hash
    /// alone; inbound filtering cannot see labels.
    pub fn is_subscribed_destination(&self, address: Address) -> bool {
        match address {
            Address::Virtual(virtual_address) => self.virtuals.iter().flatten().any(|e| {
                e.label.virtual_address() == virtual_address && e.subscribe_count > 0
            }),
            Address::Unicast(_) | Address::Group(_) => self
                .non_virtual
                .iter()
                .flatten()
                .any(|e| e.address == address && e.subscribe_count > 0),
            Address::Unassigned => false,
        }
    }

    /// Whether any non-virtual entry is currently subscribed to.
    pub fn has_subscribed_addresses(&self) -> bool {
        self.non_virtual
            .iter()
            .flatten()
            .any(|e| e.subscribe_count > 0)
    }

    /// Whether any virtual entry is currently subscribed to.
    pub fn has_subscribed_virtual_addresses(&self) -> bool {
        self.virtuals.iter().flatten().any(|e| e.subscribe_count > 0)
    }

    /// All addresses with a live subscribe reference, non-virtual then
    /// virtual.
    pub fn subscribed_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.non_virtual
            .iter()
            .flatten()
            .filter(|e| e.subscribe_count > 0)
            .map(|e| e.address)
            .chain(
                self.virtuals
                    .iter()
                    .flatten()
                    .filter(|e| e.subscribe_count > 0)
                    .map(|e| e.label.virtual_address().into()),
            )
    }

    fn counts(&self, slot: AddressSlot) -> Option<(u16, u16)> {
        match slot {
            AddressSlot::NonVirtual(inner) => self
                .non_virtual
                .get(inner.0 as usize)?
                .as_ref()
                .map(|e| (e.publish_count, e.subscribe_count)),
            AddressSlot::Virtual(inner) => self
                .virtuals
                .get(inner.0 as usize)?
                .as_ref()
                .map(|e| (e.publish_count, e.subscribe_count)),
        }
    }

    fn counts_mut(&mut self, slot: AddressSlot) -> Option<(&mut u16, &mut u16)> {
        match slot {
            AddressSlot::NonVirtual(inner) => self
                .non_virtual
                .get_mut(inner.0 as usize)?
                .as_mut()
                .map(|e| (&mut e.publish_count, &mut e.subscribe_count)),
            AddressSlot::Virtual(inner) => self
                .virtuals
                .get_mut(inner.0 as usize)?
                .as_mut()
                .map(|e| (&mut e.publish_count, &mut e.subscribe_count)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcore_common::address::{GroupAddress, VirtualAddress};

    fn group(addr: u16) -> Address {
        Address::Group(GroupAddress::new(addr).unwrap())
    }

    fn label(uuid: u8, addr: u16) -> LabelUuid {
        LabelUuid::new([uuid; 16], VirtualAddress::new(addr).unwrap())
    }

    #[test]
    fn insert_deduplicates_and_counts() {
        let mut table: AddressTable<4, 2> = Default::default();

        let (slot_a, change) = table.insert(group(0xC000), ReferenceSide::Subscribe).unwrap();
        assert!(matches!(change, Some(SubscriptionChange::Added { .. })));

        let (slot_b, change) = table.insert(group(0xC000), ReferenceSide::Subscribe).unwrap();
        assert_eq!(slot_a, slot_b);
        assert!(change.is_none());
        assert_eq!(table.subscribe_count(AddressSlot::NonVirtual(slot_a)), 2);
    }

    #[test]
    fn release_frees_on_both_zero() {
        let mut table: AddressTable<4, 2> = Default::default();
        let (slot, _) = table.insert(group(0xC001), ReferenceSide::Subscribe).unwrap();
        table.retain(AddressSlot::NonVirtual(slot), ReferenceSide::Publish);

        assert!(table
            .release(AddressSlot::NonVirtual(slot), ReferenceSide::Subscribe)
            .is_some());
        assert!(table.is_occupied(AddressSlot::NonVirtual(slot)));

        table.release(AddressSlot::NonVirtual(slot), ReferenceSide::Publish);
        assert!(!table.is_occupied(AddressSlot::NonVirtual(slot)));
        assert_eq!(table.find(group(0xC001)), None);
    }

    #[test]
    fn subscription_change_reported_for_unicast_too() {
        let mut table: AddressTable<4, 2> = Default::default();
        let unicast = Address::parse(0x0001);

        let (slot, change) = table.insert(unicast, ReferenceSide::Subscribe).unwrap();
        assert_eq!(
            change,
            Some(SubscriptionChange::Added {
                address: unicast,
                slot: AddressSlot::NonVirtual(slot),
            })
        );
    }

    #[test]
    fn virtual_entries_compare_full_labels() {
        let mut table: AddressTable<2, 3> = Default::default();

        // Two labels colliding on the same 16-bit hash stay distinct.
        let (slot_a, _) = table
            .insert_virtual(&label(0xA0, 0x800F), ReferenceSide::Subscribe)
            .unwrap();
        let (slot_b, _) = table
            .insert_virtual(&label(0xB1, 0x800F), ReferenceSide::Subscribe)
            .unwrap();
        assert_ne!(slot_a, slot_b);

        assert_eq!(table.find_virtual(&label(0xA0, 0x800F)), Some(slot_a));
        assert_eq!(table.find_virtual(&label(0xB1, 0x800F)), Some(slot_b));
        assert_eq!(table.find_virtual(&label(0xC2, 0x800F)), None);
    }

    #[test]
    fn same_value_non_virtual_and_virtual_are_distinct() {
        let mut table: AddressTable<4, 2> = Default::default();

        table.insert(group(0xC000), ReferenceSide::Publish).unwrap();
        table
            .insert_virtual(&label(0x11, 0x8000), ReferenceSide::Publish)
            .unwrap();

        assert!(table.find(group(0xC000)).is_some());
        assert!(table.find_virtual(&label(0x11, 0x8000)).is_some());
    }

    #[test]
    fn full_table_returns_out_of_memory_without_mutation() {
        let mut table: AddressTable<1, 1> = Default::default();
        let (slot, _) = table.insert(group(0xC000), ReferenceSide::Subscribe).unwrap();

        assert_eq!(
            table.insert(group(0xC001), ReferenceSide::Subscribe),
            Err(ConfigError::OutOfMemory)
        );
        assert_eq!(table.subscribe_count(AddressSlot::NonVirtual(slot)), 1);

        assert_eq!(
            table.insert_virtual(&label(0x22, 0x8001), ReferenceSide::Publish),
            Err(ConfigError::OutOfMemory)
        );
    }

    #[test]
    fn insert_rejects_unassigned_and_virtual() {
        let mut table: AddressTable<4, 2> = Default::default();
        assert_eq!(
            table.insert(Address::Unassigned, ReferenceSide::Publish),
            Err(ConfigError::InvalidParams)
        );
        assert_eq!(
            table.insert(Address::parse(0x8000), ReferenceSide::Publish),
            Err(ConfigError::InvalidParams)
        );
    }
}
