//! The node configuration store: element/model topology, address and
//! key tables, publication/subscription bindings, feature states,
//! sequence numbers and IV machinery.
//!
//! Everything here is plain state plus the invariants tying the
//! tables together (address refcounts in particular). Persistence and
//! notification fan-out happen one layer up in [`crate::Node`], which
//! routes every mutation through the persistence broker.

use crate::error::ConfigError;
use heapless::Vec;
use meshcore_common::address::{Address, LabelUuid, UnicastAddress};
use meshcore_common::keys::{
    AppKeyIndex, ApplicationKey, DeviceKey, KeyRefreshPhase, NetKeyIndex, NetworkKey,
    NodeIdentityState,
};
use meshcore_common::{
    CompanyIdentifier, Composition, Features, IvIndex, IvUpdateFlag, ModelIdentifier,
    ProductIdentifier, Seq, Ttl, VersionIdentifier,
};
use serde::{Deserialize, Serialize};

pub mod addresses;
pub mod elements;
pub mod heartbeat;
pub mod keys;
pub mod models;

pub use addresses::{
    AddressSlot, AddressTable, NonVirtualSlot, ReferenceSide, SubscriptionChange, VirtualSlot,
};
pub use elements::{AttentionAction, AttentionTick, ElementStore};
pub use heartbeat::{HeartbeatPublication, HeartbeatState, HeartbeatSubscription};
pub use keys::{AppKeySlot, KeyCursor, KeyTable, NetKeySlot};
pub use models::{ModelHandle, ModelTable, Publication, PublishPeriod, Resolution};

/// Relay feature state.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayState {
    Disabled,
    Enabled,
    NotSupported,
}

/// Secure Network Beacon broadcast state.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeaconState {
    NotBroadcasting,
    Broadcasting,
}

/// GATT Proxy feature state.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattProxyState {
    Disabled,
    Enabled,
    NotSupported,
}

/// Friend feature state.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FriendState {
    Disabled,
    Enabled,
    NotSupported,
}

/// Low Power feature state.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LowPowerState {
    Disabled,
    Enabled,
}

/// Model publication destination as seen by callers: unassigned, a
/// concrete non-virtual address, or a label UUID.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishAddress {
    Unassigned,
    NonVirtual(Address),
    Virtual(LabelUuid),
}

/// Suspendable cursor over a model's subscription list.
#[derive(Copy, Clone, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriptionCursor(u8);

/// Top-level scalar state persisted as one dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoreState {
    pub(crate) iv_index: IvIndex,
    pub(crate) iv_update: IvUpdateFlag,
    pub(crate) primary_address: Option<UnicastAddress>,
    pub(crate) device_key: Option<DeviceKey>,
    pub(crate) cid: CompanyIdentifier,
    pub(crate) pid: ProductIdentifier,
    pub(crate) vid: VersionIdentifier,
    pub(crate) default_ttl: Ttl,
    pub(crate) relay: RelayState,
    pub(crate) relay_retransmit_count: u8,
    pub(crate) relay_retransmit_interval_steps: u8,
    pub(crate) beacon: BeaconState,
    pub(crate) gatt_proxy: GattProxyState,
    pub(crate) friend: FriendState,
    pub(crate) low_power: LowPowerState,
    pub(crate) network_transmit_count: u8,
    pub(crate) network_transmit_interval_steps: u8,
}

impl CoreState {
    fn new(composition: &Composition) -> Self {
        let features = composition.features();
        Self {
            iv_index: IvIndex::default(),
            iv_update: IvUpdateFlag::Normal,
            primary_address: None,
            device_key: None,
            cid: composition.cid(),
            pid: composition.pid(),
            vid: composition.vid(),
            default_ttl: Ttl::new(127),
            relay: if features.relay {
                RelayState::Disabled
            } else {
                RelayState::NotSupported
            },
            relay_retransmit_count: 0,
            relay_retransmit_interval_steps: 0,
            beacon: BeaconState::Broadcasting,
            gatt_proxy: if features.proxy {
                GattProxyState::Disabled
            } else {
                GattProxyState::NotSupported
            },
            friend: if features.friend {
                FriendState::Disabled
            } else {
                FriendState::NotSupported
            },
            low_power: LowPowerState::Disabled,
            network_transmit_count: 0,
            network_transmit_interval_steps: 0,
        }
    }
}

/// The assembled config store.
pub struct LocalConfig {
    pub(crate) core: CoreState,
    pub(crate) addresses: AddressTable,
    pub(crate) keys: KeyTable,
    pub(crate) models: ModelTable,
    pub(crate) elements: ElementStore,
    pub(crate) heartbeat: HeartbeatState,
}

impl LocalConfig {
    pub fn new(composition: &Composition) -> Result<Self, ConfigError> {
        Ok(Self {
            core: CoreState::new(composition),
            addresses: Default::default(),
            keys: Default::default(),
            models: ModelTable::new(composition)?,
            elements: ElementStore::new(composition.number_of_elements())?,
            heartbeat: Default::default(),
        })
    }

    // ----------------------------------------------------------------
    // Elements and addressing
    // ----------------------------------------------------------------

    pub fn set_primary_address(&mut self, address: UnicastAddress) {
        self.core.primary_address = Some(address);
    }

    pub fn primary_address(&self) -> Option<UnicastAddress> {
        self.core.primary_address
    }

    /// Address of the element: primary node address plus element
    /// index. Defined only once the node is provisioned.
    pub fn element_address(&self, element_index: u8) -> Result<UnicastAddress, ConfigError> {
        if element_index >= self.elements.element_count() {
            return Err(ConfigError::InvalidParams);
        }
        let primary = self.core.primary_address.ok_or(ConfigError::NotFound)?;
        UnicastAddress::new(primary.value() + element_index as u16)
            .map_err(|_| ConfigError::InvalidParams)
    }

    pub fn element_index_of(&self, address: UnicastAddress) -> Option<u8> {
        let primary = self.core.primary_address?;
        let offset = address.value().checked_sub(primary.value())?;
        (offset < self.elements.element_count() as u16).then_some(offset as u8)
    }

    pub fn element_count(&self) -> u8 {
        self.elements.element_count()
    }

    // ----------------------------------------------------------------
    // Model publication
    // ----------------------------------------------------------------

    pub fn model_exists(&self, element_index: u8, model: ModelIdentifier) -> bool {
        self.models.exists(element_index, model)
    }

    /// Set or clear the non-virtual publish address of a model.
    ///
    /// `Unassigned` releases the current publish reference and clears
    /// the record's address; the other publication fields survive.
    pub fn set_publish_address(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let current = self.models.publication(handle).address;

        match address {
            Address::Unassigned => {
                if let Some(slot) = current {
                    self.addresses.release(slot, ReferenceSide::Publish);
                    self.models.publication_mut(handle).address = None;
                }
                Ok(())
            }
            Address::Unicast(_) | Address::Group(_) => {
                if let Some(existing) = self.addresses.find(address) {
                    if current == Some(AddressSlot::NonVirtual(existing)) {
                        return Ok(());
                    }
                }
                let (slot, _) = self.addresses.insert(address, ReferenceSide::Publish)?;
                if let Some(old) = current {
                    self.addresses.release(old, ReferenceSide::Publish);
                }
                self.models.publication_mut(handle).address =
                    Some(AddressSlot::NonVirtual(slot));
                Ok(())
            }
            Address::Virtual(_) => Err(ConfigError::InvalidParams),
        }
    }

    /// Set the publish address of a model to a label UUID.
    pub fn set_publish_virtual_address(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let current = self.models.publication(handle).address;

        if let Some(existing) = self.addresses.find_virtual(label) {
            if current == Some(AddressSlot::Virtual(existing)) {
                return Ok(());
            }
        }
        let (slot, _) = self
            .addresses
            .insert_virtual(label, ReferenceSide::Publish)?;
        if let Some(old) = current {
            self.addresses.release(old, ReferenceSide::Publish);
        }
        self.models.publication_mut(handle).address = Some(AddressSlot::Virtual(slot));
        Ok(())
    }

    pub fn publish_address(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<PublishAddress, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::NotFound)?;
        match self.models.publication(handle).address {
            None => Ok(PublishAddress::Unassigned),
            Some(AddressSlot::NonVirtual(slot)) => self
                .addresses
                .address_of(AddressSlot::NonVirtual(slot))
                .map(PublishAddress::NonVirtual)
                .ok_or(ConfigError::NotFound),
            Some(AddressSlot::Virtual(slot)) => self
                .addresses
                .label_of(slot)
                .map(|label| PublishAddress::Virtual(*label))
                .ok_or(ConfigError::NotFound),
        }
    }

    pub fn set_publish_app_key(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        app_key: AppKeyIndex,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let slot = self.keys.app_key_slot(app_key).ok_or(ConfigError::NotFound)?;
        self.models.publication_mut(handle).app_key = Some(slot);
        Ok(())
    }

    pub fn clear_publish_app_key(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        self.models.publication_mut(handle).app_key = None;
        Ok(())
    }

    pub fn publish_app_key(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<Option<AppKeyIndex>, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::NotFound)?;
        Ok(self
            .models
            .publication(handle)
            .app_key
            .and_then(|slot| self.keys.app_key_index_of(slot)))
    }

    pub fn set_publish_period(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        period: PublishPeriod,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        self.models.publication_mut(handle).period = period;
        Ok(())
    }

    pub fn set_publish_ttl(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        ttl: Ttl,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        self.models.publication_mut(handle).ttl = ttl;
        Ok(())
    }

    pub fn set_publish_friendship_credential(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        friendship_credential: bool,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        self.models.publication_mut(handle).credential_flag = friendship_credential;
        Ok(())
    }

    pub fn set_publish_retransmit(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        count: u8,
        interval_steps: u8,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let publication = self.models.publication_mut(handle);
        publication.retransmit_count = count;
        publication.retransmit_interval_steps = interval_steps;
        Ok(())
    }

    pub fn publication(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<&Publication, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::NotFound)?;
        Ok(self.models.publication(handle))
    }

    // ----------------------------------------------------------------
    // Model subscriptions
    // ----------------------------------------------------------------

    /// Subscribe a model to a non-virtual address. Idempotent per
    /// model: re-adding an address the model already holds returns
    /// `AlreadyExists` and leaves refcounts alone.
    pub fn add_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> Result<Option<SubscriptionChange>, ConfigError> {
        if !address.is_unicast() && !address.is_group() {
            return Err(ConfigError::InvalidParams);
        }
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;

        match self.addresses.find(address) {
            Some(existing) => {
                let slots = self.models.subscription_slots(handle);
                if slots.contains(&Some(AddressSlot::NonVirtual(existing))) {
                    return Err(ConfigError::AlreadyExists);
                }
                let free = slots
                    .iter()
                    .position(|s| s.is_none())
                    .ok_or(ConfigError::OutOfMemory)?;
                let change = self
                    .addresses
                    .retain(AddressSlot::NonVirtual(existing), ReferenceSide::Subscribe);
                self.models.subscription_slots_mut(handle)[free] =
                    Some(AddressSlot::NonVirtual(existing));
                Ok(change)
            }
            None => {
                let free = self
                    .models
                    .subscription_slots(handle)
                    .iter()
                    .position(|s| s.is_none())
                    .ok_or(ConfigError::OutOfMemory)?;
                let (slot, change) = self.addresses.insert(address, ReferenceSide::Subscribe)?;
                self.models.subscription_slots_mut(handle)[free] =
                    Some(AddressSlot::NonVirtual(slot));
                Ok(change)
            }
        }
    }

    /// Subscribe a model to a label UUID.
    pub fn add_virtual_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> Result<Option<SubscriptionChange>, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;

        match self.addresses.find_virtual(label) {
            Some(existing) => {
                let slots = self.models.subscription_slots(handle);
                if slots.contains(&Some(AddressSlot::Virtual(existing))) {
                    return Err(ConfigError::AlreadyExists);
                }
                let free = slots
                    .iter()
                    .position(|s| s.is_none())
                    .ok_or(ConfigError::OutOfMemory)?;
                let change = self
                    .addresses
                    .retain(AddressSlot::Virtual(existing), ReferenceSide::Subscribe);
                self.models.subscription_slots_mut(handle)[free] =
                    Some(AddressSlot::Virtual(existing));
                Ok(change)
            }
            None => {
                let free = self
                    .models
                    .subscription_slots(handle)
                    .iter()
                    .position(|s| s.is_none())
                    .ok_or(ConfigError::OutOfMemory)?;
                let (slot, change) = self
                    .addresses
                    .insert_virtual(label, ReferenceSide::Subscribe)?;
                self.models.subscription_slots_mut(handle)[free] =
                    Some(AddressSlot::Virtual(slot));
                Ok(change)
            }
        }
    }

    pub fn remove_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> Result<Option<SubscriptionChange>, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::NotFound)?;
        let slot = self.addresses.find(address).ok_or(ConfigError::NotFound)?;
        self.remove_subscription_slot(handle, AddressSlot::NonVirtual(slot))
    }

    pub fn remove_virtual_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> Result<Option<SubscriptionChange>, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::NotFound)?;
        let slot = self
            .addresses
            .find_virtual(label)
            .ok_or(ConfigError::NotFound)?;
        self.remove_subscription_slot(handle, AddressSlot::Virtual(slot))
    }

    fn remove_subscription_slot(
        &mut self,
        handle: ModelHandle,
        slot: AddressSlot,
    ) -> Result<Option<SubscriptionChange>, ConfigError> {
        let position = self
            .models
            .subscription_slots(handle)
            .iter()
            .position(|s| *s == Some(slot))
            .ok_or(ConfigError::NotFound)?;
        let change = self.addresses.release(slot, ReferenceSide::Subscribe);
        self.models.subscription_slots_mut(handle)[position] = None;
        Ok(change)
    }

    /// Clear the whole subscription list of a model. Through a shared
    /// view this clears the root's list.
    pub fn remove_all_subscriptions(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<Vec<SubscriptionChange, { crate::SUBSCRIPTION_LIST_SIZE }>, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::NotFound)?;

        let (start, len) = self.models.subscription_span(handle);
        let mut changes = Vec::new();
        for i in start as usize..(start + len as u16) as usize {
            if let Some(slot) = self.models.subscriptions[i].take() {
                if let Some(change) = self.addresses.release(slot, ReferenceSide::Subscribe) {
                    changes.push(change).ok();
                }
            }
        }
        Ok(changes)
    }

    pub fn is_subscribed_to(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> bool {
        let Some(handle) = self.models.find(element_index, model) else {
            return false;
        };
        let Some(slot) = self.addresses.find(address) else {
            return false;
        };
        self.models
            .subscription_slots(handle)
            .contains(&Some(AddressSlot::NonVirtual(slot)))
    }

    pub fn is_subscribed_to_label(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> bool {
        let Some(handle) = self.models.find(element_index, model) else {
            return false;
        };
        let Some(slot) = self.addresses.find_virtual(label) else {
            return false;
        };
        self.models
            .subscription_slots(handle)
            .contains(&Some(AddressSlot::Virtual(slot)))
    }

    /// Fetch the next subscribed address of a model; the cursor may be
    /// held across calls and restarts once exhausted.
    pub fn next_subscription_address(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        cursor: &mut SubscriptionCursor,
    ) -> Result<Option<Address>, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let slots = self.models.subscription_slots(handle);
        while (cursor.0 as usize) < slots.len() {
            let i = cursor.0 as usize;
            cursor.0 += 1;
            if let Some(slot) = slots[i] {
                return Ok(self.addresses.address_of(slot));
            }
        }
        cursor.0 = 0;
        Ok(None)
    }

    /// `(used, total)` of the model's (possibly shared) list.
    pub fn subscription_size(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<(u8, u8), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let slots = self.models.subscription_slots(handle);
        let used = slots.iter().flatten().count() as u8;
        Ok((used, slots.len() as u8))
    }

    /// Whether any model subscribes to the given address; the relay
    /// and friendship paths filter inbound destinations with this.
    pub fn is_subscription_destination(&self, address: Address) -> bool {
        self.addresses.is_subscribed_destination(address)
    }

    // ----------------------------------------------------------------
    // Model AppKey binds
    // ----------------------------------------------------------------

    pub fn bind_app_key_to_model(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        app_key: AppKeyIndex,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let slot = self.keys.app_key_slot(app_key).ok_or(ConfigError::NotFound)?;

        let slots = self.models.bind_slots(handle);
        if slots.contains(&Some(slot)) {
            return Err(ConfigError::AlreadyExists);
        }
        let free = slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(ConfigError::OutOfMemory)?;
        self.models.bind_slots_mut(handle)[free] = Some(slot);
        Ok(())
    }

    pub fn unbind_app_key_from_model(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        app_key: AppKeyIndex,
    ) -> Result<(), ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let slot = self.keys.app_key_slot(app_key).ok_or(ConfigError::NotFound)?;

        let position = self
            .models
            .bind_slots(handle)
            .iter()
            .position(|s| *s == Some(slot))
            .ok_or(ConfigError::NotFound)?;
        self.models.bind_slots_mut(handle)[position] = None;
        Ok(())
    }

    pub fn is_app_key_bound_to_model(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        app_key: AppKeyIndex,
    ) -> bool {
        let Some(handle) = self.models.find(element_index, model) else {
            return false;
        };
        let Some(slot) = self.keys.app_key_slot(app_key) else {
            return false;
        };
        self.models.bind_slots(handle).contains(&Some(slot))
    }

    pub fn count_model_bound_app_keys(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> u8 {
        match self.models.find(element_index, model) {
            Some(handle) => self.models.bind_slots(handle).iter().flatten().count() as u8,
            None => 0,
        }
    }

    pub fn next_model_bound_app_key(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        cursor: &mut SubscriptionCursor,
    ) -> Result<Option<AppKeyIndex>, ConfigError> {
        let handle = self
            .models
            .find(element_index, model)
            .ok_or(ConfigError::InvalidParams)?;
        let slots = self.models.bind_slots(handle);
        while (cursor.0 as usize) < slots.len() {
            let i = cursor.0 as usize;
            cursor.0 += 1;
            if let Some(slot) = slots[i] {
                return Ok(self.keys.app_key_index_of(slot));
            }
        }
        cursor.0 = 0;
        Ok(None)
    }

    // ----------------------------------------------------------------
    // Keys
    // ----------------------------------------------------------------

    pub fn remove_net_key(&mut self, index: NetKeyIndex, old_only: bool) -> Result<(), ConfigError> {
        let slot = self.keys.net_key_slot(index);
        self.keys.remove_net_key(index, old_only)?;
        if !old_only && self.heartbeat.publication.net_key == slot {
            self.heartbeat.publication.net_key = None;
        }
        Ok(())
    }

    /// Remove an AppKey. A full removal also drops every model bind
    /// and publication record referencing the freed slot, so a later
    /// occupant of the slot is not silently adopted.
    pub fn remove_app_key(&mut self, index: AppKeyIndex, old_only: bool) -> Result<(), ConfigError> {
        let slot = self.keys.app_key_slot(index);
        self.keys.remove_app_key(index, old_only)?;
        if !old_only {
            if let Some(slot) = slot {
                for bind in self.models.binds.iter_mut() {
                    if *bind == Some(slot) {
                        *bind = None;
                    }
                }
                for publication in self.models.publications_using_app_key(slot) {
                    publication.app_key = None;
                }
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Heartbeat
    // ----------------------------------------------------------------

    pub fn set_heartbeat_pub_dst(&mut self, address: Address) -> Result<(), ConfigError> {
        if address.is_virtual() {
            return Err(ConfigError::InvalidParams);
        }
        let current = self.heartbeat.publication.dst;

        if address.is_unassigned() {
            let slot = current.ok_or(ConfigError::InvalidParams)?;
            self.addresses
                .release(AddressSlot::NonVirtual(slot), ReferenceSide::Publish);
            self.heartbeat.publication.dst = None;
            return Ok(());
        }

        if let Some(existing) = self.addresses.find(address) {
            if current == Some(existing) {
                return Err(ConfigError::AlreadyExists);
            }
        }
        let (slot, _) = self.addresses.insert(address, ReferenceSide::Publish)?;
        if let Some(old) = current {
            self.addresses
                .release(AddressSlot::NonVirtual(old), ReferenceSide::Publish);
        }
        self.heartbeat.publication.dst = Some(slot);
        Ok(())
    }

    pub fn heartbeat_pub_dst(&self) -> Address {
        self.heartbeat
            .publication
            .dst
            .and_then(|slot| self.addresses.address_of(AddressSlot::NonVirtual(slot)))
            .unwrap_or(Address::Unassigned)
    }

    pub fn set_heartbeat_pub_net_key(&mut self, index: NetKeyIndex) -> Result<(), ConfigError> {
        let slot = self.keys.net_key_slot(index).ok_or(ConfigError::NotFound)?;
        self.heartbeat.publication.net_key = Some(slot);
        Ok(())
    }

    pub fn heartbeat_pub_net_key(&self) -> Option<NetKeyIndex> {
        self.heartbeat
            .publication
            .net_key
            .and_then(|slot| self.keys.net_key_index_of(slot))
    }

    pub fn set_heartbeat_sub_src(
        &mut self,
        address: Address,
    ) -> Result<Vec<SubscriptionChange, 2>, ConfigError> {
        if !address.is_unassigned() && !address.is_unicast() {
            return Err(ConfigError::InvalidParams);
        }
        let current = self.heartbeat.subscription.src;
        let (dst, changes) = self.swap_heartbeat_subscribe_slot(current, address)?;
        self.heartbeat.subscription.src = dst;
        Ok(changes)
    }

    pub fn heartbeat_sub_src(&self) -> Address {
        self.heartbeat
            .subscription
            .src
            .and_then(|slot| self.addresses.address_of(AddressSlot::NonVirtual(slot)))
            .unwrap_or(Address::Unassigned)
    }

    pub fn set_heartbeat_sub_dst(
        &mut self,
        address: Address,
    ) -> Result<Vec<SubscriptionChange, 2>, ConfigError> {
        if address.is_virtual() {
            return Err(ConfigError::InvalidParams);
        }
        let current = self.heartbeat.subscription.dst;
        let (dst, changes) = self.swap_heartbeat_subscribe_slot(current, address)?;
        self.heartbeat.subscription.dst = dst;
        Ok(changes)
    }

    pub fn heartbeat_sub_dst(&self) -> Address {
        self.heartbeat
            .subscription
            .dst
            .and_then(|slot| self.addresses.address_of(AddressSlot::NonVirtual(slot)))
            .unwrap_or(Address::Unassigned)
    }

    /// Shared add/replace/clear logic for the heartbeat subscription
    /// address fields, which hold subscribe references.
    fn swap_heartbeat_subscribe_slot(
        &mut self,
        current: Option<NonVirtualSlot>,
        address: Address,
    ) -> Result<(Option<NonVirtualSlot>, Vec<SubscriptionChange, 2>), ConfigError> {
        let mut changes = Vec::new();

        if address.is_unassigned() {
            let slot = current.ok_or(ConfigError::InvalidParams)?;
            if let Some(change) = self
                .addresses
                .release(AddressSlot::NonVirtual(slot), ReferenceSide::Subscribe)
            {
                changes.push(change).ok();
            }
            return Ok((None, changes));
        }

        if let Some(existing) = self.addresses.find(address) {
            if current == Some(existing) {
                return Err(ConfigError::AlreadyExists);
            }
        }
        let (slot, change) = self.addresses.insert(address, ReferenceSide::Subscribe)?;
        if let Some(change) = change {
            changes.push(change).ok();
        }
        if let Some(old) = current {
            if let Some(change) = self
                .addresses
                .release(AddressSlot::NonVirtual(old), ReferenceSide::Subscribe)
            {
                changes.push(change).ok();
            }
        }
        Ok((Some(slot), changes))
    }

    // ----------------------------------------------------------------
    // IV state
    // ----------------------------------------------------------------

    pub fn iv_index(&self) -> (IvIndex, IvUpdateFlag) {
        (self.core.iv_index, self.core.iv_update)
    }

    pub fn set_iv_index(&mut self, iv_index: IvIndex) {
        self.core.iv_index = iv_index;
    }

    pub fn set_iv_update_in_progress(&mut self, in_progress: bool) {
        self.core.iv_update = IvUpdateFlag::from(in_progress);
    }

    // ----------------------------------------------------------------
    // Scalar state
    // ----------------------------------------------------------------

    pub fn device_key(&self) -> Option<&DeviceKey> {
        self.core.device_key.as_ref()
    }

    pub fn set_device_key(&mut self, key: DeviceKey) {
        self.core.device_key = Some(key);
    }

    pub fn default_ttl(&self) -> Ttl {
        self.core.default_ttl
    }

    pub fn set_default_ttl(&mut self, ttl: Ttl) {
        self.core.default_ttl = ttl;
    }

    pub fn features(&self) -> Features {
        Features {
            relay: self.core.relay == RelayState::Enabled,
            proxy: self.core.gatt_proxy == GattProxyState::Enabled,
            friend: self.core.friend == FriendState::Enabled,
            low_power: self.core.low_power == LowPowerState::Enabled,
        }
    }
}

// Key table, element store and plain scalar accessors that need no
// cross-table coordination are reached through these projections.
impl LocalConfig {
    pub fn keys(&self) -> &KeyTable {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut KeyTable {
        &mut self.keys
    }

    pub fn core(&self) -> &CoreState {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CoreState {
        &mut self.core
    }

    pub fn heartbeat(&self) -> &HeartbeatState {
        &self.heartbeat
    }

    pub fn heartbeat_mut(&mut self) -> &mut HeartbeatState {
        &mut self.heartbeat
    }

    pub fn addresses(&self) -> &AddressTable {
        &self.addresses
    }

    pub fn set_key_refresh_phase(
        &mut self,
        index: NetKeyIndex,
        phase: KeyRefreshPhase,
    ) -> Result<(), ConfigError> {
        self.keys.set_net_key_refresh_phase(index, phase)
    }

    pub fn key_refresh_phase(&self, index: NetKeyIndex) -> Option<KeyRefreshPhase> {
        self.keys.net_key_refresh_phase(index)
    }

    pub fn node_identity_state(&self, index: NetKeyIndex) -> Option<NodeIdentityState> {
        self.keys.node_identity_state(index)
    }

    pub fn set_node_identity_state(
        &mut self,
        index: NetKeyIndex,
        state: NodeIdentityState,
    ) -> Result<(), ConfigError> {
        self.keys.set_node_identity_state(index, state)
    }

    pub fn set_net_key(&mut self, index: NetKeyIndex, key: NetworkKey) -> Result<(), ConfigError> {
        self.keys.set_net_key(index, key)
    }

    pub fn update_net_key(
        &mut self,
        index: NetKeyIndex,
        key: NetworkKey,
    ) -> Result<(), ConfigError> {
        self.keys.update_net_key(index, key)
    }

    pub fn set_app_key(
        &mut self,
        index: AppKeyIndex,
        key: ApplicationKey,
    ) -> Result<(), ConfigError> {
        self.keys.set_app_key(index, key)
    }

    pub fn update_app_key(
        &mut self,
        index: AppKeyIndex,
        key: ApplicationKey,
    ) -> Result<(), ConfigError> {
        self.keys.update_app_key(index, key)
    }

    pub fn bind_app_key_to_net_key(
        &mut self,
        app_index: AppKeyIndex,
        net_index: NetKeyIndex,
    ) -> Result<(), ConfigError> {
        self.keys.bind_app_key(app_index, net_index)
    }

    pub fn seq(&self, element_index: u8) -> Result<Seq, ConfigError> {
        self.elements.seq(element_index)
    }

    pub fn set_seq(&mut self, element_index: u8, seq: Seq) -> Result<Option<u32>, ConfigError> {
        self.elements.set_seq(element_index, seq)
    }
}
