//! Per-model publication records, AppKey bindings and subscription
//! views.
//!
//! Model instances are fixed at construction from the composition.
//! AppKey bindings and subscription slots live in two node-wide slabs;
//! every model owns a span of each, except models that declare a
//! shared subscription list, whose view resolves through their root
//! model at call time.

use crate::config::addresses::AddressSlot;
use crate::config::keys::AppKeySlot;
use crate::error::ConfigError;
use crate::{APP_KEY_BIND_LIST_SIZE, MODEL_LIST_SIZE, SUBSCRIPTION_LIST_SIZE};
use heapless::Vec;
use meshcore_common::{Composition, ModelIdentifier, SubscriptionCapacity, Ttl};
use serde::{Deserialize, Serialize};

/// Index of a model instance in the model table.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModelHandle(pub(crate) u16);

/// Publish period as the packed steps/resolution octet of the model
/// publication state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishPeriod {
    period: u8,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    Milliseconds100,
    Seconds1,
    Seconds10,
    Minutes10,
}

impl PublishPeriod {
    pub fn new(steps: u8, resolution: Resolution) -> Self {
        let resolution = match resolution {
            Resolution::Milliseconds100 => 0b00,
            Resolution::Seconds1 => 0b01,
            Resolution::Seconds10 => 0b10,
            Resolution::Minutes10 => 0b11,
        };
        Self {
            period: (steps << 2) | resolution,
        }
    }

    pub fn steps(&self) -> u8 {
        (self.period & 0b11111100) >> 2
    }

    pub fn resolution(&self) -> Resolution {
        match self.period & 0b11 {
            0b00 => Resolution::Milliseconds100,
            0b01 => Resolution::Seconds1,
            0b10 => Resolution::Seconds10,
            _ => Resolution::Minutes10,
        }
    }
}

impl From<u8> for PublishPeriod {
    fn from(period: u8) -> Self {
        Self { period }
    }
}

impl From<PublishPeriod> for u8 {
    fn from(val: PublishPeriod) -> Self {
        val.period
    }
}

/// Model publication state; the destination is a refcounted slot in
/// the address arena.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Publication {
    pub(crate) address: Option<AddressSlot>,
    pub(crate) app_key: Option<AppKeySlot>,
    pub(crate) ttl: Ttl,
    pub(crate) credential_flag: bool,
    pub(crate) period: PublishPeriod,
    pub(crate) retransmit_count: u8,
    pub(crate) retransmit_interval_steps: u8,
}

impl Publication {
    pub fn app_key(&self) -> Option<AppKeySlot> {
        self.app_key
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn credential_flag(&self) -> bool {
        self.credential_flag
    }

    pub fn period(&self) -> PublishPeriod {
        self.period
    }

    pub fn retransmit_count(&self) -> u8 {
        self.retransmit_count
    }

    pub fn retransmit_interval_steps(&self) -> u8 {
        self.retransmit_interval_steps
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum SubscriptionView {
    Owned { start: u16, len: u8 },
    Shared { root: ModelHandle },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct ModelEntry {
    pub(crate) element_index: u8,
    pub(crate) model_identifier: ModelIdentifier,
    pub(crate) publication: Publication,
    pub(crate) bind_start: u16,
    pub(crate) bind_len: u8,
    pub(crate) subscription: SubscriptionView,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModelTable<
    const M: usize = MODEL_LIST_SIZE,
    const S: usize = SUBSCRIPTION_LIST_SIZE,
    const B: usize = APP_KEY_BIND_LIST_SIZE,
> {
    pub(crate) models: Vec<ModelEntry, M>,
    pub(crate) subscriptions: Vec<Option<AddressSlot>, S>,
    pub(crate) binds: Vec<Option<AppKeySlot>, B>,
}

impl<const M: usize, const S: usize, const B: usize> ModelTable<M, S, B> {
    /// Lay out the model table from the composition: one entry per
    /// declared model, bind and subscription spans carved out of the
    /// node-wide slabs, shared views resolved to their root.
    pub fn new(composition: &Composition) -> Result<Self, ConfigError> {
        let mut models: Vec<ModelEntry, M> = Vec::new();
        let mut subscr_next: u16 = 0;
        let mut bind_next: u16 = 0;

        for (element_index, element) in composition.elements_iter().enumerate() {
            for descriptor in element.models_iter() {
                let subscription = match descriptor.subscription_capacity {
                    SubscriptionCapacity::Owned(len) => {
                        let start = subscr_next;
                        subscr_next = subscr_next
                            .checked_add(len as u16)
                            .ok_or(ConfigError::InvalidConfig)?;
                        SubscriptionView::Owned { start, len }
                    }
                    // Root handle is resolved in the second pass.
                    SubscriptionCapacity::Shared(_) => SubscriptionView::Shared {
                        root: ModelHandle(u16::MAX),
                    },
                };

                let entry = ModelEntry {
                    element_index: element_index as u8,
                    model_identifier: descriptor.model_identifier,
                    publication: Publication::default(),
                    bind_start: bind_next,
                    bind_len: descriptor.app_key_bind_capacity,
                    subscription,
                };
                bind_next = bind_next
                    .checked_add(descriptor.app_key_bind_capacity as u16)
                    .ok_or(ConfigError::InvalidConfig)?;
                models.push(entry).map_err(|_| ConfigError::InvalidConfig)?;
            }
        }

        if subscr_next as usize > S || bind_next as usize > B {
            return Err(ConfigError::InvalidConfig);
        }

        let mut table = Self {
            models,
            subscriptions: Vec::new(),
            binds: Vec::new(),
        };
        table.subscriptions.resize(subscr_next as usize, None).ok();
        table.binds.resize(bind_next as usize, None).ok();

        // Resolve shared subscription views against their roots.
        let mut flat = 0;
        for element in composition.elements_iter() {
            for descriptor in element.models_iter() {
                if let SubscriptionCapacity::Shared(root) = descriptor.subscription_capacity {
                    let root_handle = table
                        .find(root.element_index, root.model_identifier)
                        .ok_or(ConfigError::InvalidConfig)?;
                    if root_handle.0 as usize == flat {
                        return Err(ConfigError::InvalidConfig);
                    }
                    match table.models[root_handle.0 as usize].subscription {
                        SubscriptionView::Owned { .. } => {
                            table.models[flat].subscription = SubscriptionView::Shared {
                                root: root_handle,
                            };
                        }
                        // Chained sharing is not a valid composition.
                        SubscriptionView::Shared { .. } => {
                            return Err(ConfigError::InvalidConfig);
                        }
                    }
                }
                flat += 1;
            }
        }

        Ok(table)
    }

    pub fn find(
        &self,
        element_index: u8,
        model_identifier: ModelIdentifier,
    ) -> Option<ModelHandle> {
        self.models.iter().enumerate().find_map(|(i, entry)| {
            (entry.element_index == element_index
                && entry.model_identifier == model_identifier)
                .then_some(ModelHandle(i as u16))
        })
    }

    pub fn exists(&self, element_index: u8, model_identifier: ModelIdentifier) -> bool {
        self.find(element_index, model_identifier).is_some()
    }

    pub fn publication(&self, handle: ModelHandle) -> &Publication {
        &self.models[handle.0 as usize].publication
    }

    pub(crate) fn publication_mut(&mut self, handle: ModelHandle) -> &mut Publication {
        &mut self.models[handle.0 as usize].publication
    }

    /// The `(start, len)` of the subscription span, following a shared
    /// view through its root.
    pub(crate) fn subscription_span(&self, handle: ModelHandle) -> (u16, u8) {
        match self.models[handle.0 as usize].subscription {
            SubscriptionView::Owned { start, len } => (start, len),
            SubscriptionView::Shared { root } => match self.models[root.0 as usize].subscription {
                SubscriptionView::Owned { start, len } => (start, len),
                // New always resolves shared views to owned roots.
                SubscriptionView::Shared { .. } => (0, 0),
            },
        }
    }

    pub(crate) fn subscription_slots(&self, handle: ModelHandle) -> &[Option<AddressSlot>] {
        let (start, len) = self.subscription_span(handle);
        &self.subscriptions[start as usize..(start + len as u16) as usize]
    }

    pub(crate) fn subscription_slots_mut(
        &mut self,
        handle: ModelHandle,
    ) -> &mut [Option<AddressSlot>] {
        let (start, len) = self.subscription_span(handle);
        &mut self.subscriptions[start as usize..(start + len as u16) as usize]
    }

    pub(crate) fn bind_slots(&self, handle: ModelHandle) -> &[Option<AppKeySlot>] {
        let entry = &self.models[handle.0 as usize];
        &self.binds[entry.bind_start as usize..(entry.bind_start + entry.bind_len as u16) as usize]
    }

    pub(crate) fn bind_slots_mut(&mut self, handle: ModelHandle) -> &mut [Option<AppKeySlot>] {
        let entry = &self.models[handle.0 as usize];
        let start = entry.bind_start as usize;
        let end = start + entry.bind_len as usize;
        &mut self.binds[start..end]
    }

    /// Models whose publication references the given AppKey slot.
    pub(crate) fn publications_using_app_key(
        &mut self,
        app_key: AppKeySlot,
    ) -> impl Iterator<Item = &mut Publication> + '_ {
        self.models
            .iter_mut()
            .map(|entry| &mut entry.publication)
            .filter(move |publication| publication.app_key == Some(app_key))
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = ModelHandle> + '_ {
        (0..self.models.len()).map(|i| ModelHandle(i as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcore_common::{
        CompanyIdentifier, Composition, ElementDescriptor, Features, Location, ModelDescriptor,
        ModelRef, ProductIdentifier, SubscriptionCapacity, VersionIdentifier,
    };

    const ONOFF_SERVER: ModelIdentifier = ModelIdentifier::Sig(0x1000);
    const LEVEL_SERVER: ModelIdentifier = ModelIdentifier::Sig(0x1002);

    fn composition_with(
        subscription: SubscriptionCapacity,
    ) -> Composition {
        let mut composition = Composition::new(
            CompanyIdentifier(0x05F1),
            ProductIdentifier(0x0001),
            VersionIdentifier(0x0001),
            Features::default(),
        );
        let mut element = ElementDescriptor::new(Location(0x0001));
        element
            .add_model(ModelDescriptor::new(
                ONOFF_SERVER,
                2,
                SubscriptionCapacity::Owned(4),
            ))
            .unwrap();
        element
            .add_model(ModelDescriptor::new(LEVEL_SERVER, 2, subscription))
            .unwrap();
        composition.add_element(element).unwrap();
        composition
    }

    #[test]
    fn spans_are_carved_in_declaration_order() {
        let composition = composition_with(SubscriptionCapacity::Owned(3));
        let table: ModelTable<4, 8, 8> = ModelTable::new(&composition).unwrap();

        let onoff = table.find(0, ONOFF_SERVER).unwrap();
        let level = table.find(0, LEVEL_SERVER).unwrap();
        assert_eq!(table.subscription_span(onoff), (0, 4));
        assert_eq!(table.subscription_span(level), (4, 3));
        assert_eq!(table.bind_slots(onoff).len(), 2);
        assert_eq!(table.bind_slots(level).len(), 2);
        assert_eq!(table.subscriptions.len(), 7);
        assert_eq!(table.binds.len(), 4);
    }

    #[test]
    fn shared_view_resolves_through_root() {
        let composition = composition_with(SubscriptionCapacity::Shared(ModelRef {
            element_index: 0,
            model_identifier: ONOFF_SERVER,
        }));
        let table: ModelTable<4, 8, 8> = ModelTable::new(&composition).unwrap();

        let onoff = table.find(0, ONOFF_SERVER).unwrap();
        let level = table.find(0, LEVEL_SERVER).unwrap();
        assert_eq!(table.subscription_span(level), table.subscription_span(onoff));
    }

    #[test]
    fn missing_shared_root_is_invalid_config() {
        let composition = composition_with(SubscriptionCapacity::Shared(ModelRef {
            element_index: 0,
            model_identifier: ModelIdentifier::Sig(0x9999),
        }));
        assert!(matches!(
            ModelTable::<4, 8, 8>::new(&composition),
            Err(ConfigError::InvalidConfig)
        ));
    }

    #[test]
    fn oversized_slabs_are_invalid_config() {
        let composition = composition_with(SubscriptionCapacity::Owned(30));
        assert!(matches!(
            ModelTable::<4, 8, 8>::new(&composition),
            Err(ConfigError::InvalidConfig)
        ));
    }

    #[test]
    fn publish_period_packing() {
        let period = PublishPeriod::new(5, Resolution::Seconds10);
        assert_eq!(period.steps(), 5);
        assert_eq!(period.resolution(), Resolution::Seconds10);
        assert_eq!(u8::from(period), 0b000101_10);
        assert_eq!(PublishPeriod::from(0b000101_10u8), period);
    }
}
