//! Shared doubles for node-level tests.

use crate::config::SubscriptionChange;
use crate::platform::{BeaconTarget, KeyType, NodeEvent, Platform, TimerId};
use crate::storage::MemoryBackingStore;
use crate::Node;
use meshcore_common::keys::NetKeyIndex;
use meshcore_common::{
    CompanyIdentifier, Composition, ElementDescriptor, Features, IvIndex, Location,
    ModelDescriptor, ModelIdentifier, ProductIdentifier, SubscriptionCapacity, VersionIdentifier,
};

pub(crate) const ONOFF_SERVER: ModelIdentifier = ModelIdentifier::Sig(0x1000);
pub(crate) const LEVEL_SERVER: ModelIdentifier = ModelIdentifier::Sig(0x1002);

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum PlatformCall {
    TimerStart(TimerId, u32),
    TimerStop(TimerId),
    SarTxReset,
    SarTxReject,
    SarTxAccept,
    SarRxCleanup(IvIndex),
    BeaconSend(BeaconTarget),
    RemoveKeyMaterial(KeyType, u16, bool),
    FriendshipSubscription(SubscriptionChange),
    FriendshipSecurity {
        iv_changed: bool,
        key_changed: bool,
        net_key_index: Option<NetKeyIndex>,
    },
    Event(NodeEvent),
}

/// Records every collaborator call in order.
#[derive(Default)]
pub(crate) struct RecordingPlatform {
    pub calls: Vec<PlatformCall>,
}

impl RecordingPlatform {
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn contains(&self, call: &PlatformCall) -> bool {
        self.calls.contains(call)
    }
}

impl Platform for RecordingPlatform {
    fn timer_start_sec(&mut self, timer: TimerId, seconds: u32) {
        self.calls.push(PlatformCall::TimerStart(timer, seconds));
    }

    fn timer_stop(&mut self, timer: TimerId) {
        self.calls.push(PlatformCall::TimerStop(timer));
    }

    fn sar_tx_reset(&mut self) {
        self.calls.push(PlatformCall::SarTxReset);
    }

    fn sar_tx_reject_incoming(&mut self) {
        self.calls.push(PlatformCall::SarTxReject);
    }

    fn sar_tx_accept_incoming(&mut self) {
        self.calls.push(PlatformCall::SarTxAccept);
    }

    fn sar_rx_history_cleanup(&mut self, iv_index: IvIndex) {
        self.calls.push(PlatformCall::SarRxCleanup(iv_index));
    }

    fn beacon_trigger_send(&mut self, target: BeaconTarget) {
        self.calls.push(PlatformCall::BeaconSend(target));
    }

    fn remove_key_material(&mut self, key_type: KeyType, index: u16, old_only: bool) {
        self.calls
            .push(PlatformCall::RemoveKeyMaterial(key_type, index, old_only));
    }

    fn friendship_subscription_changed(&mut self, change: SubscriptionChange) {
        self.calls.push(PlatformCall::FriendshipSubscription(change));
    }

    fn friendship_security_changed(
        &mut self,
        iv_changed: bool,
        key_changed: bool,
        net_key_index: Option<NetKeyIndex>,
    ) {
        self.calls.push(PlatformCall::FriendshipSecurity {
            iv_changed,
            key_changed,
            net_key_index,
        });
    }

    fn node_event(&mut self, event: NodeEvent) {
        self.calls.push(PlatformCall::Event(event));
    }
}

/// Two elements, two models each side, plenty of room in every table.
pub(crate) fn test_composition() -> Composition {
    let mut composition = Composition::new(
        CompanyIdentifier(0x05F1),
        ProductIdentifier(0x0001),
        VersionIdentifier(0x0001),
        Features {
            relay: true,
            proxy: false,
            friend: true,
            low_power: false,
        },
    );

    let mut element = ElementDescriptor::new(Location(0x0001));
    element
        .add_model(ModelDescriptor::new(
            ONOFF_SERVER,
            2,
            SubscriptionCapacity::Owned(4),
        ))
        .unwrap();
    composition.add_element(element).unwrap();

    let mut element = ElementDescriptor::new(Location(0x0002));
    element
        .add_model(ModelDescriptor::new(
            LEVEL_SERVER,
            2,
            SubscriptionCapacity::Owned(4),
        ))
        .unwrap();
    composition.add_element(element).unwrap();

    composition
}

pub(crate) fn test_node() -> Node<MemoryBackingStore, RecordingPlatform> {
    Node::new(
        test_composition(),
        MemoryBackingStore::default(),
        RecordingPlatform::default(),
    )
    .unwrap()
}
