//! The node: config store plus network management, wired to the
//! persistence broker and the platform capabilities.
//!
//! Every mutating operation updates the in-memory tables, pushes the
//! touched datasets through the broker, and fans out notifications.
//! Broker failures never roll the mutation back.

use crate::config::{
    AttentionAction, AttentionTick, BeaconState, FriendState, GattProxyState, KeyCursor,
    LocalConfig, LowPowerState, PublishAddress, PublishPeriod, RelayState, SubscriptionChange,
    SubscriptionCursor,
};
use crate::dispatch::NodeMsg;
use crate::error::ConfigError;
use crate::network::NetworkMgmt;
use crate::platform::{NodeEvent, Platform, TimerId};
use crate::sequence::{SequenceMonitor, ThresholdCrossing};
use crate::storage::{dataset, erase_all, load_dataset, store_dataset, BackingStore, StorageError};
use heapless::Vec;
use meshcore_common::address::{Address, LabelUuid, UnicastAddress};
use meshcore_common::keys::{
    AppKeyIndex, ApplicationKey, DeviceKey, KeyRefreshPhase, NetKeyIndex, NetworkKey,
    NodeIdentityState,
};
use meshcore_common::{Composition, Features, IvIndex, IvUpdateFlag, ModelIdentifier, Seq, Ttl};

pub struct Node<B: BackingStore, P: Platform> {
    pub(crate) composition: Composition,
    pub(crate) config: LocalConfig,
    pub(crate) monitor: SequenceMonitor,
    pub(crate) mgmt: NetworkMgmt,
    pub(crate) backing: B,
    pub(crate) platform: P,
}

impl<B: BackingStore, P: Platform> Node<B, P> {
    /// Build a node for the given composition. Fails with
    /// `InvalidConfig` when the composition does not fit the compiled
    /// table capacities.
    pub fn new(composition: Composition, backing: B, platform: P) -> Result<Self, ConfigError> {
        let config = LocalConfig::new(&composition)?;
        Ok(Self {
            composition,
            config,
            monitor: SequenceMonitor::default(),
            mgmt: NetworkMgmt::default(),
            backing,
            platform,
        })
    }

    /// Reload every dataset from the backing store. Datasets that were
    /// never written keep their constructed defaults; sequence
    /// counters resume from the persisted thresholds.
    pub fn restore(&mut self) -> Result<(), StorageError> {
        if let Some(core) = load_dataset(&mut self.backing, dataset::CORE)? {
            self.config.core = core;
        }
        if let Some(net_keys) = load_dataset(&mut self.backing, dataset::NET_KEYS)? {
            self.config.keys.net_keys = net_keys;
        }
        if let Some(app_keys) = load_dataset(&mut self.backing, dataset::APP_KEYS)? {
            self.config.keys.app_keys = app_keys;
        }
        if let Some(addresses) = load_dataset(&mut self.backing, dataset::ADDRESSES)? {
            self.config.addresses.non_virtual = addresses;
        }
        if let Some(virtuals) = load_dataset(&mut self.backing, dataset::VIRTUAL_ADDRESSES)? {
            self.config.addresses.virtuals = virtuals;
        }
        if let Some(models) = load_dataset::<_, Vec<crate::config::models::ModelEntry, { crate::MODEL_LIST_SIZE }>>(
            &mut self.backing,
            dataset::MODELS,
        )? {
            // The model layout is derived from the composition; a
            // stored table from a different composition is unusable.
            if models.len() == self.config.models.models.len() {
                self.config.models.models = models;
            } else {
                warn!("stored model table does not match composition, ignoring");
            }
        }
        if let Some(subscriptions) = load_dataset::<
            _,
            Vec<Option<crate::config::addresses::AddressSlot>, { crate::SUBSCRIPTION_LIST_SIZE }>,
        >(&mut self.backing, dataset::SUBSCRIPTIONS)?
        {
            if subscriptions.len() == self.config.models.subscriptions.len() {
                self.config.models.subscriptions = subscriptions;
            } else {
                warn!("stored subscription list does not match composition, ignoring");
            }
        }
        if let Some(binds) = load_dataset::<
            _,
            Vec<Option<crate::config::keys::AppKeySlot>, { crate::APP_KEY_BIND_LIST_SIZE }>,
        >(&mut self.backing, dataset::APP_KEY_BINDS)?
        {
            if binds.len() == self.config.models.binds.len() {
                self.config.models.binds = binds;
            } else {
                warn!("stored bind list does not match composition, ignoring");
            }
        }
        if let Some(thresholds) =
            load_dataset::<_, Vec<u32, { crate::ELEMENT_COUNT }>>(&mut self.backing, dataset::SEQ_THRESHOLDS)?
        {
            self.config.elements.restore_thresholds(&thresholds);
        }
        if let Some(heartbeat) = load_dataset(&mut self.backing, dataset::HEARTBEAT)? {
            self.config.heartbeat = heartbeat;
        }
        Ok(())
    }

    /// Provisioning reset: wipe every dataset and return to the
    /// constructed-empty state. Guard timers are stopped; a callback
    /// already in flight will observe the empty state.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        erase_all(&mut self.backing);
        self.config = LocalConfig::new(&self.composition)?;
        self.monitor.rearm();
        self.mgmt = NetworkMgmt::default();
        self.platform.timer_stop(TimerId::IvUpdateGuard);
        self.platform.timer_stop(TimerId::IvRecoveryGuard);
        for element_index in 0..self.config.element_count() {
            self.platform.timer_stop(TimerId::Attention(element_index));
        }
        Ok(())
    }

    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn handle_message(&mut self, msg: NodeMsg) {
        match msg {
            NodeMsg::AttentionTick { element_index } => self.attention_tick(element_index),
        }
    }

    // ----------------------------------------------------------------
    // Provisioning data and scalars
    // ----------------------------------------------------------------

    pub fn set_primary_address(&mut self, address: UnicastAddress) {
        self.config.set_primary_address(address);
        self.persist_core();
    }

    pub fn primary_address(&self) -> Option<UnicastAddress> {
        self.config.primary_address()
    }

    pub fn element_address(&self, element_index: u8) -> Result<UnicastAddress, ConfigError> {
        self.config.element_address(element_index)
    }

    pub fn element_index_of(&self, address: UnicastAddress) -> Option<u8> {
        self.config.element_index_of(address)
    }

    pub fn set_device_key(&mut self, key: DeviceKey) {
        self.config.set_device_key(key);
        self.persist_core();
    }

    pub fn device_key(&self) -> Option<&DeviceKey> {
        self.config.device_key()
    }

    pub fn set_default_ttl(&mut self, ttl: Ttl) {
        self.config.set_default_ttl(ttl);
        self.persist_core();
    }

    pub fn default_ttl(&self) -> Ttl {
        self.config.default_ttl()
    }

    pub fn set_relay_state(&mut self, state: RelayState) {
        self.config.core.relay = state;
        self.persist_core();
    }

    pub fn relay_state(&self) -> RelayState {
        self.config.core.relay
    }

    pub fn set_relay_retransmit(&mut self, count: u8, interval_steps: u8) {
        self.config.core.relay_retransmit_count = count;
        self.config.core.relay_retransmit_interval_steps = interval_steps;
        self.persist_core();
    }

    pub fn relay_retransmit(&self) -> (u8, u8) {
        (
            self.config.core.relay_retransmit_count,
            self.config.core.relay_retransmit_interval_steps,
        )
    }

    pub fn set_beacon_state(&mut self, state: BeaconState) {
        self.config.core.beacon = state;
        self.persist_core();
    }

    pub fn beacon_state(&self) -> BeaconState {
        self.config.core.beacon
    }

    pub fn set_gatt_proxy_state(&mut self, state: GattProxyState) {
        self.config.core.gatt_proxy = state;
        self.persist_core();
    }

    pub fn gatt_proxy_state(&self) -> GattProxyState {
        self.config.core.gatt_proxy
    }

    pub fn set_friend_state(&mut self, state: FriendState) {
        self.config.core.friend = state;
        self.persist_core();
    }

    pub fn friend_state(&self) -> FriendState {
        self.config.core.friend
    }

    pub fn set_low_power_state(&mut self, state: LowPowerState) {
        self.config.core.low_power = state;
        self.persist_core();
    }

    pub fn low_power_state(&self) -> LowPowerState {
        self.config.core.low_power
    }

    pub fn set_network_transmit(&mut self, count: u8, interval_steps: u8) {
        self.config.core.network_transmit_count = count;
        self.config.core.network_transmit_interval_steps = interval_steps;
        self.persist_core();
    }

    pub fn network_transmit(&self) -> (u8, u8) {
        (
            self.config.core.network_transmit_count,
            self.config.core.network_transmit_interval_steps,
        )
    }

    // ----------------------------------------------------------------
    // Keys
    // ----------------------------------------------------------------

    pub fn set_net_key(&mut self, index: NetKeyIndex, key: NetworkKey) -> Result<(), ConfigError> {
        self.config.set_net_key(index, key)?;
        self.persist_net_keys();
        Ok(())
    }

    pub fn update_net_key(
        &mut self,
        index: NetKeyIndex,
        key: NetworkKey,
    ) -> Result<(), ConfigError> {
        self.config.update_net_key(index, key)?;
        self.persist_net_keys();
        Ok(())
    }

    pub fn remove_net_key(&mut self, index: NetKeyIndex, old_only: bool) -> Result<(), ConfigError> {
        self.config.remove_net_key(index, old_only)?;
        self.persist_net_keys();
        if !old_only {
            self.persist_app_keys();
            self.persist_heartbeat();
        }
        Ok(())
    }

    pub fn net_key(&self, index: NetKeyIndex) -> Option<&NetworkKey> {
        self.config.keys.net_key(index)
    }

    pub fn updated_net_key(&self, index: NetKeyIndex) -> Option<&NetworkKey> {
        self.config.keys.updated_net_key(index)
    }

    pub fn count_net_keys(&self) -> u16 {
        self.config.keys.count_net_keys()
    }

    pub fn next_net_key_index(&self, cursor: &mut KeyCursor) -> Option<NetKeyIndex> {
        self.config.keys.next_net_key_index(cursor)
    }

    pub fn key_refresh_phase(&self, index: NetKeyIndex) -> Option<KeyRefreshPhase> {
        self.config.key_refresh_phase(index)
    }

    pub fn node_identity_state(&self, index: NetKeyIndex) -> Option<NodeIdentityState> {
        self.config.node_identity_state(index)
    }

    pub fn set_node_identity_state(
        &mut self,
        index: NetKeyIndex,
        state: NodeIdentityState,
    ) -> Result<(), ConfigError> {
        self.config.set_node_identity_state(index, state)?;
        self.persist_net_keys();
        Ok(())
    }

    pub fn set_app_key(
        &mut self,
        index: AppKeyIndex,
        key: ApplicationKey,
    ) -> Result<(), ConfigError> {
        self.config.set_app_key(index, key)?;
        self.persist_app_keys();
        Ok(())
    }

    pub fn update_app_key(
        &mut self,
        index: AppKeyIndex,
        key: ApplicationKey,
    ) -> Result<(), ConfigError> {
        self.config.update_app_key(index, key)?;
        self.persist_app_keys();
        Ok(())
    }

    pub fn remove_app_key(&mut self, index: AppKeyIndex, old_only: bool) -> Result<(), ConfigError> {
        self.config.remove_app_key(index, old_only)?;
        self.persist_app_keys();
        if !old_only {
            self.persist_binds();
            self.persist_models();
        }
        Ok(())
    }

    pub fn app_key(&self, index: AppKeyIndex) -> Option<&ApplicationKey> {
        self.config.keys.app_key(index)
    }

    pub fn updated_app_key(&self, index: AppKeyIndex) -> Option<&ApplicationKey> {
        self.config.keys.updated_app_key(index)
    }

    pub fn bind_app_key_to_net_key(
        &mut self,
        app_index: AppKeyIndex,
        net_index: NetKeyIndex,
    ) -> Result<(), ConfigError> {
        self.config.bind_app_key_to_net_key(app_index, net_index)?;
        self.persist_app_keys();
        Ok(())
    }

    pub fn unbind_app_key_from_net_key(
        &mut self,
        app_index: AppKeyIndex,
        net_index: NetKeyIndex,
    ) -> Result<(), ConfigError> {
        self.config.keys.unbind_app_key(app_index, net_index)?;
        self.persist_app_keys();
        Ok(())
    }

    pub fn bound_net_key_index(&self, app_index: AppKeyIndex) -> Option<NetKeyIndex> {
        self.config.keys.bound_net_key_index(app_index)
    }

    pub fn count_bound_app_keys(&self, net_index: NetKeyIndex) -> u16 {
        self.config.keys.count_bound_app_keys(net_index)
    }

    pub fn next_bound_app_key(
        &self,
        net_index: NetKeyIndex,
        cursor: &mut KeyCursor,
    ) -> Option<AppKeyIndex> {
        self.config.keys.next_bound_app_key(net_index, cursor)
    }

    // ----------------------------------------------------------------
    // Model publication
    // ----------------------------------------------------------------

    pub fn set_publish_address(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> Result<(), ConfigError> {
        self.config
            .set_publish_address(element_index, model, address)?;
        self.persist_addresses();
        self.persist_virtual_addresses();
        self.persist_models();
        Ok(())
    }

    pub fn set_publish_virtual_address(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> Result<(), ConfigError> {
        self.config
            .set_publish_virtual_address(element_index, model, label)?;
        self.persist_addresses();
        self.persist_virtual_addresses();
        self.persist_models();
        Ok(())
    }

    pub fn publish_address(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<PublishAddress, ConfigError> {
        self.config.publish_address(element_index, model)
    }

    pub fn set_publish_app_key(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        app_key: AppKeyIndex,
    ) -> Result<(), ConfigError> {
        self.config
            .set_publish_app_key(element_index, model, app_key)?;
        self.persist_models();
        Ok(())
    }

    pub fn publish_app_key(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<Option<AppKeyIndex>, ConfigError> {
        self.config.publish_app_key(element_index, model)
    }

    pub fn set_publish_period(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        period: PublishPeriod,
    ) -> Result<(), ConfigError> {
        self.config
            .set_publish_period(element_index, model, period)?;
        self.persist_models();
        Ok(())
    }

    pub fn set_publish_ttl(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        ttl: Ttl,
    ) -> Result<(), ConfigError> {
        self.config.set_publish_ttl(element_index, model, ttl)?;
        self.persist_models();
        Ok(())
    }

    pub fn set_publish_friendship_credential(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        friendship_credential: bool,
    ) -> Result<(), ConfigError> {
        self.config.set_publish_friendship_credential(
            element_index,
            model,
            friendship_credential,
        )?;
        self.persist_models();
        Ok(())
    }

    pub fn set_publish_retransmit(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        count: u8,
        interval_steps: u8,
    ) -> Result<(), ConfigError> {
        self.config
            .set_publish_retransmit(element_index, model, count, interval_steps)?;
        self.persist_models();
        Ok(())
    }

    // ----------------------------------------------------------------
    // Model subscriptions
    // ----------------------------------------------------------------

    pub fn add_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> Result<(), ConfigError> {
        let change = self.config.add_subscription(element_index, model, address)?;
        self.persist_addresses();
        self.persist_subscriptions();
        self.notify_subscription_change(change);
        Ok(())
    }

    pub fn add_virtual_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> Result<(), ConfigError> {
        let change = self
            .config
            .add_virtual_subscription(element_index, model, label)?;
        self.persist_virtual_addresses();
        self.persist_subscriptions();
        self.notify_subscription_change(change);
        Ok(())
    }

    pub fn remove_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> Result<(), ConfigError> {
        let change = self
            .config
            .remove_subscription(element_index, model, address)?;
        self.persist_addresses();
        self.persist_subscriptions();
        self.notify_subscription_change(change);
        Ok(())
    }

    pub fn remove_virtual_subscription(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> Result<(), ConfigError> {
        let change = self
            .config
            .remove_virtual_subscription(element_index, model, label)?;
        self.persist_virtual_addresses();
        self.persist_subscriptions();
        self.notify_subscription_change(change);
        Ok(())
    }

    pub fn remove_all_subscriptions(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<(), ConfigError> {
        let changes = self
            .config
            .remove_all_subscriptions(element_index, model)?;
        self.persist_addresses();
        self.persist_virtual_addresses();
        self.persist_subscriptions();
        for change in changes {
            self.platform.friendship_subscription_changed(change);
        }
        Ok(())
    }

    pub fn is_subscribed_to(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        address: Address,
    ) -> bool {
        self.config.is_subscribed_to(element_index, model, address)
    }

    pub fn is_subscribed_to_label(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        label: &LabelUuid,
    ) -> bool {
        self.config
            .is_subscribed_to_label(element_index, model, label)
    }

    pub fn next_subscription_address(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        cursor: &mut SubscriptionCursor,
    ) -> Result<Option<Address>, ConfigError> {
        self.config
            .next_subscription_address(element_index, model, cursor)
    }

    pub fn subscription_size(
        &self,
        element_index: u8,
        model: ModelIdentifier,
    ) -> Result<(u8, u8), ConfigError> {
        self.config.subscription_size(element_index, model)
    }

    pub fn is_subscription_destination(&self, address: Address) -> bool {
        self.config.is_subscription_destination(address)
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
        self.config
            .bind_app_key_to_model(element_index, model, app_key)?;
        self.persist_binds();
        Ok(())
    }

    pub fn unbind_app_key_from_model(
        &mut self,
        element_index: u8,
        model: ModelIdentifier,
        app_key: AppKeyIndex,
    ) -> Result<(), ConfigError> {
        self.config
            .unbind_app_key_from_model(element_index, model, app_key)?;
        self.persist_binds();
        Ok(())
    }

    pub fn is_app_key_bound_to_model(
        &self,
        element_index: u8,
        model: ModelIdentifier,
        app_key: AppKeyIndex,
    ) -> bool {
        self.config
            .is_app_key_bound_to_model(element_index, model, app_key)
    }

    // ----------------------------------------------------------------
    // Attention and sequence numbers
    // ----------------------------------------------------------------

    /// Set the attention countdown of an element. Nonzero starts the
    /// 1 Hz countdown; zero cancels it and reports attention-off
    /// immediately.
    pub fn set_attention(&mut self, element_index: u8, seconds: u8) -> Result<(), ConfigError> {
        match self.config.elements.set_attention(element_index, seconds)? {
            AttentionAction::Started => {
                self.platform.node_event(NodeEvent::AttentionChanged {
                    element_index,
                    on: true,
                });
                self.platform
                    .timer_start_sec(TimerId::Attention(element_index), 1);
            }
            AttentionAction::Stopped => {
                self.platform.node_event(NodeEvent::AttentionChanged {
                    element_index,
                    on: false,
                });
                self.platform.timer_stop(TimerId::Attention(element_index));
            }
        }
        Ok(())
    }

    pub fn attention(&self, element_index: u8) -> u8 {
        self.config.elements.attention(element_index)
    }

    fn attention_tick(&mut self, element_index: u8) {
        match self.config.elements.tick_attention(element_index) {
            AttentionTick::Expired => {
                self.platform.node_event(NodeEvent::AttentionChanged {
                    element_index,
                    on: false,
                });
            }
            AttentionTick::Rearm => {
                self.platform
                    .timer_start_sec(TimerId::Attention(element_index), 1);
            }
            AttentionTick::Idle => {}
        }
    }

    pub fn seq(&self, element_index: u8) -> Result<Seq, ConfigError> {
        self.config.seq(element_index)
    }

    /// Set an element's sequence counter. The NVM threshold is
    /// re-derived on every call and persisted when it moves, and the
    /// sequence monitor feeds network management.
    pub fn set_seq(&mut self, element_index: u8, seq: Seq) -> Result<(), ConfigError> {
        if self.config.set_seq(element_index, seq)?.is_some() {
            self.persist_seq_thresholds();
        }
        if let Some(crossing) = self.monitor.observe(seq) {
            self.handle_seq_threshold(crossing);
        }
        Ok(())
    }

    pub fn seq_threshold(&self, element_index: u8) -> u32 {
        self.config.elements.seq_threshold(element_index)
    }

    /// Zero every element's sequence counter and threshold, and re-arm
    /// the pressure monitor (IV transition / recovery path).
    pub(crate) fn reset_sequence_numbers(&mut self) {
        self.config.elements.reset_sequences();
        self.persist_seq_thresholds();
        self.monitor.rearm();
    }

    // ----------------------------------------------------------------
    // Heartbeat
    // ----------------------------------------------------------------

    pub fn set_heartbeat_pub_dst(&mut self, address: Address) -> Result<(), ConfigError> {
        self.config.set_heartbeat_pub_dst(address)?;
        self.persist_addresses();
        self.persist_heartbeat();
        Ok(())
    }

    pub fn heartbeat_pub_dst(&self) -> Address {
        self.config.heartbeat_pub_dst()
    }

    pub fn set_heartbeat_pub_net_key(&mut self, index: NetKeyIndex) -> Result<(), ConfigError> {
        self.config.set_heartbeat_pub_net_key(index)?;
        self.persist_heartbeat();
        Ok(())
    }

    pub fn heartbeat_pub_net_key(&self) -> Option<NetKeyIndex> {
        self.config.heartbeat_pub_net_key()
    }

    pub fn set_heartbeat_pub_count_log(&mut self, count_log: u8) {
        self.config.heartbeat.publication.count_log = count_log;
        self.persist_heartbeat();
    }

    pub fn heartbeat_pub_count_log(&self) -> u8 {
        self.config.heartbeat.publication.count_log
    }

    pub fn set_heartbeat_pub_period_log(&mut self, period_log: u8) {
        self.config.heartbeat.publication.period_log = period_log;
        self.persist_heartbeat();
    }

    pub fn heartbeat_pub_period_log(&self) -> u8 {
        self.config.heartbeat.publication.period_log
    }

    pub fn set_heartbeat_pub_ttl(&mut self, ttl: Ttl) {
        self.config.heartbeat.publication.ttl = ttl;
        self.persist_heartbeat();
    }

    pub fn heartbeat_pub_ttl(&self) -> Ttl {
        self.config.heartbeat.publication.ttl
    }

    pub fn set_heartbeat_pub_features(&mut self, features: Features) {
        self.config.heartbeat.publication.features = features;
        self.persist_heartbeat();
    }

    pub fn heartbeat_pub_features(&self) -> Features {
        self.config.heartbeat.publication.features
    }

    pub fn set_heartbeat_sub_src(&mut self, address: Address) -> Result<(), ConfigError> {
        let changes = self.config.set_heartbeat_sub_src(address)?;
        self.persist_addresses();
        self.persist_heartbeat();
        for change in changes {
            self.platform.friendship_subscription_changed(change);
        }
        Ok(())
    }

    pub fn heartbeat_sub_src(&self) -> Address {
        self.config.heartbeat_sub_src()
    }

    pub fn set_heartbeat_sub_dst(&mut self, address: Address) -> Result<(), ConfigError> {
        let changes = self.config.set_heartbeat_sub_dst(address)?;
        self.persist_addresses();
        self.persist_heartbeat();
        for change in changes {
            self.platform.friendship_subscription_changed(change);
        }
        Ok(())
    }

    pub fn heartbeat_sub_dst(&self) -> Address {
        self.config.heartbeat_sub_dst()
    }

    pub fn set_heartbeat_sub_count_log(&mut self, count_log: u8) {
        self.config.heartbeat.subscription.count_log = count_log;
        self.persist_heartbeat();
    }

    pub fn heartbeat_sub_count_log(&self) -> u8 {
        self.config.heartbeat.subscription.count_log
    }

    pub fn set_heartbeat_sub_period_log(&mut self, period_log: u8) {
        self.config.heartbeat.subscription.period_log = period_log;
        self.persist_heartbeat();
    }

    pub fn heartbeat_sub_period_log(&self) -> u8 {
        self.config.heartbeat.subscription.period_log
    }

    pub fn set_heartbeat_sub_min_hops(&mut self, min_hops: u8) {
        self.config.heartbeat.subscription.min_hops = min_hops;
        self.persist_heartbeat();
    }

    pub fn heartbeat_sub_min_hops(&self) -> u8 {
        self.config.heartbeat.subscription.min_hops
    }

    pub fn set_heartbeat_sub_max_hops(&mut self, max_hops: u8) {
        self.config.heartbeat.subscription.max_hops = max_hops;
        self.persist_heartbeat();
    }

    pub fn heartbeat_sub_max_hops(&self) -> u8 {
        self.config.heartbeat.subscription.max_hops
    }

    // ----------------------------------------------------------------
    // IV state
    // ----------------------------------------------------------------

    pub fn iv_index(&self) -> (IvIndex, IvUpdateFlag) {
        self.config.iv_index()
    }

    pub(crate) fn set_iv_index(&mut self, iv_index: IvIndex) {
        self.config.set_iv_index(iv_index);
        self.persist_core();
        self.platform.node_event(NodeEvent::IvUpdated { iv_index });
    }

    pub(crate) fn set_iv_update_in_progress(&mut self, in_progress: bool) {
        self.config.set_iv_update_in_progress(in_progress);
        self.persist_core();
    }

    // ----------------------------------------------------------------
    // Broker plumbing
    // ----------------------------------------------------------------

    fn notify_subscription_change(&mut self, change: Option<SubscriptionChange>) {
        if let Some(change) = change {
            self.platform.friendship_subscription_changed(change);
        }
    }

    pub(crate) fn persist_core(&mut self) {
        store_dataset(&mut self.backing, dataset::CORE, &self.config.core);
    }

    pub(crate) fn persist_net_keys(&mut self) {
        store_dataset(
            &mut self.backing,
            dataset::NET_KEYS,
            &self.config.keys.net_keys,
        );
    }

    pub(crate) fn persist_app_keys(&mut self) {
        store_dataset(
            &mut self.backing,
            dataset::APP_KEYS,
            &self.config.keys.app_keys,
        );
    }

    pub(crate) fn persist_binds(&mut self) {
        store_dataset(
            &mut self.backing,
            dataset::APP_KEY_BINDS,
            &self.config.models.binds,
        );
    }

    pub(crate) fn persist_addresses(&mut self) {
        store_dataset(
            &mut self.backing,
            dataset::ADDRESSES,
            &self.config.addresses.non_virtual,
        );
    }

    pub(crate) fn persist_virtual_addresses(&mut self) {
        store_dataset(
            &mut self.backing,
            dataset::VIRTUAL_ADDRESSES,
            &self.config.addresses.virtuals,
        );
    }

    pub(crate) fn persist_subscriptions(&mut self) {
        store_dataset(
            &mut self.backing,
            dataset::SUBSCRIPTIONS,
            &self.config.models.subscriptions,
        );
    }

    pub(crate) fn persist_seq_thresholds(&mut self) {
        store_dataset(
            &mut self.backing,
            dataset::SEQ_THRESHOLDS,
            &self.config.elements.seq_thresholds,
        );
    }

    pub(crate) fn persist_models(&mut self) {
        store_dataset(&mut self.backing, dataset::MODELS, &self.config.models.models);
    }

    pub(crate) fn persist_heartbeat(&mut self) {
        store_dataset(&mut self.backing, dataset::HEARTBEAT, &self.config.heartbeat);
    }

    pub(crate) fn handle_seq_threshold(&mut self, crossing: ThresholdCrossing) {
        let (_, local_update) = self.config.iv_index();
        match crossing {
            ThresholdCrossing::Low => {
                // Only the primary subnet drives the node's IV.
                if self.config.key_refresh_phase(NetKeyIndex::PRIMARY).is_none() {
                    return;
                }
                if !local_update.is_in_progress() {
                    self.request_iv_update();
                }
            }
            ThresholdCrossing::High => {
                if local_update.is_in_progress() {
                    self.request_normal_resume();
                }
            }
        }
    }
}
