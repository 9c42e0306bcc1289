//! Collaborator capabilities injected into the node.
//!
//! The core never blocks: timers, SAR engines, the beacon scheduler
//! and the Friend feature are driven through this trait, and anything
//! they need to say back arrives as a message on the dispatch thread
//! (see [`crate::dispatch`]). Implementations must not call back into
//! the node from inside these methods.

use crate::config::SubscriptionChange;
use meshcore_common::keys::NetKeyIndex;
use meshcore_common::IvIndex;

/// Timers the node asks the host scheduler to run.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// 96 hour guard between IV transitions.
    IvUpdateGuard,
    /// 192 hour guard between IV recoveries.
    IvRecoveryGuard,
    /// 1 Hz attention countdown of one element.
    Attention(u8),
}

/// Which subnets a beacon send is triggered for.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeaconTarget {
    Subnet(NetKeyIndex),
    AllSubnets,
}

/// Key material class for security-layer eviction.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyType {
    Network,
    Application,
}

/// Events surfaced to the application.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeEvent {
    AttentionChanged { element_index: u8, on: bool },
    IvUpdated { iv_index: IvIndex },
}

/// The capability set the node runs against.
pub trait Platform {
    /// Start (or restart) a host timer with second resolution; expiry
    /// comes back as a dispatch message.
    fn timer_start_sec(&mut self, timer: TimerId, seconds: u32);

    fn timer_stop(&mut self, timer: TimerId);

    /// Abort all in-flight SAR transmit transactions.
    fn sar_tx_reset(&mut self);

    /// Make SAR transmit refuse new transactions while an IV
    /// transition is waiting for in-flight ones to drain.
    fn sar_tx_reject_incoming(&mut self);

    fn sar_tx_accept_incoming(&mut self);

    /// Drop SAR receive history that does not match the given IV.
    fn sar_rx_history_cleanup(&mut self, iv_index: IvIndex);

    /// Queue Secure Network Beacon transmission for one or all
    /// subnets.
    fn beacon_trigger_send(&mut self, target: BeaconTarget);

    /// Evict derived key material after a Key Refresh revocation.
    fn remove_key_material(&mut self, key_type: KeyType, index: u16, old_only: bool);

    /// The subscribed-address set changed (Friend feature bookkeeping).
    fn friendship_subscription_changed(&mut self, change: SubscriptionChange);

    /// IV or key-refresh state changed; `net_key_index` is set when
    /// `key_changed` is.
    fn friendship_security_changed(
        &mut self,
        iv_changed: bool,
        key_changed: bool,
        net_key_index: Option<NetKeyIndex>,
    );

    fn node_event(&mut self, event: NodeEvent);
}
