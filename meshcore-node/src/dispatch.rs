//! Messages delivered to the node on its single dispatch thread.
//!
//! Timer expirations and SAR verdicts are not callbacks: the host
//! loop posts them here and the node processes them to completion,
//! one at a time.

use meshcore_common::keys::NetKeyIndex;
use meshcore_common::{IvIndex, IvUpdateFlag, KeyRefreshFlag};

/// Authenticated beacon content handed to network management by the
/// beacon receiver. `new_key_used` tells which of the subnet's keys
/// authenticated the beacon.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BeaconData {
    pub net_key_index: NetKeyIndex,
    pub new_key_used: bool,
    pub iv_index: IvIndex,
    pub key_refresh_flag: KeyRefreshFlag,
    pub iv_update_flag: IvUpdateFlag,
}

/// Network management inbox.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkMgmtMsg {
    /// SAR transmit has drained; a transition to normal operation may
    /// proceed.
    IvUpdateAllowed,
    /// SAR transmit has in-flight transactions; defer the transition.
    IvUpdateDisallowed,
    IvUpdateGuardExpired,
    IvRecoveryGuardExpired,
    /// Provisioning completed; arm the IV update guard.
    ProvisioningComplete,
}

/// Node inbox for everything outside network management.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeMsg {
    /// 1 Hz attention tick for one element.
    AttentionTick { element_index: u8 },
}
