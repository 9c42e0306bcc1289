//! Heartbeat publication and subscription state.
//!
//! Addresses are held as refcounted slots in the address arena; the
//! log/hop fields are stored verbatim, their semantics belong to the
//! heartbeat engine.

use crate::config::addresses::NonVirtualSlot;
use crate::config::keys::NetKeySlot;
use meshcore_common::{Features, Ttl};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartbeatPublication {
    pub(crate) dst: Option<NonVirtualSlot>,
    pub(crate) net_key: Option<NetKeySlot>,
    pub(crate) count_log: u8,
    pub(crate) period_log: u8,
    pub(crate) ttl: Ttl,
    pub(crate) features: Features,
}

#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartbeatSubscription {
    pub(crate) src: Option<NonVirtualSlot>,
    pub(crate) dst: Option<NonVirtualSlot>,
    pub(crate) count_log: u8,
    pub(crate) period_log: u8,
    pub(crate) min_hops: u8,
    pub(crate) max_hops: u8,
}

#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartbeatState {
    pub(crate) publication: HeartbeatPublication,
    pub(crate) subscription: HeartbeatSubscription,
}
