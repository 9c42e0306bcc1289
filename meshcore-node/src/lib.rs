//! Mesh node core: the authoritative configuration store and the
//! network management state machine.
//!
//! The node owns every table by value and runs on a single dispatch
//! thread. Collaborators (timers, SAR engines, the beacon scheduler,
//! the Friend feature, durable storage) are injected behind
//! [`platform::Platform`] and [`storage::BackingStore`]; anything they
//! need to tell the node comes back as a [`dispatch`] message.

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod platform;
pub mod sequence;
pub mod storage;

mod node;
#[cfg(test)]
pub(crate) mod test_util;

pub use error::ConfigError;
pub use node::Node;

/// Maximum number of elements.
pub const ELEMENT_COUNT: usize = meshcore_common::MAX_ELEMENTS;

/// Non-virtual address list capacity.
pub const NON_VIRTUAL_ADDRESS_LIST_SIZE: usize = 8;

/// Virtual address list capacity; sized independently of the
/// non-virtual list.
pub const VIRTUAL_ADDRESS_LIST_SIZE: usize = 4;

/// NetKey list capacity.
pub const NET_KEY_LIST_SIZE: usize = 4;

/// AppKey list capacity.
pub const APP_KEY_LIST_SIZE: usize = 8;

/// Model instance capacity across all elements.
pub const MODEL_LIST_SIZE: usize = 16;

/// Node-wide subscription slab capacity (sum of the owned per-model
/// slices).
pub const SUBSCRIPTION_LIST_SIZE: usize = 16;

/// Node-wide AppKey-bind slab capacity.
pub const APP_KEY_BIND_LIST_SIZE: usize = 16;

/// Granularity of the persisted sequence-number threshold. Only the
/// threshold hits NVM; the live counters stay in RAM.
pub const SEQ_NVM_INCREMENT: u32 = 1000;
