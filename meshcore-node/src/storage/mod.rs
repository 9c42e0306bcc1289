//! Persistence broker.
//!
//! Each logical dataset is written durably to the backing store on
//! mutation and read back only during startup. Datasets are
//! independent; there is no cross-dataset atomic commit, and a reader
//! after restart sees either the pre-write or the fully-applied state
//! of each dataset.

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod memory;

pub use memory::MemoryBackingStore;

/// Opaque identifier of one logical dataset.
pub type DatasetId = u64;

/// The persisted datasets.
pub mod dataset {
    use super::DatasetId;

    /// Top-level config scalars (IV state, addresses, feature states).
    pub const CORE: DatasetId = 0xD001;
    pub const NET_KEYS: DatasetId = 0xD002;
    pub const APP_KEYS: DatasetId = 0xD003;
    pub const APP_KEY_BINDS: DatasetId = 0xD004;
    pub const ADDRESSES: DatasetId = 0xD005;
    pub const VIRTUAL_ADDRESSES: DatasetId = 0xD006;
    pub const SUBSCRIPTIONS: DatasetId = 0xD007;
    pub const SEQ_THRESHOLDS: DatasetId = 0xD008;
    pub const MODELS: DatasetId = 0xD009;
    pub const HEARTBEAT: DatasetId = 0xD00A;

    pub const ALL: [DatasetId; 10] = [
        CORE,
        NET_KEYS,
        APP_KEYS,
        APP_KEY_BINDS,
        ADDRESSES,
        VIRTUAL_ADDRESSES,
        SUBSCRIPTIONS,
        SEQ_THRESHOLDS,
        MODELS,
        HEARTBEAT,
    ];
}

/// Upper bound on one encoded dataset.
pub const DATASET_BUF_SIZE: usize = 1024;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    Load,
    Store,
    Erase,
    Serialization,
    Deserialization,
}

/// Durable dataset storage.
///
/// `store` must not return before the write is durable: a restart
/// observes either the previous or the new content of the dataset,
/// never a torn mix.
pub trait BackingStore {
    fn store(&mut self, dataset: DatasetId, data: &[u8]) -> Result<(), StorageError>;

    /// Read a dataset into `buf`, returning its length, or `None` when
    /// the dataset has never been written (or was erased).
    fn load(&mut self, dataset: DatasetId, buf: &mut [u8]) -> Result<Option<usize>, StorageError>;

    fn erase(&mut self, dataset: DatasetId) -> Result<(), StorageError>;
}

/// Encode and store one dataset. Broker failures are logged, not
/// surfaced: the in-memory state is already mutated and the protocol
/// re-converges on the next write or beacon.
pub(crate) fn store_dataset<B: BackingStore, T: Serialize>(
    backing: &mut B,
    dataset: DatasetId,
    value: &T,
) {
    let mut buf = [0u8; DATASET_BUF_SIZE];
    match postcard::to_slice(value, &mut buf) {
        Ok(used) => {
            if backing.store(dataset, used).is_err() {
                warn!("dataset {} store failed", dataset);
            }
        }
        Err(_) => {
            warn!("dataset {} encode failed", dataset);
        }
    }
}

/// Load and decode one dataset; `Ok(None)` when it was never written.
pub(crate) fn load_dataset<B: BackingStore, T: DeserializeOwned>(
    backing: &mut B,
    dataset: DatasetId,
) -> Result<Option<T>, StorageError> {
    let mut buf = [0u8; DATASET_BUF_SIZE];
    match backing.load(dataset, &mut buf)? {
        Some(len) => postcard::from_bytes(&buf[..len])
            .map(Some)
            .map_err(|_| StorageError::Deserialization),
        None => Ok(None),
    }
}

/// Wipe every dataset.
pub(crate) fn erase_all<B: BackingStore>(backing: &mut B) {
    for dataset in dataset::ALL {
        if backing.erase(dataset).is_err() {
            warn!("dataset {} erase failed", dataset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_memory_store() {
        let mut backing = MemoryBackingStore::default();

        let value: (u32, Option<u16>) = (0xDEAD_BEEF, Some(7));
        store_dataset(&mut backing, dataset::CORE, &value);

        let loaded: Option<(u32, Option<u16>)> =
            load_dataset(&mut backing, dataset::CORE).unwrap();
        assert_eq!(loaded, Some(value));
    }

    #[test]
    fn absent_dataset_loads_as_none() {
        let mut backing = MemoryBackingStore::default();
        let loaded: Option<u32> = load_dataset(&mut backing, dataset::HEARTBEAT).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn erase_all_leaves_nothing() {
        let mut backing = MemoryBackingStore::default();
        store_dataset(&mut backing, dataset::CORE, &1u32);
        store_dataset(&mut backing, dataset::MODELS, &2u32);

        erase_all(&mut backing);
        for dataset in dataset::ALL {
            let loaded: Option<u32> = load_dataset(&mut backing, dataset).unwrap();
            assert_eq!(loaded, None);
        }
    }
}
