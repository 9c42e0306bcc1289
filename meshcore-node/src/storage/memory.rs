//! RAM-backed dataset storage for tests and volatile deployments.

use crate::storage::{BackingStore, DatasetId, StorageError, DATASET_BUF_SIZE};
use heapless::{FnvIndexMap, Vec};

const DATASET_MAP_SIZE: usize = 16;

#[derive(Default)]
pub struct MemoryBackingStore {
    datasets: FnvIndexMap<DatasetId, Vec<u8, DATASET_BUF_SIZE>, DATASET_MAP_SIZE>,
}

impl BackingStore for MemoryBackingStore {
    fn store(&mut self, dataset: DatasetId, data: &[u8]) -> Result<(), StorageError> {
        let mut content = Vec::new();
        content
            .extend_from_slice(data)
            .map_err(|_| StorageError::Store)?;
        match self.datasets.insert(dataset, content) {
            Ok(_) => Ok(()),
            Err(_) => Err(StorageError::Store),
        }
    }

    fn load(&mut self, dataset: DatasetId, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        match self.datasets.get(&dataset) {
            Some(content) => {
                if buf.len() < content.len() {
                    return Err(StorageError::Load);
                }
                buf[..content.len()].copy_from_slice(content);
                Ok(Some(content.len()))
            }
            None => Ok(None),
        }
    }

    fn erase(&mut self, dataset: DatasetId) -> Result<(), StorageError> {
        self.datasets.remove(&dataset);
        Ok(())
    }
}
