//! NetKey and AppKey tables.
//!
//! Each entry carries its in-use ("old") material and optionally the
//! staged ("new") material introduced by a Key Refresh update. An
//! AppKey must be bound to a resident NetKey slot before it can be
//! used for publishing; removing a NetKey unbinds every dependent
//! AppKey.

use crate::error::ConfigError;
use crate::{APP_KEY_LIST_SIZE, NET_KEY_LIST_SIZE};
use heapless::Vec;
use meshcore_common::keys::{
    AppKeyIndex, ApplicationKey, KeyRefreshPhase, NetKeyIndex, NetworkKey, NodeIdentityState,
};
use serde::{Deserialize, Serialize};

/// Index of an occupied entry in the NetKey list.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetKeySlot(pub(crate) u16);

impl NetKeySlot {
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Index of an occupied entry in the AppKey list.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppKeySlot(pub(crate) u16);

impl AppKeySlot {
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Suspendable cursor for ordered key iteration.
#[derive(Copy, Clone, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyCursor(u16);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct NetKeyEntry {
    index: NetKeyIndex,
    key_old: NetworkKey,
    key_new: Option<NetworkKey>,
    phase: KeyRefreshPhase,
    node_identity: NodeIdentityState,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct AppKeyEntry {
    index: AppKeyIndex,
    key_old: ApplicationKey,
    key_new: Option<ApplicationKey>,
    bound_net: Option<NetKeySlot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyTable<const N: usize = NET_KEY_LIST_SIZE, const A: usize = APP_KEY_LIST_SIZE> {
    pub(crate) net_keys: Vec<Option<NetKeyEntry>, N>,
    pub(crate) app_keys: Vec<Option<AppKeyEntry>, A>,
}

impl<const N: usize, const A: usize> Default for KeyTable<N, A> {
    fn default() -> Self {
        let mut net_keys = Vec::new();
        net_keys.resize(N, None).ok();
        let mut app_keys = Vec::new();
        app_keys.resize(A, None).ok();
        Self { net_keys, app_keys }
    }
}

impl<const N: usize, const A: usize> KeyTable<N, A> {
    pub fn net_key_slot(&self, index: NetKeyIndex) -> Option<NetKeySlot> {
        self.net_keys.iter().enumerate().find_map(|(i, e)| {
            e.as_ref()
                .filter(|entry| entry.index == index)
                .map(|_| NetKeySlot(i as u16))
        })
    }

    pub fn app_key_slot(&self, index: AppKeyIndex) -> Option<AppKeySlot> {
        self.app_keys.iter().enumerate().find_map(|(i, e)| {
            e.as_ref()
                .filter(|entry| entry.index == index)
                .map(|_| AppKeySlot(i as u16))
        })
    }

    pub fn set_net_key(&mut self, index: NetKeyIndex, key: NetworkKey) -> Result<(), ConfigError> {
        if self.net_key_slot(index).is_some() {
            return Err(ConfigError::AlreadyExists);
        }
        let slot = self
            .net_keys
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(ConfigError::OutOfMemory)?;
        slot.replace(NetKeyEntry {
            index,
            key_old: key,
            key_new: None,
            phase: KeyRefreshPhase::NotActive,
            node_identity: NodeIdentityState::Stopped,
        });
        Ok(())
    }

    /// Stage the refreshed key material and enter Key Refresh phase 1;
    /// refuses if a refresh is already staged.
    pub fn update_net_key(
        &mut self,
        index: NetKeyIndex,
        key: NetworkKey,
    ) -> Result<(), ConfigError> {
        let entry = self.net_entry_mut(index).ok_or(ConfigError::NotFound)?;
        if entry.key_new.is_some() {
            return Err(ConfigError::AlreadyExists);
        }
        entry.key_new = Some(key);
        entry.phase = KeyRefreshPhase::Phase1;
        Ok(())
    }

    /// Remove a NetKey.
    ///
    /// With `old_only` the staged key is promoted into the in-use
    /// position (Key Refresh revocation). Otherwise the entry is
    /// dropped and every AppKey bound to it is unbound.
    pub fn remove_net_key(&mut self, index: NetKeyIndex, old_only: bool) -> Result<(), ConfigError> {
        let slot = self.net_key_slot(index).ok_or(ConfigError::NotFound)?;

        if old_only {
            let entry = self.net_keys[slot.0 as usize]
                .as_mut()
                .ok_or(ConfigError::NotFound)?;
            let key_new = entry.key_new.take().ok_or(ConfigError::InvalidParams)?;
            entry.key_old = key_new;
        } else {
            for app in self.app_keys.iter_mut().flatten() {
                if app.bound_net == Some(slot) {
                    app.bound_net = None;
                }
            }
            self.net_keys[slot.0 as usize] = None;
        }
        Ok(())
    }

    pub fn net_key(&self, index: NetKeyIndex) -> Option<&NetworkKey> {
        self.net_entry(index).map(|e| &e.key_old)
    }

    pub fn updated_net_key(&self, index: NetKeyIndex) -> Option<&NetworkKey> {
        self.net_entry(index).and_then(|e| e.key_new.as_ref())
    }

    pub fn net_key_refresh_phase(&self, index: NetKeyIndex) -> Option<KeyRefreshPhase> {
        self.net_entry(index).map(|e| e.phase)
    }

    pub fn set_net_key_refresh_phase(
        &mut self,
        index: NetKeyIndex,
        phase: KeyRefreshPhase,
    ) -> Result<(), ConfigError> {
        let entry = self.net_entry_mut(index).ok_or(ConfigError::NotFound)?;
        entry.phase = phase;
        Ok(())
    }

    pub fn node_identity_state(&self, index: NetKeyIndex) -> Option<NodeIdentityState> {
        self.net_entry(index).map(|e| e.node_identity)
    }

    pub fn set_node_identity_state(
        &mut self,
        index: NetKeyIndex,
        state: NodeIdentityState,
    ) -> Result<(), ConfigError> {
        let entry = self.net_entry_mut(index).ok_or(ConfigError::NotFound)?;
        entry.node_identity = state;
        Ok(())
    }

    pub fn count_net_keys(&self) -> u16 {
        self.net_keys.iter().flatten().count() as u16
    }

    /// Fetch the next resident NetKey index in slot order; the cursor
    /// may be held across calls.
    pub fn next_net_key_index(&self, cursor: &mut KeyCursor) -> Option<NetKeyIndex> {
        while (cursor.0 as usize) < self.net_keys.len() {
            let slot = cursor.0 as usize;
            cursor.0 += 1;
            if let Some(entry) = &self.net_keys[slot] {
                return Some(entry.index);
            }
        }
        None
    }

    pub fn set_app_key(
        &mut self,
        index: AppKeyIndex,
        key: ApplicationKey,
    ) -> Result<(), ConfigError> {
        if self.app_key_slot(index).is_some() {
            return Err(ConfigError::AlreadyExists);
        }
        let slot = self
            .app_keys
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(ConfigError::OutOfMemory)?;
        slot.replace(AppKeyEntry {
            index,
            key_old: key,
            key_new: None,
            bound_net: None,
        });
        Ok(())
    }

    pub fn update_app_key(
        &mut self,
        index: AppKeyIndex,
        key: ApplicationKey,
    ) -> Result<(), ConfigError> {
        let entry = self.app_entry_mut(index).ok_or(ConfigError::NotFound)?;
        if entry.key_new.is_some() {
            return Err(ConfigError::AlreadyExists);
        }
        entry.key_new = Some(key);
        Ok(())
    }

    pub fn remove_app_key(&mut self, index: AppKeyIndex, old_only: bool) -> Result<(), ConfigError> {
        let slot = self.app_key_slot(index).ok_or(ConfigError::NotFound)?;

        if old_only {
            let entry = self.app_keys[slot.0 as usize]
                .as_mut()
                .ok_or(ConfigError::NotFound)?;
            let key_new = entry.key_new.take().ok_or(ConfigError::InvalidParams)?;
            entry.key_old = key_new;
        } else {
            self.app_keys[slot.0 as usize] = None;
        }
        Ok(())
    }

    pub fn app_key(&self, index: AppKeyIndex) -> Option<&ApplicationKey> {
        self.app_entry(index).map(|e| &e.key_old)
    }

    pub fn updated_app_key(&self, index: AppKeyIndex) -> Option<&ApplicationKey> {
        self.app_entry(index).and_then(|e| e.key_new.as_ref())
    }

    /// Bind an AppKey to a NetKey; both must be resident.
    pub fn bind_app_key(
        &mut self,
        app_index: AppKeyIndex,
        net_index: NetKeyIndex,
    ) -> Result<(), ConfigError> {
        let net_slot = self.net_key_slot(net_index).ok_or(ConfigError::NotFound)?;
        let entry = self.app_entry_mut(app_index).ok_or(ConfigError::NotFound)?;
        entry.bound_net = Some(net_slot);
        Ok(())
    }

    pub fn unbind_app_key(
        &mut self,
        app_index: AppKeyIndex,
        net_index: NetKeyIndex,
    ) -> Result<(), ConfigError> {
        let net_slot = self.net_key_slot(net_index).ok_or(ConfigError::NotFound)?;
        let entry = self.app_entry_mut(app_index).ok_or(ConfigError::NotFound)?;
        if entry.bound_net != Some(net_slot) {
            return Err(ConfigError::NotFound);
        }
        entry.bound_net = None;
        Ok(())
    }

    pub fn bound_net_key_index(&self, app_index: AppKeyIndex) -> Option<NetKeyIndex> {
        let entry = self.app_entry(app_index)?;
        let net_slot = entry.bound_net?;
        self.net_keys[net_slot.0 as usize].as_ref().map(|e| e.index)
    }

    pub fn is_bound(&self, net_index: NetKeyIndex, app_index: AppKeyIndex) -> bool {
        match (self.net_key_slot(net_index), self.app_entry(app_index)) {
            (Some(net_slot), Some(entry)) => entry.bound_net == Some(net_slot),
            _ => false,
        }
    }

    pub fn count_bound_app_keys(&self, net_index: NetKeyIndex) -> u16 {
        match self.net_key_slot(net_index) {
            Some(net_slot) => self
                .app_keys
                .iter()
                .flatten()
                .filter(|e| e.bound_net == Some(net_slot))
                .count() as u16,
            None => 0,
        }
    }

    /// Fetch the next AppKey bound to the given NetKey in slot order.
    pub fn next_bound_app_key(
        &self,
        net_index: NetKeyIndex,
        cursor: &mut KeyCursor,
    ) -> Option<AppKeyIndex> {
        let net_slot = self.net_key_slot(net_index)?;
        while (cursor.0 as usize) < self.app_keys.len() {
            let slot = cursor.0 as usize;
            cursor.0 += 1;
            if let Some(entry) = &self.app_keys[slot] {
                if entry.bound_net == Some(net_slot) {
                    return Some(entry.index);
                }
            }
        }
        None
    }

    pub fn app_key_index_of(&self, slot: AppKeySlot) -> Option<AppKeyIndex> {
        self.app_keys.get(slot.0 as usize)?.as_ref().map(|e| e.index)
    }

    pub fn net_key_index_of(&self, slot: NetKeySlot) -> Option<NetKeyIndex> {
        self.net_keys.get(slot.0 as usize)?.as_ref().map(|e| e.index)
    }

    fn net_entry(&self, index: NetKeyIndex) -> Option<&NetKeyEntry> {
        self.net_keys
            .iter()
            .flatten()
            .find(|entry| entry.index == index)
    }

    fn net_entry_mut(&mut self, index: NetKeyIndex) -> Option<&mut NetKeyEntry> {
        self.net_keys
            .iter_mut()
            .flatten()
            .find(|entry| entry.index == index)
    }

    fn app_entry(&self, index: AppKeyIndex) -> Option<&AppKeyEntry> {
        self.app_keys
            .iter()
            .flatten()
            .find(|entry| entry.index == index)
    }

    fn app_entry_mut(&mut self, index: AppKeyIndex) -> Option<&mut AppKeyEntry> {
        self.app_keys
            .iter_mut()
            .flatten()
            .find(|entry| entry.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: NetworkKey = NetworkKey::new([0xA5; 16]);
    const KEY_B: NetworkKey = NetworkKey::new([0x5A; 16]);
    const APP_A: ApplicationKey = ApplicationKey::new([0x11; 16]);
    const APP_B: ApplicationKey = ApplicationKey::new([0x22; 16]);

    #[test]
    fn set_rejects_duplicate_and_full() {
        let mut table: KeyTable<2, 2> = Default::default();
        table.set_net_key(NetKeyIndex::new(0), KEY_A).unwrap();
        assert_eq!(
            table.set_net_key(NetKeyIndex::new(0), KEY_B),
            Err(ConfigError::AlreadyExists)
        );
        table.set_net_key(NetKeyIndex::new(1), KEY_B).unwrap();
        assert_eq!(
            table.set_net_key(NetKeyIndex::new(2), KEY_A),
            Err(ConfigError::OutOfMemory)
        );
    }

    #[test]
    fn update_stages_new_material_once() {
        let mut table: KeyTable<2, 2> = Default::default();
        table.set_net_key(NetKeyIndex::new(0), KEY_A).unwrap();

        assert_eq!(table.updated_net_key(NetKeyIndex::new(0)), None);
        table.update_net_key(NetKeyIndex::new(0), KEY_B).unwrap();
        assert_eq!(table.updated_net_key(NetKeyIndex::new(0)), Some(&KEY_B));
        assert_eq!(
            table.net_key_refresh_phase(NetKeyIndex::new(0)),
            Some(KeyRefreshPhase::Phase1)
        );
        assert_eq!(
            table.update_net_key(NetKeyIndex::new(0), KEY_B),
            Err(ConfigError::AlreadyExists)
        );
        assert_eq!(
            table.update_net_key(NetKeyIndex::new(7), KEY_B),
            Err(ConfigError::NotFound)
        );
    }

    #[test]
    fn remove_old_only_promotes_staged_key() {
        let mut table: KeyTable<2, 2> = Default::default();
        table.set_net_key(NetKeyIndex::new(0), KEY_A).unwrap();

        // Nothing staged yet.
        assert_eq!(
            table.remove_net_key(NetKeyIndex::new(0), true),
            Err(ConfigError::InvalidParams)
        );

        table.update_net_key(NetKeyIndex::new(0), KEY_B).unwrap();
        table.remove_net_key(NetKeyIndex::new(0), true).unwrap();
        assert_eq!(table.net_key(NetKeyIndex::new(0)), Some(&KEY_B));
        assert_eq!(table.updated_net_key(NetKeyIndex::new(0)), None);
    }

    #[test]
    fn remove_net_key_unbinds_dependents() {
        let mut table: KeyTable<2, 2> = Default::default();
        table.set_net_key(NetKeyIndex::new(0), KEY_A).unwrap();
        table.set_app_key(AppKeyIndex::new(0), APP_A).unwrap();
        table.set_app_key(AppKeyIndex::new(1), APP_B).unwrap();
        table
            .bind_app_key(AppKeyIndex::new(0), NetKeyIndex::new(0))
            .unwrap();
        table
            .bind_app_key(AppKeyIndex::new(1), NetKeyIndex::new(0))
            .unwrap();

        assert_eq!(table.count_bound_app_keys(NetKeyIndex::new(0)), 2);
        table.remove_net_key(NetKeyIndex::new(0), false).unwrap();

        assert_eq!(table.bound_net_key_index(AppKeyIndex::new(0)), None);
        assert_eq!(table.bound_net_key_index(AppKeyIndex::new(1)), None);
        assert_eq!(table.net_key(NetKeyIndex::new(0)), None);
    }

    #[test]
    fn bind_requires_resident_net_key() {
        let mut table: KeyTable<2, 2> = Default::default();
        table.set_app_key(AppKeyIndex::new(0), APP_A).unwrap();
        assert_eq!(
            table.bind_app_key(AppKeyIndex::new(0), NetKeyIndex::new(0)),
            Err(ConfigError::NotFound)
        );
    }

    #[test]
    fn cursor_iteration_skips_free_slots() {
        let mut table: KeyTable<4, 4> = Default::default();
        table.set_net_key(NetKeyIndex::new(5), KEY_A).unwrap();
        table.set_net_key(NetKeyIndex::new(2), KEY_B).unwrap();
        table.set_net_key(NetKeyIndex::new(9), KEY_A).unwrap();
        table.remove_net_key(NetKeyIndex::new(2), false).unwrap();

        let mut cursor = KeyCursor::default();
        assert_eq!(
            table.next_net_key_index(&mut cursor),
            Some(NetKeyIndex::new(5))
        );
        assert_eq!(
            table.next_net_key_index(&mut cursor),
            Some(NetKeyIndex::new(9))
        );
        assert_eq!(table.next_net_key_index(&mut cursor), None);
    }

    #[test]
    fn bound_app_key_iteration() {
        let mut table: KeyTable<2, 4> = Default::default();
        table.set_net_key(NetKeyIndex::new(0), KEY_A).unwrap();
        table.set_net_key(NetKeyIndex::new(1), KEY_B).unwrap();
        for (app, net) in [(0u16, 0u16), (1, 1), (2, 0)] {
            table
                .set_app_key(AppKeyIndex::new(app), APP_A)
                .unwrap();
            table
                .bind_app_key(AppKeyIndex::new(app), NetKeyIndex::new(net))
                .unwrap();
        }

        let mut cursor = KeyCursor::default();
        let mut bound = heapless::Vec::<AppKeyIndex, 4>::new();
        while let Some(index) = table.next_bound_app_key(NetKeyIndex::new(0), &mut cursor) {
            bound.push(index).unwrap();
        }
        assert_eq!(&bound[..], &[AppKeyIndex::new(0), AppKeyIndex::new(2)]);
    }

    #[test]
    fn node_identity_follows_net_key() {
        let mut table: KeyTable<2, 2> = Default::default();
        assert_eq!(table.node_identity_state(NetKeyIndex::new(0)), None);

        table.set_net_key(NetKeyIndex::new(0), KEY_A).unwrap();
        assert_eq!(
            table.node_identity_state(NetKeyIndex::new(0)),
            Some(NodeIdentityState::Stopped)
        );
        table
            .set_node_identity_state(NetKeyIndex::new(0), NodeIdentityState::Running)
            .unwrap();
        assert_eq!(
            table.node_identity_state(NetKeyIndex::new(0)),
            Some(NodeIdentityState::Running)
        );
    }
}
