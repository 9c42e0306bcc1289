//! Network management: IV update, IV recovery and Key Refresh phase
//! transitions.
//!
//! Transitions between normal operation and IV update are rate-limited
//! by a 96 hour guard; IV recovery by a 192 hour guard. A transition
//! blocked by a guard (or by SAR transmit still draining) is marked
//! pending and replayed when the guard fires or SAR gives the all
//! clear.

use crate::dispatch::{BeaconData, NetworkMgmtMsg};
use crate::platform::{BeaconTarget, KeyType, Platform, TimerId};
use crate::storage::BackingStore;
use crate::Node;
use heapless::Vec;
use meshcore_common::keys::{AppKeyIndex, KeyRefreshPhase, NetKeyIndex};
use meshcore_common::{IvIndex, IvUpdateFlag};

/// Guard between IV normal/update transitions.
pub const IV_UPDATE_GUARD_SEC: u32 = 96 * 3600;

/// Guard between IV recoveries.
pub const IV_RECOVERY_GUARD_SEC: u32 = 2 * IV_UPDATE_GUARD_SEC;

/// Network management control state.
#[derive(Default)]
pub struct NetworkMgmt {
    /// A normal/update transition is waiting on a guard or on SAR.
    trans_pending: bool,
    /// SAR transmit currently disallows returning to normal.
    postpone: bool,
    update_guard_armed: bool,
    recovery_guard_armed: bool,
    /// Guard timers disabled for test configurations.
    test_mode: bool,
}

impl NetworkMgmt {
    pub fn is_transition_pending(&self) -> bool {
        self.trans_pending
    }
}

impl<B: BackingStore, P: Platform> Node<B, P> {
    /// Process an authenticated Secure Network Beacon for a subnet:
    /// first the Key Refresh signal, then the IV information.
    pub fn handle_beacon(&mut self, beacon: BeaconData) {
        let Some(old_phase) = self.config.key_refresh_phase(beacon.net_key_index) else {
            warn!(
                "beacon for unknown NetKey {}, dropped",
                beacon.net_key_index.value()
            );
            return;
        };
        let old_phase = old_phase.collapse();

        // The Key Refresh flag is only meaningful when the new key
        // authenticated the beacon.
        if beacon.new_key_used {
            let new_phase = if beacon.key_refresh_flag.0 {
                KeyRefreshPhase::Phase2
            } else {
                KeyRefreshPhase::Phase3
            };
            if old_phase != new_phase.collapse() {
                self.handle_key_refresh_transition(beacon.net_key_index, old_phase, new_phase);
            }
        }

        self.handle_rx_iv(beacon.net_key_index, beacon.iv_index, beacon.iv_update_flag);
    }

    /// Dispatch one Key Refresh phase transition through the action
    /// table. `Phase3` collapses to `NotActive` before lookup.
    pub fn handle_key_refresh_transition(
        &mut self,
        net_key_index: NetKeyIndex,
        old_phase: KeyRefreshPhase,
        new_phase: KeyRefreshPhase,
    ) {
        let old_phase = old_phase.collapse();
        let new_phase = new_phase.collapse();

        use KeyRefreshPhase::*;
        match (old_phase, new_phase) {
            (NotActive, Phase1) | (Phase1, Phase2) => {
                self.key_refresh_just_set(net_key_index, new_phase);
            }
            (Phase1, NotActive) | (Phase2, NotActive) => {
                self.key_refresh_revoke_old(net_key_index);
            }
            _ => {}
        }

        info!(
            "key refresh for NetKey {}: transition requested to new state",
            net_key_index.value()
        );
    }

    pub fn handle_mgmt_message(&mut self, msg: NetworkMgmtMsg) {
        match msg {
            NetworkMgmtMsg::IvUpdateAllowed => {
                self.mgmt.postpone = false;
                if self.mgmt.trans_pending {
                    let (_, local_update) = self.config.iv_index();
                    if local_update.is_in_progress() {
                        self.request_normal_resume();
                    }
                }
            }
            NetworkMgmtMsg::IvUpdateDisallowed => {
                self.mgmt.postpone = true;
            }
            NetworkMgmtMsg::IvUpdateGuardExpired => {
                self.mgmt.update_guard_armed = false;
                if self.mgmt.trans_pending {
                    let (_, local_update) = self.config.iv_index();
                    if local_update.is_in_progress() {
                        self.request_normal_resume();
                    } else {
                        self.request_iv_update();
                    }
                }
            }
            NetworkMgmtMsg::IvRecoveryGuardExpired => {
                self.mgmt.recovery_guard_armed = false;
            }
            NetworkMgmtMsg::ProvisioningComplete => {
                self.arm_update_guard();
            }
        }
    }

    /// Disable or re-enable the guard timers for tests, optionally
    /// forcing the IV state towards `target`. Returns the IV state
    /// after any transition.
    pub fn configure_iv_test_mode(
        &mut self,
        disable_guards: bool,
        target: Option<IvUpdateFlag>,
    ) -> (IvIndex, IvUpdateFlag) {
        self.mgmt.test_mode = disable_guards;
        if disable_guards {
            self.platform.timer_stop(TimerId::IvUpdateGuard);
            self.mgmt.update_guard_armed = false;
            self.platform.timer_stop(TimerId::IvRecoveryGuard);
            self.mgmt.recovery_guard_armed = false;
        }

        if let Some(target) = target {
            let (_, local_update) = self.config.iv_index();
            if local_update != target {
                match target {
                    IvUpdateFlag::InProgress => self.request_iv_update(),
                    IvUpdateFlag::Normal => self.request_normal_resume(),
                }
            }
        }

        self.config.iv_index()
    }

    // ----------------------------------------------------------------
    // Key Refresh actions
    // ----------------------------------------------------------------

    fn key_refresh_just_set(&mut self, net_key_index: NetKeyIndex, new_phase: KeyRefreshPhase) {
        if self
            .config
            .set_key_refresh_phase(net_key_index, new_phase)
            .is_err()
        {
            return;
        }
        self.persist_net_keys();

        if matches!(
            new_phase,
            KeyRefreshPhase::Phase2 | KeyRefreshPhase::NotActive
        ) {
            self.platform
                .beacon_trigger_send(BeaconTarget::Subnet(net_key_index));
            self.platform
                .friendship_security_changed(false, true, Some(net_key_index));
        }
    }

    /// Revoke the old key material of a subnet: every bound AppKey
    /// first, then the NetKey itself, then settle into `NotActive`.
    fn key_refresh_revoke_old(&mut self, net_key_index: NetKeyIndex) {
        let mut cursor = Default::default();
        let mut bound: Vec<AppKeyIndex, { crate::APP_KEY_LIST_SIZE }> = Vec::new();
        while let Some(app_key) = self.config.keys.next_bound_app_key(net_key_index, &mut cursor) {
            bound.push(app_key).ok();
        }

        for app_key in bound {
            self.platform
                .remove_key_material(KeyType::Application, app_key.value(), true);
            // AppKeys that never received refreshed material keep the
            // key they have.
            self.config.remove_app_key(app_key, true).ok();
        }
        self.persist_app_keys();

        self.platform
            .remove_key_material(KeyType::Network, net_key_index.value(), true);
        if self.config.remove_net_key(net_key_index, true).is_err() {
            warn!(
                "no staged key to promote for NetKey {}",
                net_key_index.value()
            );
        }
        self.persist_net_keys();

        self.key_refresh_just_set(net_key_index, KeyRefreshPhase::NotActive);
    }

    // ----------------------------------------------------------------
    // IV handling
    // ----------------------------------------------------------------

    fn handle_rx_iv(
        &mut self,
        net_key_index: NetKeyIndex,
        iv_index: IvIndex,
        iv_update_flag: IvUpdateFlag,
    ) {
        let (local_iv, local_update) = self.config.iv_index();

        if iv_index == local_iv {
            if local_update.is_in_progress() && !iv_update_flag.is_in_progress() {
                self.request_normal_resume();
            }
            return;
        }

        if iv_index < local_iv {
            return;
        }

        if !net_key_index.is_primary()
            && self
                .config
                .key_refresh_phase(NetKeyIndex::PRIMARY)
                .is_some()
        {
            // Members of the primary subnet take IV information only
            // from it.
            return;
        }

        if iv_index.value() - local_iv.value() == 1
            && !local_update.is_in_progress()
            && iv_update_flag.is_in_progress()
        {
            self.request_iv_update();
            return;
        }

        // Only nodes in normal operation may recover.
        if !local_update.is_in_progress() {
            self.request_iv_recovery(iv_index, iv_update_flag);
        }
    }

    pub(crate) fn request_iv_update(&mut self) {
        if self.mgmt.update_guard_armed {
            self.mgmt.trans_pending = true;
            return;
        }

        self.perform_iv_update();

        // Stay pending if any element already crossed the high
        // threshold while the guard was running.
        self.mgmt.trans_pending = false;
        for element_index in 0..self.config.element_count() {
            if let Ok(seq) = self.config.seq(element_index) {
                if seq.value() >= crate::sequence::HIGH_SEQ_THRESHOLD {
                    self.mgmt.trans_pending = true;
                }
            }
        }

        self.arm_update_guard();
    }

    fn perform_iv_update(&mut self) {
        let (local_iv, _) = self.config.iv_index();
        self.set_iv_index(local_iv + 1);
        self.set_iv_update_in_progress(true);

        self.platform.beacon_trigger_send(BeaconTarget::AllSubnets);
        self.platform.friendship_security_changed(true, false, None);
    }

    pub(crate) fn request_normal_resume(&mut self) {
        if !self.mgmt.update_guard_armed {
            if !self.mgmt.postpone {
                self.perform_normal_resume();
                self.mgmt.trans_pending = false;
                // Re-allow SAR transmit in case a fault left it gated.
                self.platform.sar_tx_accept_incoming();
                self.arm_update_guard();
                return;
            }
            // Drain in-flight transactions before finishing the
            // update.
            self.platform.sar_tx_reject_incoming();
        }
        self.mgmt.trans_pending = true;
    }

    fn perform_normal_resume(&mut self) {
        self.set_iv_update_in_progress(false);
        self.reset_sequence_numbers();

        let (local_iv, _) = self.config.iv_index();
        self.platform.sar_rx_history_cleanup(local_iv);
        self.platform.beacon_trigger_send(BeaconTarget::AllSubnets);
        self.platform.friendship_security_changed(true, false, None);
    }

    fn request_iv_recovery(&mut self, iv_index: IvIndex, iv_update_flag: IvUpdateFlag) {
        if self.mgmt.recovery_guard_armed {
            return;
        }

        self.perform_iv_recovery(iv_index, iv_update_flag);

        // A recovery supersedes any deferred transition.
        self.mgmt.trans_pending = false;
        self.platform.timer_stop(TimerId::IvUpdateGuard);
        self.mgmt.update_guard_armed = false;

        if !self.mgmt.test_mode {
            self.platform
                .timer_start_sec(TimerId::IvRecoveryGuard, IV_RECOVERY_GUARD_SEC);
            self.mgmt.recovery_guard_armed = true;
        }

        self.platform.sar_tx_accept_incoming();
    }

    fn perform_iv_recovery(&mut self, iv_index: IvIndex, iv_update_flag: IvUpdateFlag) {
        self.set_iv_index(iv_index);
        self.set_iv_update_in_progress(iv_update_flag.is_in_progress());
        self.reset_sequence_numbers();

        self.platform.sar_rx_history_cleanup(iv_index);
        self.platform.beacon_trigger_send(BeaconTarget::AllSubnets);
        self.platform.friendship_security_changed(true, false, None);
    }

    fn arm_update_guard(&mut self) {
        if !self.mgmt.test_mode {
            self.platform
                .timer_start_sec(TimerId::IvUpdateGuard, IV_UPDATE_GUARD_SEC);
            self.mgmt.update_guard_armed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackingStore;
    use crate::test_util::{test_node, PlatformCall, RecordingPlatform};
    use crate::Node;
    use meshcore_common::keys::{ApplicationKey, NetworkKey};
    use meshcore_common::{KeyRefreshFlag, Seq};

    const PRIMARY: NetKeyIndex = NetKeyIndex::PRIMARY;
    const SUBNET: NetKeyIndex = NetKeyIndex::new(1);

    fn beacon(
        net_key_index: NetKeyIndex,
        new_key_used: bool,
        iv_index: u32,
        key_refresh: bool,
        iv_update: bool,
    ) -> BeaconData {
        BeaconData {
            net_key_index,
            new_key_used,
            iv_index: IvIndex::new(iv_index),
            key_refresh_flag: KeyRefreshFlag(key_refresh),
            iv_update_flag: IvUpdateFlag::from(iv_update),
        }
    }

    /// Node on the primary subnet, in normal operation at the given
    /// IV, with no guard armed.
    fn provisioned_node(iv_index: u32) -> Node<MemoryBackingStore, RecordingPlatform> {
        let mut node = test_node();
        node.set_net_key(PRIMARY, NetworkKey::new([0x11; 16]))
            .unwrap();
        node.config.set_iv_index(IvIndex::new(iv_index));
        node.platform.clear();
        node
    }

    #[test]
    fn beacon_delta_one_starts_iv_update() {
        let mut node = provisioned_node(0x10);

        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, true));

        assert_eq!(
            node.iv_index(),
            (IvIndex::new(0x11), IvUpdateFlag::InProgress)
        );
        assert!(node
            .platform
            .contains(&PlatformCall::BeaconSend(BeaconTarget::AllSubnets)));
        assert!(node.platform.contains(&PlatformCall::FriendshipSecurity {
            iv_changed: true,
            key_changed: false,
            net_key_index: None,
        }));
        assert!(node.platform.contains(&PlatformCall::TimerStart(
            TimerId::IvUpdateGuard,
            IV_UPDATE_GUARD_SEC
        )));
        assert!(!node.mgmt.trans_pending);
    }

    #[test]
    fn beacon_larger_delta_recovers_iv() {
        let mut node = provisioned_node(0x10);
        node.set_seq(0, Seq::new(5000)).unwrap();
        node.platform.clear();

        node.handle_beacon(beacon(PRIMARY, false, 0x20, false, false));

        assert_eq!(node.iv_index(), (IvIndex::new(0x20), IvUpdateFlag::Normal));
        assert_eq!(node.seq(0).unwrap(), Seq::new(0));
        assert_eq!(node.seq(1).unwrap(), Seq::new(0));
        assert!(node
            .platform
            .contains(&PlatformCall::SarRxCleanup(IvIndex::new(0x20))));
        assert!(node.platform.contains(&PlatformCall::TimerStart(
            TimerId::IvRecoveryGuard,
            IV_RECOVERY_GUARD_SEC
        )));
        assert!(node
            .platform
            .contains(&PlatformCall::BeaconSend(BeaconTarget::AllSubnets)));
    }

    #[test]
    fn recovery_blocked_while_recovery_guard_armed() {
        let mut node = provisioned_node(0x10);
        node.handle_beacon(beacon(PRIMARY, false, 0x20, false, false));
        node.platform.clear();

        node.handle_beacon(beacon(PRIMARY, false, 0x30, false, false));
        assert_eq!(node.iv_index(), (IvIndex::new(0x20), IvUpdateFlag::Normal));

        node.handle_mgmt_message(NetworkMgmtMsg::IvRecoveryGuardExpired);
        node.handle_beacon(beacon(PRIMARY, false, 0x30, false, false));
        assert_eq!(node.iv_index(), (IvIndex::new(0x30), IvUpdateFlag::Normal));
    }

    #[test]
    fn delta_one_with_update_flag_is_not_recovery() {
        let mut node = provisioned_node(0x10);
        node.set_seq(0, Seq::new(4242)).unwrap();
        node.platform.clear();

        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, true));

        // Update path: sequence numbers survive, no recovery guard.
        assert_eq!(
            node.iv_index(),
            (IvIndex::new(0x11), IvUpdateFlag::InProgress)
        );
        assert_eq!(node.seq(0).unwrap(), Seq::new(4242));
        assert!(!node.platform.contains(&PlatformCall::TimerStart(
            TimerId::IvRecoveryGuard,
            IV_RECOVERY_GUARD_SEC
        )));
    }

    #[test]
    fn subnet_beacon_cannot_move_primary_member_iv() {
        let mut node = provisioned_node(0x10);
        node.set_net_key(SUBNET, NetworkKey::new([0x22; 16]))
            .unwrap();
        node.platform.clear();

        node.handle_beacon(beacon(SUBNET, false, 0x20, false, false));
        assert_eq!(node.iv_index(), (IvIndex::new(0x10), IvUpdateFlag::Normal));

        // A node holding only the subnet key follows it.
        node.remove_net_key(PRIMARY, false).unwrap();
        node.handle_beacon(beacon(SUBNET, false, 0x20, false, false));
        assert_eq!(node.iv_index(), (IvIndex::new(0x20), IvUpdateFlag::Normal));
    }

    #[test]
    fn equal_iv_without_remote_update_resumes_normal() {
        let mut node = provisioned_node(0x10);
        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, true));
        node.configure_iv_test_mode(true, None);
        node.platform.clear();

        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, false));

        assert_eq!(node.iv_index(), (IvIndex::new(0x11), IvUpdateFlag::Normal));
        assert!(node
            .platform
            .contains(&PlatformCall::SarRxCleanup(IvIndex::new(0x11))));
        assert!(node.platform.contains(&PlatformCall::SarTxAccept));
    }

    #[test]
    fn beacon_for_unknown_net_key_is_dropped() {
        let mut node = provisioned_node(0x10);
        node.handle_beacon(beacon(NetKeyIndex::new(7), false, 0x20, false, false));
        assert_eq!(node.iv_index(), (IvIndex::new(0x10), IvUpdateFlag::Normal));
        assert!(node.platform.calls.is_empty());
    }

    #[test]
    fn seq_pressure_with_guard_armed_defers_update() {
        let mut node = provisioned_node(0x10);
        node.handle_mgmt_message(NetworkMgmtMsg::ProvisioningComplete);
        node.platform.clear();

        node.set_seq(0, Seq::new(0x70_0000)).unwrap();

        assert_eq!(node.iv_index(), (IvIndex::new(0x10), IvUpdateFlag::Normal));
        assert!(node.mgmt.trans_pending);

        // Guard expiry replays the deferred transition.
        node.handle_mgmt_message(NetworkMgmtMsg::IvUpdateGuardExpired);
        assert_eq!(
            node.iv_index(),
            (IvIndex::new(0x11), IvUpdateFlag::InProgress)
        );
    }

    #[test]
    fn guard_expiry_replays_deferred_normal_resume() {
        let mut node = provisioned_node(0x10);
        // Enter update; the guard re-arms behind it.
        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, true));
        node.platform.clear();

        // Remote already back to normal, but the guard defers us.
        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, false));
        assert_eq!(
            node.iv_index(),
            (IvIndex::new(0x11), IvUpdateFlag::InProgress)
        );
        assert!(node.mgmt.trans_pending);

        node.handle_mgmt_message(NetworkMgmtMsg::IvUpdateGuardExpired);
        assert_eq!(node.iv_index(), (IvIndex::new(0x11), IvUpdateFlag::Normal));
        assert!(!node.mgmt.trans_pending);
    }

    #[test]
    fn seq_pressure_high_finishes_update() {
        let mut node = provisioned_node(0x10);
        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, true));
        node.configure_iv_test_mode(true, None);
        node.platform.clear();

        node.set_seq(0, Seq::new(0xC0_0000)).unwrap();

        assert_eq!(node.iv_index(), (IvIndex::new(0x11), IvUpdateFlag::Normal));
        assert_eq!(node.seq(0).unwrap(), Seq::new(0));
    }

    #[test]
    fn seq_pressure_ignored_off_primary_subnet() {
        let mut node = test_node();
        node.set_net_key(SUBNET, NetworkKey::new([0x22; 16]))
            .unwrap();
        node.platform.clear();

        node.set_seq(0, Seq::new(0x70_0000)).unwrap();
        assert_eq!(node.iv_index(), (IvIndex::default(), IvUpdateFlag::Normal));
        assert!(!node.mgmt.trans_pending);
    }

    #[test]
    fn sar_disallow_defers_normal_resume() {
        let mut node = provisioned_node(0x10);
        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, true));
        node.configure_iv_test_mode(true, None);
        node.handle_mgmt_message(NetworkMgmtMsg::IvUpdateDisallowed);
        node.platform.clear();

        node.handle_beacon(beacon(PRIMARY, false, 0x11, false, false));

        assert_eq!(
            node.iv_index(),
            (IvIndex::new(0x11), IvUpdateFlag::InProgress)
        );
        assert!(node.mgmt.trans_pending);
        assert!(node.platform.contains(&PlatformCall::SarTxReject));

        node.platform.clear();
        node.handle_mgmt_message(NetworkMgmtMsg::IvUpdateAllowed);

        assert_eq!(node.iv_index(), (IvIndex::new(0x11), IvUpdateFlag::Normal));
        assert!(node.platform.contains(&PlatformCall::SarTxAccept));
    }

    #[test]
    fn key_refresh_phase_walk() {
        let mut node = provisioned_node(0x10);
        node.update_net_key(PRIMARY, NetworkKey::new([0x33; 16]))
            .unwrap();
        node.set_app_key(AppKeyIndex::new(0), ApplicationKey::new([0xA1; 16]))
            .unwrap();
        node.bind_app_key_to_net_key(AppKeyIndex::new(0), PRIMARY)
            .unwrap();
        node.update_app_key(AppKeyIndex::new(0), ApplicationKey::new([0xA2; 16]))
            .unwrap();
        node.platform.clear();

        // New key on the air with the refresh flag: phase 2.
        node.handle_beacon(beacon(PRIMARY, true, 0x10, true, false));
        assert_eq!(
            node.key_refresh_phase(PRIMARY),
            Some(KeyRefreshPhase::Phase2)
        );
        assert!(node
            .platform
            .contains(&PlatformCall::BeaconSend(BeaconTarget::Subnet(PRIMARY))));
        assert!(node.platform.contains(&PlatformCall::FriendshipSecurity {
            iv_changed: false,
            key_changed: true,
            net_key_index: Some(PRIMARY),
        }));

        node.platform.clear();

        // Refresh flag cleared: revoke old material and settle.
        node.handle_beacon(beacon(PRIMARY, true, 0x10, false, false));
        assert_eq!(
            node.key_refresh_phase(PRIMARY),
            Some(KeyRefreshPhase::NotActive)
        );
        assert_eq!(node.net_key(PRIMARY), Some(&NetworkKey::new([0x33; 16])));
        assert_eq!(node.updated_net_key(PRIMARY), None);
        assert_eq!(
            node.app_key(AppKeyIndex::new(0)),
            Some(&ApplicationKey::new([0xA2; 16]))
        );

        // AppKey material is evicted before the NetKey's.
        let evictions: std::vec::Vec<_> = node
            .platform
            .calls
            .iter()
            .filter(|c| matches!(c, PlatformCall::RemoveKeyMaterial(..)))
            .collect();
        assert_eq!(
            evictions,
            [
                &PlatformCall::RemoveKeyMaterial(KeyType::Application, 0, true),
                &PlatformCall::RemoveKeyMaterial(KeyType::Network, 0, true),
            ]
        );
    }

    #[test]
    fn key_refresh_same_state_is_a_no_op() {
        let mut node = provisioned_node(0x10);
        node.handle_key_refresh_transition(
            PRIMARY,
            KeyRefreshPhase::NotActive,
            KeyRefreshPhase::Phase2,
        );
        // (NotActive, Phase2) has no action.
        assert_eq!(
            node.key_refresh_phase(PRIMARY),
            Some(KeyRefreshPhase::NotActive)
        );
    }

    #[test]
    fn key_refresh_transition_on_unknown_net_key_is_no_op() {
        let mut node = provisioned_node(0x10);
        node.handle_key_refresh_transition(
            NetKeyIndex::new(9),
            KeyRefreshPhase::NotActive,
            KeyRefreshPhase::Phase1,
        );
        assert_eq!(node.key_refresh_phase(NetKeyIndex::new(9)), None);
        assert!(node.platform.calls.is_empty());
    }

    #[test]
    fn test_mode_disables_guards_and_forces_transitions() {
        let mut node = provisioned_node(0x10);

        let (iv, flag) = node.configure_iv_test_mode(true, Some(IvUpdateFlag::InProgress));
        assert_eq!((iv, flag), (IvIndex::new(0x11), IvUpdateFlag::InProgress));
        assert!(!node.platform.contains(&PlatformCall::TimerStart(
            TimerId::IvUpdateGuard,
            IV_UPDATE_GUARD_SEC
        )));

        let (iv, flag) = node.configure_iv_test_mode(true, Some(IvUpdateFlag::Normal));
        assert_eq!((iv, flag), (IvIndex::new(0x11), IvUpdateFlag::Normal));
    }
}
