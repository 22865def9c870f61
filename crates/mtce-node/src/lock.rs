//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Lock eligibility predicate."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;

use crate::maintenance::Maintenance;
use crate::state::OperState;

impl Maintenance {
    /// Decide whether `id` may be locked, with the refusal reason on `Err`.
    ///
    /// Pure: reads the registry only.
    pub fn lock_check(&self, id: HostId) -> std::result::Result<(), String> {
        let Some(host) = self.registry.get(id) else {
            return Err(format!("unknown host {id}"));
        };
        if host.is_locked() || host.oper_state == OperState::Disabled {
            return Ok(());
        }
        if host.is_controller() && host.hostname == self.config.agent.hostname {
            return Err("cannot lock the active controller".to_owned());
        }
        if !host.is_controller() && !host.is_storage() {
            return Ok(());
        }
        if host.storage_monitor {
            let remaining = self
                .registry
                .iter()
                .filter(|(other, peer)| *other != id && peer.storage_monitor && peer.is_unlocked_enabled())
                .count();
            if remaining < self.config.agent.storage_monitor_quorum {
                return Err(format!(
                    "storage monitor quorum would drop to {remaining} of {}",
                    self.config.agent.storage_monitor_quorum
                ));
            }
        }
        if host.is_storage() {
            let peers = self
                .registry
                .iter()
                .filter(|(other, peer)| {
                    *other != id
                        && peer.is_storage()
                        && peer.peer_group == host.peer_group
                        && peer.is_unlocked_enabled()
                })
                .count();
            if peers == 0 {
                let group = host.peer_group.as_deref().unwrap_or("default");
                return Err(format!("last in-service storage host in peer group '{group}'"));
            }
        }
        Ok(())
    }

    pub fn can_be_locked(&self, id: HostId) -> bool {
        self.lock_check(id).is_ok()
    }

    /// Hostname form of [`Maintenance::can_be_locked`]; unknown hosts cannot be locked.
    pub fn can_lock_host(&self, hostname: &str) -> bool {
        self.host_id(hostname)
            .is_some_and(|id| self.can_be_locked(id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use mtce_common::MtceConfig;

    use super::*;
    use crate::host::HostInfo;
    use crate::state::{AdminAction, AdminState, AvailStatus, NodeType};
    use crate::testing::RecordingServices;

    fn cluster(hosts: &[(&str, NodeType, bool, Option<&str>)]) -> Maintenance {
        let mut config = MtceConfig::default();
        config.agent.hostname = "controller-0".to_owned();
        let recorder = RecordingServices::new();
        let mut mtce = Maintenance::new(config, recorder.services(), Instant::now());
        for (index, (name, personality, monitor, group)) in hosts.iter().enumerate() {
            let mut info = HostInfo::new(*name, format!("uuid-{index}"), *personality)
                .with_mgmt(format!("192.168.204.{}", index + 2), "")
                .with_states(AdminState::Unlocked, OperState::Enabled, AvailStatus::Available)
                .with_storage_monitor(*monitor);
            if let Some(group) = group {
                info = info.with_peer_group(*group);
            }
            let id = mtce.add_host(info).unwrap();
            mtce.change_admin_action(id, AdminAction::None).unwrap();
        }
        mtce
    }

    fn standard() -> Maintenance {
        cluster(&[
            ("controller-0", NodeType::CONTROLLER, true, None),
            ("controller-1", NodeType::CONTROLLER, true, None),
            ("storage-0", NodeType::STORAGE, true, Some("group-0")),
            ("storage-1", NodeType::STORAGE, false, Some("group-0")),
            ("compute-0", NodeType::WORKER, false, None),
        ])
    }

    #[test]
    fn active_controller_is_refused() {
        let mtce = standard();
        let err = mtce.lock_check(mtce.host_id("controller-0").unwrap()).unwrap_err();
        assert!(err.contains("active controller"));
        assert!(mtce.can_lock_host("controller-1"));
        assert!(mtce.can_lock_host("compute-0"));
        assert!(!mtce.can_lock_host("compute-9"));
    }

    #[test]
    fn storage_monitor_quorum_is_protected() {
        let mut mtce = standard();
        assert!(mtce.can_lock_host("storage-0"));

        let standby = mtce.host_id("controller-1").unwrap();
        mtce.set_oper_state(standby, OperState::Disabled).unwrap();
        let err = mtce.lock_check(mtce.host_id("storage-0").unwrap()).unwrap_err();
        assert!(err.contains("quorum"), "{err}");
    }

    #[test]
    fn workers_lock_even_when_hosting_a_monitor() {
        let mut mtce = cluster(&[
            ("controller-0", NodeType::CONTROLLER, true, None),
            ("controller-1", NodeType::CONTROLLER, false, None),
            ("compute-0", NodeType::WORKER, true, None),
        ]);
        let standby = mtce.host_id("controller-1").unwrap();
        mtce.set_oper_state(standby, OperState::Disabled).unwrap();

        assert!(mtce.lock_check(mtce.host_id("compute-0").unwrap()).is_ok());
    }

    #[test]
    fn last_storage_peer_is_refused() {
        let mut mtce = standard();
        assert!(mtce.can_lock_host("storage-1"));

        let peer = mtce.host_id("storage-0").unwrap();
        mtce.set_oper_state(peer, OperState::Disabled).unwrap();
        assert!(mtce.can_lock_host("storage-0"));
        let err = mtce.lock_check(mtce.host_id("storage-1").unwrap()).unwrap_err();
        assert!(err.contains("group-0"), "{err}");
    }
}
