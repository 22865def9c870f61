//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Multi-node failure avoidance."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Multi-node failure avoidance (MNFA).
//!
//! When enough hosts report heartbeat-minor on the same network at once the
//! cause is taken to be shared infrastructure rather than the hosts. MNFA then
//! suppresses per-host heartbeat failure handling and backs the heartbeat
//! service off until the group recovers or the optional timeout expires.

use mtce_common::{ArCause, HostId, MnfaConfig, Network, NetworkMap};
use mtce_logging::{log_system_event, slog, LogContext, SystemEventOutcome};
use tracing::{info, warn};

use crate::collab::{HbsCommand, LogKind};
use crate::host::DegradeCause;
use crate::maintenance::Maintenance;
use crate::state::AdminAction;
use crate::timer::MtcTimer;

/// Cluster-wide MNFA bookkeeping.
#[derive(Debug, Clone)]
pub struct Mnfa {
    pub(crate) config: MnfaConfig,
    pub(crate) active: bool,
    pub(crate) minor: NetworkMap<usize>,
    pub(crate) awol: Vec<HostId>,
    pub(crate) occurrences: u64,
    pub(crate) timer: MtcTimer,
}

impl Mnfa {
    pub fn new(config: MnfaConfig) -> Self {
        Self {
            config,
            active: false,
            minor: NetworkMap::default(),
            awol: Vec::new(),
            occurrences: 0,
            timer: MtcTimer::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn minor_count(&self, network: Network) -> usize {
        self.minor[network]
    }

    pub fn awol(&self) -> &[HostId] {
        &self.awol
    }

    pub fn occurrences(&self) -> u64 {
        self.occurrences
    }

    pub(crate) fn awol_insert(&mut self, id: HostId) {
        if !self.awol.contains(&id) {
            self.awol.push(id);
        }
    }

    pub(crate) fn awol_remove(&mut self, id: HostId) -> bool {
        let before = self.awol.len();
        self.awol.retain(|member| *member != id);
        before != self.awol.len()
    }

    fn max_minor(&self) -> usize {
        self.minor.values().copied().max().unwrap_or(0)
    }
}

impl Maintenance {
    pub(crate) fn enabled_hosts(&self) -> usize {
        self.registry
            .iter()
            .filter(|(_, host)| host.is_unlocked_enabled())
            .count()
    }

    fn mnfa_threshold(&self) -> usize {
        self.mnfa.config.threshold(self.enabled_hosts())
    }

    /// Record heartbeat-minor for a host and enter MNFA when the group is large enough.
    pub(crate) fn mnfa_add_host(&mut self, id: HostId, network: Network) {
        let Some(host) = self.registry.get_mut(id) else {
            return;
        };
        if host.hbs_minor[network] {
            return;
        }
        host.hbs_minor[network] = true;
        self.mnfa.minor[network] += 1;
        self.mnfa.awol_insert(id);

        let threshold = self.mnfa_threshold();
        if !self.mnfa.active && self.mnfa.minor[network] >= threshold {
            self.mnfa_enter(network, threshold);
        }
    }

    fn mnfa_enter(&mut self, network: Network, threshold: usize) {
        self.mnfa.active = true;
        let count = self.mnfa.minor[network];
        log_system_event(
            Some(&LogContext::new().with_network(network.as_str())),
            "mnfa-enter",
            &format!("{count} hosts heartbeat-minor (threshold {threshold}), suppressing failure handling"),
            SystemEventOutcome::Fault,
        );
        let agent = self.config.agent.hostname.clone();
        self.customer_log(
            &agent,
            LogKind::MnfaEnter,
            format!("multi-node failure avoidance entered on {} network", network.entity_name()),
        );
        if let Some(metrics) = &self.metrics {
            metrics.set_mnfa_active(true);
        }
        if !self.mnfa.config.timeout.is_zero() {
            self.mnfa.timer.start(self.now, self.mnfa.config.timeout);
        }
        self.hbs_broadcast(HbsCommand::Backoff);
    }

    /// Send a heartbeat service command for every monitored host.
    fn hbs_broadcast(&mut self, command: HbsCommand) {
        for id in self.registry.ids() {
            if !self.registry.get(id).is_some_and(|host| host.hbs.is_monitored()) {
                continue;
            }
            if let Err(err) = self.hbs_send(id, command) {
                warn!(error = %err, command = command.as_str(), "heartbeat service command failed");
            }
        }
    }

    /// Leave MNFA. A forced exit declares heartbeat loss on the hosts still awol;
    /// a graceful exit restarts their monitoring and clears heartbeat degrade.
    pub(crate) fn mnfa_exit(&mut self, force: bool) {
        if !self.mnfa.active {
            return;
        }
        self.mnfa.active = false;
        self.mnfa.occurrences += 1;
        self.mnfa.timer.stop();

        let members: Vec<HostId> = self
            .registry
            .iter()
            .filter(|(id, host)| {
                host.hbs_minor.values().any(|minor| *minor) || self.mnfa.awol.contains(id)
            })
            .map(|(id, _)| id)
            .collect();
        let awol = std::mem::take(&mut self.mnfa.awol);
        self.mnfa.minor = NetworkMap::default();

        for id in members {
            if let Some(host) = self.registry.get_mut(id) {
                host.hbs_minor = NetworkMap::default();
            }
            let outcome = if force && awol.contains(&id) {
                self.force_reenable(id, ArCause::Heartbeat, "heartbeat loss after multi-node failure timeout")
            } else {
                self.mnfa_recover_host(id)
            };
            if let Err(err) = outcome {
                warn!(error = %err, "mnfa exit handling failed");
            }
        }
        self.hbs_broadcast(HbsCommand::Recover);

        log_system_event(
            None,
            "mnfa-exit",
            if force { "multi-node failure avoidance timed out" } else { "multi-node failure avoidance cleared" },
            SystemEventOutcome::Success,
        );
        let agent = self.config.agent.hostname.clone();
        self.customer_log(&agent, LogKind::MnfaExit, "multi-node failure avoidance exited");
        if let Some(metrics) = &self.metrics {
            metrics.set_mnfa_active(false);
            metrics.record_mnfa_occurrence();
        }
    }

    fn mnfa_recover_host(&mut self, id: HostId) -> crate::Result<()> {
        self.pulse.restart_host(&mut self.registry, id);
        let host = self.host_mut(id)?;
        host.mnfa_graceful_recovery = true;
        self.clear_heartbeat_faults(id)
    }

    /// Clear heartbeat-minor for a host; may end MNFA or restart the host's recovery.
    pub(crate) fn mnfa_hbs_minor_clear(&mut self, id: HostId, network: Network) {
        let Some(host) = self.registry.get_mut(id) else {
            return;
        };
        if !host.hbs_minor[network] {
            return;
        }
        host.hbs_minor[network] = false;
        let still_minor = host.hbs_minor.values().any(|minor| *minor);
        let graceful = host.mnfa_graceful_recovery && !still_minor;
        let unlocked_enabled = host.is_unlocked_enabled();
        let name = host.hostname.clone();

        if self.mnfa.minor[network] == 0 {
            slog!(
                context = LogContext::host(&name).with_network(network.as_str()),
                "mnfa minor count underflow"
            );
        } else {
            self.mnfa.minor[network] -= 1;
        }
        if !still_minor {
            self.mnfa.awol_remove(id);
        }

        if self.mnfa.active {
            if self.mnfa.max_minor() < self.mnfa_threshold() {
                self.mnfa_exit(false);
            }
        } else if graceful {
            if let Some(host) = self.registry.get_mut(id) {
                host.mnfa_graceful_recovery = false;
            }
            if unlocked_enabled {
                info!(host = %name, "restarting graceful recovery after heartbeat recovered alone");
                if let Err(err) = self.change_admin_action(id, AdminAction::Recovery) {
                    warn!(host = %name, error = %err, "graceful recovery restart refused");
                }
            }
        }
    }

    /// Drop a host from MNFA accounting when it is locked or deleted.
    pub(crate) fn mnfa_forget(&mut self, id: HostId) {
        if let Some(host) = self.registry.get_mut(id) {
            for (network, minor) in host.hbs_minor.iter() {
                if *minor {
                    self.mnfa.minor[network] = self.mnfa.minor[network].saturating_sub(1);
                }
            }
            host.hbs_minor = NetworkMap::default();
        }
        self.mnfa.awol_remove(id);
        if self.mnfa.active && self.mnfa.max_minor() < self.mnfa_threshold() {
            self.mnfa_exit(false);
        }
    }

    /// Recompute per-network minor counts from host flags, logging any drift.
    pub(crate) fn mnfa_audit(&mut self) {
        for network in Network::ALL {
            let actual = self
                .registry
                .iter()
                .filter(|(_, host)| host.hbs_minor[network])
                .count();
            if actual != self.mnfa.minor[network] {
                slog!(
                    context = LogContext::new().with_network(network.as_str()),
                    "mnfa minor count {} does not match {actual} flagged hosts",
                    self.mnfa.minor[network]
                );
                self.mnfa.minor[network] = actual;
            }
        }
        let registry = &self.registry;
        self.mnfa.awol.retain(|id| registry.contains(*id));
        if self.mnfa.active && self.mnfa.max_minor() < self.mnfa_threshold() {
            self.mnfa_exit(false);
        }
    }
}

pub(crate) fn heartbeat_degrade_cause(network: Network) -> DegradeCause {
    match network {
        Network::Clstr => DegradeCause::HbsClstr,
        Network::Mgmnt | Network::Pxeboot => DegradeCause::HbsMgmnt,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use mtce_common::MtceConfig;

    use super::*;
    use crate::host::HostInfo;
    use crate::state::{AdminState, AvailStatus, NodeType, OperState};
    use crate::testing::RecordingServices;

    fn cluster(workers: usize) -> Maintenance {
        let mut config = MtceConfig::default();
        config.agent.hostname = "controller-0".to_owned();
        let recorder = RecordingServices::new();
        let mut mtce = Maintenance::new(config, recorder.services(), Instant::now());
        for index in 0..workers {
            let info = HostInfo::new(format!("compute-{index}"), format!("uuid-{index}"), NodeType::WORKER)
                .with_mgmt(format!("192.168.204.{}", index + 10), "")
                .with_states(AdminState::Unlocked, OperState::Enabled, AvailStatus::Available);
            let id = mtce.add_host(info).unwrap();
            mtce.change_admin_action(id, AdminAction::None).unwrap();
        }
        mtce
    }

    fn flag_minor(mtce: &mut Maintenance, hostname: &str) {
        let id = mtce.host_id(hostname).unwrap();
        mtce.registry.get_mut(id).unwrap().hbs_minor[Network::Mgmnt] = true;
    }

    #[test]
    fn audit_corrects_minor_count_drift() {
        let mut mtce = cluster(3);
        flag_minor(&mut mtce, "compute-1");
        mtce.mnfa.minor[Network::Mgmnt] = 3;

        mtce.audit_all();
        assert_eq!(mtce.mnfa().minor_count(Network::Mgmnt), 1);
        assert!(!mtce.mnfa().is_active());
    }

    #[test]
    fn audit_ends_mnfa_below_threshold() {
        let mut mtce = cluster(3);
        flag_minor(&mut mtce, "compute-0");
        mtce.mnfa.minor[Network::Mgmnt] = 2;
        mtce.mnfa.active = true;

        mtce.audit_all();
        assert!(!mtce.mnfa().is_active());
        assert_eq!(mtce.mnfa().minor_count(Network::Mgmnt), 0);
        assert_eq!(mtce.mnfa().occurrences(), 1);
        let host = mtce.host("compute-0").unwrap();
        assert!(!host.hbs_minor[Network::Mgmnt]);
    }

    #[test]
    fn forgetting_a_member_ends_mnfa_below_threshold() {
        let mut mtce = cluster(4);
        for name in ["compute-1", "compute-2"] {
            let id = mtce.host_id(name).unwrap();
            mtce.mnfa_add_host(id, Network::Mgmnt);
        }
        assert!(mtce.mnfa().is_active());
        assert_eq!(mtce.mnfa().occurrences(), 0);

        let gone = mtce.host_id("compute-1").unwrap();
        mtce.mnfa_forget(gone);
        assert!(!mtce.mnfa().is_active());
        assert_eq!(mtce.mnfa().occurrences(), 1);
        assert!(mtce.mnfa().awol().is_empty());
    }
}
