//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Auto-recovery governor."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Bounded self-healing.
//!
//! Every failure path in the enable and recovery FSMs asks [`Maintenance::ar_govern`]
//! before retrying. Counts are kept per cause. The active controller with no
//! in-service standby keeps its count in a file so a restarted agent does not
//! reboot the last controller forever; all other hosts count in memory.

use mtce_common::{ArCause, HostId};
use mtce_logging::{mtce_info, mtce_warn, LogContext};
use tracing::warn;

use crate::collab::LogKind;
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::state::{AdminState, AvailStatus, OperState};
use crate::timer::TimerKind;

/// Outcome of a governor consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArVerdict {
    /// Retry after the cause's interval.
    Continue,
    /// Retries are exhausted; the caller must stop.
    Disabled,
}

impl Maintenance {
    /// True for this agent's own controller when no other controller is in service.
    pub(crate) fn is_active_controller_without_standby(&self, id: HostId) -> bool {
        let Some(host) = self.registry.get(id) else {
            return false;
        };
        if host.hostname != self.config.agent.hostname {
            return false;
        }
        !self
            .registry
            .iter()
            .any(|(other, peer)| other != id && peer.is_controller() && peer.is_unlocked_enabled())
    }

    /// Account for one failure of `cause` and decide whether another attempt is allowed.
    pub fn ar_govern(&mut self, id: HostId, cause: ArCause) -> Result<ArVerdict> {
        let host = self.host_ref(id)?;
        if host.admin_state == AdminState::Locked || host.ar.disabled {
            return Ok(ArVerdict::Continue);
        }
        let name = host.hostname.clone();
        let limits = *self.config.auto_recovery.cause(cause);

        let (count, persisted) = if self.is_active_controller_without_standby(id) {
            let count = match self.ar_store.increment(&name) {
                Ok(count) => count,
                Err(err) => {
                    warn!(host = %name, error = %err, "auto-recovery count file update failed");
                    self.host_ref(id)?.ar.count(cause) + 1
                }
            };
            (count, true)
        } else {
            (self.host_ref(id)?.ar.count(cause) + 1, false)
        };
        {
            let host = self.host_mut(id)?;
            host.ar.counts[cause.index()] = count;
            host.ar.cause = Some(cause);
        }

        if count < limits.threshold {
            mtce_info!(
                context = LogContext::host(&name),
                "auto-recovery {cause} attempt {count} of {}",
                limits.threshold
            );
            self.start_timer(id, TimerKind::AutoRecovery, limits.interval)?;
            return Ok(ArVerdict::Continue);
        }

        mtce_warn!(
            context = LogContext::host(&name),
            "auto-recovery disabled after {count} {cause} failures"
        );
        self.host_mut(id)?.ar.disabled = true;
        if persisted {
            self.force_all_state(id, AdminState::Unlocked, OperState::Enabled, AvailStatus::Degraded)?;
        } else {
            self.force_all_state(id, AdminState::Unlocked, OperState::Disabled, AvailStatus::Failed)?;
        }
        let banner = self.config.auto_recovery.banner(cause);
        self.set_task(id, banner)?;
        self.customer_log(
            &name,
            LogKind::ArDisabled,
            format!("{name} auto recovery disabled: {banner}"),
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_ar_disabled(cause.as_str());
        }
        Ok(ArVerdict::Disabled)
    }

    /// Forget every failure count for the host.
    pub fn ar_enable(&mut self, id: HostId) -> Result<()> {
        let host = self.host_mut(id)?;
        let was_disabled = host.ar.disabled;
        host.ar = Default::default();
        host.timers.stop(TimerKind::AutoRecovery);
        let name = host.hostname.clone();
        if let Err(err) = self.ar_store.clear(&name) {
            warn!(host = %name, error = %err, "auto-recovery count file clear failed");
        }
        if was_disabled {
            mtce_info!(context = LogContext::host(&name), "auto-recovery re-enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use mtce_common::MtceConfig;

    use super::*;
    use crate::host::HostInfo;
    use crate::state::{AdminAction, NodeType};
    use crate::testing::RecordingServices;

    fn context(dir: &std::path::Path, me: &str) -> (Maintenance, RecordingServices) {
        let mut config = MtceConfig::default();
        config.agent.hostname = me.to_owned();
        config.agent.tmp_dir = dir.to_path_buf();
        config.auto_recovery.goenable.threshold = 3;
        config.auto_recovery.goenable.interval = Duration::from_secs(30);
        let recorder = RecordingServices::new();
        let mtce = Maintenance::new(config, recorder.services(), Instant::now());
        (mtce, recorder)
    }

    fn unlocked(mtce: &mut Maintenance, name: &str, personality: NodeType) -> HostId {
        let info = HostInfo::new(name, format!("uuid-{name}"), personality)
            .with_mgmt(format!("10.0.0.{}", name.len()), "")
            .with_states(AdminState::Unlocked, OperState::Disabled, AvailStatus::Offline);
        let id = mtce.add_host(info).unwrap();
        mtce.change_admin_action(id, AdminAction::None).unwrap();
        id
    }

    #[test]
    fn in_memory_count_disables_on_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let (mut mtce, recorder) = context(dir.path(), "controller-0");
        let id = unlocked(&mut mtce, "compute-0", NodeType::WORKER);

        assert_eq!(mtce.ar_govern(id, ArCause::GoEnable).unwrap(), ArVerdict::Continue);
        assert_eq!(mtce.ar_govern(id, ArCause::GoEnable).unwrap(), ArVerdict::Continue);
        assert!(mtce.host("compute-0").unwrap().timers().is_armed(TimerKind::AutoRecovery));
        assert_eq!(mtce.ar_govern(id, ArCause::GoEnable).unwrap(), ArVerdict::Disabled);

        let host = mtce.host("compute-0").unwrap();
        assert!(host.ar_state().disabled);
        assert_eq!(host.avail_status(), AvailStatus::Failed);
        assert_eq!(host.task(), mtce.config().auto_recovery.banner(ArCause::GoEnable));
        assert_eq!(recorder.customer_logs_of("compute-0", LogKind::ArDisabled), 1);
        assert!(!mtce.ar_store.path_for("compute-0").exists());

        // Further failures are no-ops once disabled.
        assert_eq!(mtce.ar_govern(id, ArCause::GoEnable).unwrap(), ArVerdict::Continue);
        assert_eq!(mtce.host("compute-0").unwrap().ar_state().count(ArCause::GoEnable), 3);
    }

    #[test]
    fn lone_active_controller_persists_and_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let (mut mtce, _recorder) = context(dir.path(), "controller-0");
        let id = unlocked(&mut mtce, "controller-0", NodeType::CONTROLLER);

        for _ in 0..2 {
            assert_eq!(mtce.ar_govern(id, ArCause::GoEnable).unwrap(), ArVerdict::Continue);
        }
        assert_eq!(mtce.ar_store.read("controller-0").unwrap(), 2);
        assert_eq!(mtce.ar_govern(id, ArCause::GoEnable).unwrap(), ArVerdict::Disabled);

        let host = mtce.host("controller-0").unwrap();
        assert_eq!(host.oper_state(), OperState::Enabled);
        assert_eq!(host.avail_status(), AvailStatus::Degraded);

        mtce.ar_enable(id).unwrap();
        let host = mtce.host("controller-0").unwrap();
        assert!(!host.ar_state().disabled);
        assert_eq!(host.ar_state().count(ArCause::GoEnable), 0);
        assert!(!mtce.ar_store.path_for("controller-0").exists());
    }

    #[test]
    fn locked_hosts_are_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut mtce, _recorder) = context(dir.path(), "controller-0");
        let info = HostInfo::new("storage-0", "uuid-s0", NodeType::STORAGE);
        let id = mtce.add_host(info).unwrap();
        assert_eq!(mtce.ar_govern(id, ArCause::Config).unwrap(), ArVerdict::Continue);
        assert_eq!(mtce.host("storage-0").unwrap().ar_state().count(ArCause::Config), 0);
    }
}
