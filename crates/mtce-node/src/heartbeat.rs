//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Heartbeat event handling."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{ArCause, HostId, Network};
use mtce_heartbeat::{HeartbeatEvent, HeartbeatEventKind};
use tracing::{debug, info, warn};

use crate::alarm::{AlarmId, AlarmSeverity};
use crate::autorecovery::ArVerdict;
use crate::collab::{LogKind, VimEvent};
use crate::error::Result;
use crate::host::DegradeCause;
use crate::maintenance::Maintenance;
use crate::mnfa::heartbeat_degrade_cause;
use crate::stage::{ActionFsm, EnableStage, RecoveryStage};
use crate::state::{AdminAction, AdminState, AvailStatus, OperState};

impl Maintenance {
    pub(crate) fn handle_heartbeat_event(&mut self, event: HeartbeatEvent) {
        let id = event.host;
        if !self.registry.contains(id) {
            debug!(host = %event.hostname, event = event.kind.as_str(), "stale heartbeat event dropped");
            return;
        }
        let result = match event.kind {
            HeartbeatEventKind::MinorSet(network) => {
                self.mnfa_add_host(id, network);
                self.customer_log(
                    &event.hostname,
                    LogKind::HeartbeatMinor,
                    format!("{} heartbeat minor on {} network", event.hostname, network.entity_name()),
                );
                self.sync_heartbeat_alarm(id, network)
            }
            HeartbeatEventKind::MinorClear(network) => {
                self.mnfa_hbs_minor_clear(id, network);
                self.sync_heartbeat_alarm(id, network)
            }
            HeartbeatEventKind::DegradeSet(network) => {
                self.customer_log(
                    &event.hostname,
                    LogKind::HeartbeatDegrade,
                    format!("{} heartbeat degrade on {} network", event.hostname, network.entity_name()),
                );
                self.degrade_set(id, heartbeat_degrade_cause(network))
                    .and_then(|_| self.sync_heartbeat_alarm(id, network))
            }
            HeartbeatEventKind::DegradeClear(network) => self
                .degrade_clear(id, heartbeat_degrade_cause(network))
                .and_then(|_| self.sync_heartbeat_alarm(id, network)),
            HeartbeatEventKind::Loss(network) => self.heartbeat_loss(id, network),
            HeartbeatEventKind::LossClear(network) => {
                self.customer_log(
                    &event.hostname,
                    LogKind::HeartbeatRecovered,
                    format!("{} heartbeat recovered on {} network", event.hostname, network.entity_name()),
                );
                self.sync_heartbeat_alarm(id, network)
            }
            HeartbeatEventKind::PmondMissing => {
                self.customer_log(
                    &event.hostname,
                    LogKind::PmondMissing,
                    format!("{} process monitor is not responding", event.hostname),
                );
                self.degrade_set(id, DegradeCause::Pmond)
                    .and_then(|_| self.alarm_raise(id, AlarmId::Pmond, AlarmSeverity::Major, None))
            }
            HeartbeatEventKind::PmondClear => self
                .degrade_clear(id, DegradeCause::Pmond)
                .and_then(|_| self.alarm_clear(id, AlarmId::Pmond, None)),
            HeartbeatEventKind::Stall { unrecovered } => {
                let text = if unrecovered {
                    format!("{} is stalled and did not recover", event.hostname)
                } else {
                    format!("{} is stalled", event.hostname)
                };
                self.customer_log(&event.hostname, LogKind::Stalled, text);
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(host = %event.hostname, event = event.kind.as_str(), error = %err, "heartbeat event handling failed");
        }
    }

    /// Align the network heartbeat alarm with the tracker's threshold flags.
    fn sync_heartbeat_alarm(&mut self, id: HostId, network: Network) -> Result<()> {
        let Some(alarm) = AlarmId::heartbeat(network) else {
            return Ok(());
        };
        let state = &self.host_ref(id)?.hbs.net[network];
        let severity = if state.failure {
            AlarmSeverity::Critical
        } else if state.degrade {
            AlarmSeverity::Major
        } else if state.minor {
            AlarmSeverity::Minor
        } else {
            AlarmSeverity::Clear
        };
        self.alarm_raise(id, alarm, severity, Some(network))
    }

    fn heartbeat_loss(&mut self, id: HostId, network: Network) -> Result<()> {
        if let Some(metrics) = &self.metrics {
            metrics.record_heartbeat_loss(network.as_str());
        }
        let host = self.host_ref(id)?;
        let name = host.hostname.clone();
        if self.mnfa.active {
            info!(host = %name, network = network.as_str(), "heartbeat loss suppressed by multi-node failure avoidance");
            self.mnfa.awol_insert(id);
            return Ok(());
        }
        let soaking = matches!(
            host.stages.action,
            ActionFsm::Enable(EnableStage::HeartbeatSoak) | ActionFsm::Recovery(RecoveryStage::HeartbeatSoak)
        );
        if soaking {
            warn!(host = %name, network = network.as_str(), "heartbeat loss during soak");
            self.host_mut(id)?.progress.heartbeat_failed = true;
            return Ok(());
        }
        if !host.is_unlocked_enabled() {
            debug!(host = %name, "heartbeat loss ignored for out-of-service host");
            return Ok(());
        }
        let recovering = host.admin_action == AdminAction::Recovery;

        self.sync_heartbeat_alarm(id, network)?;
        self.customer_log(
            &name,
            LogKind::HeartbeatLoss,
            format!("{name} heartbeat loss on {} network", network.entity_name()),
        );
        if recovering {
            return Ok(());
        }
        self.change_admin_action(id, AdminAction::Recovery)
    }

    /// Fail the host and start a full re-enable, subject to auto-recovery.
    pub(crate) fn force_reenable(&mut self, id: HostId, cause: ArCause, reason: &str) -> Result<()> {
        let name = self.hostname_of(id)?;
        warn!(host = %name, reason, "forcing full re-enable");
        self.heartbeat_stop(id)?;
        self.force_all_state(id, AdminState::Unlocked, OperState::Disabled, AvailStatus::Failed)?;
        self.alarm_raise(id, AlarmId::Enable, AlarmSeverity::Critical, None)?;
        self.vim_notify(id, VimEvent::Failed)?;
        match self.ar_govern(id, cause)? {
            ArVerdict::Continue => self.change_admin_action(id, AdminAction::Enable),
            ArVerdict::Disabled => self.change_admin_action(id, AdminAction::None),
        }
    }
}
