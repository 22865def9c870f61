//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Per-host handler FSMs and the dispatcher."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Handler FSMs.
//!
//! Each tick the dispatcher walks the registry in list order. For every host
//! it first services the resident background FSMs, then advances the single
//! FSM selected by the host's admin action by at most one stage. Waiting
//! stages poll results latched by the event path and the ring flags of the
//! host's timers.

mod add;
mod config;
mod delete;
mod disable;
mod enable;
mod online;
mod periodic;
mod power;
mod powercycle;
mod reboot;
mod recovery;
mod reinstall;
mod reset;
mod swact;

use std::time::Duration;

use mtce_common::{HostId, Network};
use tracing::warn;

use crate::alarm::AlarmId;
use crate::collab::{BmcAction, BmcPoll, VimEvent};
use crate::error::Result;
use crate::host::Progress;
use crate::maintenance::Maintenance;
use crate::mnfa::heartbeat_degrade_cause;
use crate::stage::{ActionFsm, OfflineStage, OosTestStage, Stage};
use crate::state::{AdminAction, AdminState, AvailStatus, OperState};
use crate::timer::TimerKind;

/// What the dispatcher must do with a host after its handlers ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandlerOutcome {
    Continue,
    Remove,
}

impl Maintenance {
    /// Run every host's handlers once.
    pub(crate) fn dispatch(&mut self) {
        let mut removals = Vec::new();
        for id in self.registry.ids() {
            let handler = self
                .registry
                .get(id)
                .and_then(|host| host.stages.action.kind())
                .map(|kind| kind.as_str())
                .unwrap_or("background");
            match self.dispatch_host(id) {
                Ok(HandlerOutcome::Continue) => {}
                Ok(HandlerOutcome::Remove) => removals.push(id),
                Err(err) => {
                    warn!(handler, error = %err, "handler failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_handler_failure(handler);
                    }
                }
            }
        }
        for id in removals {
            if let Err(err) = self.remove_host(id) {
                warn!(error = %err, "host removal failed");
            }
        }
    }

    fn dispatch_host(&mut self, id: HostId) -> Result<HandlerOutcome> {
        self.offline_handler(id)?;
        self.online_handler(id)?;
        self.config_handler(id)?;
        self.insv_test_handler(id)?;
        self.oos_test_handler(id)?;

        let host = self.host_ref(id)?;
        if host.admin_action == AdminAction::None
            && host.admin_state == AdminState::Unlocked
            && host.oper_state == OperState::Disabled
            && !host.ar.disabled
        {
            tracing::info!(host = %host.hostname, "unlocked-disabled host, starting enable");
            self.change_admin_action(id, AdminAction::Enable)?;
        }

        let action = self.host_ref(id)?.stages.action;
        match action {
            ActionFsm::Idle => Ok(()),
            ActionFsm::Enable(stage) => self.enable_handler(id, stage),
            ActionFsm::Disable(stage) => self.disable_handler(id, stage),
            ActionFsm::Reset(stage) => self.reset_handler(id, stage),
            ActionFsm::Reboot(stage) => self.reboot_handler(id, stage),
            ActionFsm::Reinstall(stage) => self.reinstall_handler(id, stage),
            ActionFsm::Power(stage) => self.power_handler(id, stage),
            ActionFsm::Powercycle(stage) => self.powercycle_handler(id, stage),
            ActionFsm::Recovery(stage) => self.recovery_handler(id, stage),
            ActionFsm::Add(stage) => self.add_handler(id, stage),
            ActionFsm::Delete(stage) => return self.delete_handler(id, stage),
            ActionFsm::Swact(stage) => self.swact_handler(id, stage),
        }?;
        Ok(HandlerOutcome::Continue)
    }

    /// Complete the in-progress action and adopt the next queued one, if any.
    pub(crate) fn finish_action(&mut self, id: HostId) -> Result<()> {
        self.change_admin_action(id, AdminAction::None)
    }

    /// Restart the offline FSM so the host's disappearance is detected.
    pub(crate) fn start_offline_watch(&mut self, id: HostId) -> Result<()> {
        let host = self.host_mut(id)?;
        host.mtc_alive_offline = false;
        host.progress.offline_misses = 0;
        host.change_stage(OfflineStage::Start);
        Ok(())
    }

    /// Open the mtcAlive gate and forget the last sighting, then wait for a fresh one.
    pub(crate) fn await_mtc_alive(&mut self, id: HostId, kind: TimerKind) -> Result<()> {
        let patience = self.config.timeouts.mtcalive + self.dor_extension();
        let host = self.host_mut(id)?;
        host.mtc_alive_gate = false;
        host.mtc_alive_online = false;
        self.start_timer(id, kind, patience)
    }

    /// Upper bound for a host to be declared offline by the offline FSM.
    pub(crate) fn offline_timeout(&self) -> Duration {
        let timeouts = &self.config.timeouts;
        timeouts.offline_period * (timeouts.offline_threshold + 2) + timeouts.command_ack
    }

    pub(crate) fn goenabled_timeout(&self) -> Duration {
        self.config.timeouts.goenabled + self.dor_extension()
    }

    /// Reset per-attempt results while keeping the retry count.
    pub(crate) fn reset_progress(&mut self, id: HostId) -> Result<()> {
        let host = self.host_mut(id)?;
        host.progress = Progress {
            retries: host.progress.retries,
            powercycle_attempts: host.progress.powercycle_attempts,
            ..Progress::default()
        };
        Ok(())
    }

    /// Drop heartbeat alarms and degrade left over from a failed period.
    pub(crate) fn clear_heartbeat_faults(&mut self, id: HostId) -> Result<()> {
        for network in [Network::Mgmnt, Network::Clstr] {
            self.degrade_clear(id, heartbeat_degrade_cause(network))?;
            if let Some(alarm) = AlarmId::heartbeat(network) {
                self.alarm_clear(id, alarm, Some(network))?;
            }
        }
        Ok(())
    }

    /// Declare the host unlocked-enabled after a successful enable or recovery.
    pub(crate) fn declare_enabled(&mut self, id: HostId) -> Result<()> {
        self.clear_heartbeat_faults(id)?;
        self.set_oper_state(id, OperState::Enabled)?;
        let host = self.host_mut(id)?;
        host.mnfa_graceful_recovery = false;
        let degraded = !host.degrade_mask.is_empty();
        let (avail, event) = if degraded {
            (AvailStatus::Degraded, VimEvent::Degraded)
        } else {
            (AvailStatus::Available, VimEvent::Enabled)
        };
        self.set_avail_status(id, avail)?;
        self.alarm_clear(id, AlarmId::Enable, None)?;
        self.vim_notify(id, event)?;
        self.set_task(id, "")?;
        self.ar_enable(id)
    }

    /// Issue a board management request, preempting an access check in flight.
    /// Returns whether the request was accepted.
    pub(crate) fn bmc_start(&mut self, id: HostId, action: BmcAction) -> Result<bool> {
        let host = self.host_mut(id)?;
        let name = host.hostname.clone();
        let info = host.bmc.clone();
        if host.stages.oos_test == OosTestStage::BmcAccessResult {
            host.change_stage(OosTestStage::START);
            host.timers.stop(TimerKind::BmcAccess);
            self.services.bmc.cancel(&name);
        }
        match self.services.bmc.start(&name, action, &info) {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(host = %name, action = action.as_str(), error = %err, "board management request rejected");
                Ok(false)
            }
        }
    }

    pub(crate) fn bmc_poll(&self, id: HostId) -> Result<BmcPoll> {
        let host = self.host_ref(id)?;
        Ok(self.services.bmc.poll(&host.hostname))
    }

    pub(crate) fn bmc_cancel(&self, id: HostId) -> Result<()> {
        let host = self.host_ref(id)?;
        self.services.bmc.cancel(&host.hostname);
        Ok(())
    }
}
