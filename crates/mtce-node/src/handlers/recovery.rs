//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Graceful recovery FSM."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Graceful recovery of an unlocked-enabled host that lost heartbeat.
//!
//! The host is given the chance to come back on its own. If it rebooted
//! (short uptime) it is re-tested and its services restarted; if it never
//! went down, heartbeat is simply restarted and soaked. Any failure along
//! the way, including heartbeat loss during the soak, forces a full
//! re-enable through the auto-recovery governor.

use mtce_common::time::format_uptime;
use mtce_common::{ArCause, HostId, Network};
use mtce_logging::{mtce_info, LogContext};

use crate::collab::MtcCommand;
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::RecoveryStage;
use crate::state::{AvailStatus, OperState};
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn recovery_handler(&mut self, id: HostId, stage: RecoveryStage) -> Result<()> {
        match stage {
            RecoveryStage::Start => {
                self.reset_progress(id)?;
                let host = self.host_mut(id)?;
                host.progress.retries += 1;
                let attempt = host.progress.retries;
                let name = host.hostname.clone();
                mtce_info!(context = LogContext::host(&name).with_action("recover"), "graceful recovery attempt {attempt}");
                self.heartbeat_stop(id)?;
                self.set_task(id, "Graceful Recovery Wait")?;
                self.await_mtc_alive(id, TimerKind::MtcAlive)?;
                self.set_stage(id, RecoveryStage::MtcAliveWait)
            }
            RecoveryStage::MtcAliveWait => {
                let host = self.host_ref(id)?;
                let (online, uptime, retries) = (host.mtc_alive_online, host.uptime, host.progress.retries);
                if online {
                    self.stop_timer(id, TimerKind::MtcAlive)?;
                    let name = self.hostname_of(id)?;
                    mtce_info!(
                        context = LogContext::host(&name).with_action("recover"),
                        "host reachable, up {}",
                        format_uptime(uptime)
                    );
                    let threshold = self.config.timeouts.recovery_uptime_threshold.as_secs();
                    if uptime < threshold {
                        // The host rebooted; it must pass its tests again.
                        self.set_oper_state(id, OperState::Disabled)?;
                        self.set_avail_status(id, AvailStatus::Intest)?;
                        self.set_task(id, "Testing")?;
                        self.host_mut(id)?.progress.goenabled = None;
                        let timeout = self.goenabled_timeout();
                        self.start_timer(id, TimerKind::Mtc, timeout)?;
                        return self.set_stage(id, RecoveryStage::GoEnabledWait);
                    }
                    return self.set_stage(id, RecoveryStage::HeartbeatStart);
                }
                if self.take_ring(id, TimerKind::MtcAlive)? {
                    if retries < self.config.timeouts.recovery_retries {
                        let retry = self.config.timeouts.recovery_retry;
                        self.start_timer(id, TimerKind::Mtc, retry)?;
                        return self.set_stage(id, RecoveryStage::RetryWait);
                    }
                    return self.recovery_fail(id, ArCause::Heartbeat);
                }
                Ok(())
            }
            RecoveryStage::RetryWait => {
                if self.take_ring(id, TimerKind::Mtc)? {
                    return self.set_stage(id, RecoveryStage::Start);
                }
                Ok(())
            }
            RecoveryStage::GoEnabledWait => {
                let result = self.host_ref(id)?.progress.goenabled;
                match result {
                    Some(true) => {
                        self.stop_timer(id, TimerKind::Mtc)?;
                        self.host_mut(id)?.progress.host_services = None;
                        self.mtc_send(id, MtcCommand::StartHostServices, &[Network::Mgmnt])?;
                        self.set_task(id, "Initializing")?;
                        let timeout = self.config.timeouts.host_services;
                        self.start_timer(id, TimerKind::Mtc, timeout)?;
                        self.set_stage(id, RecoveryStage::HostServicesWait)
                    }
                    Some(false) => self.recovery_fail(id, ArCause::GoEnable),
                    None if self.take_ring(id, TimerKind::Mtc)? => self.recovery_fail(id, ArCause::GoEnable),
                    None => Ok(()),
                }
            }
            RecoveryStage::HostServicesWait => {
                let result = self.host_ref(id)?.progress.host_services;
                match result {
                    Some(true) => {
                        self.stop_timer(id, TimerKind::Mtc)?;
                        self.set_stage(id, RecoveryStage::HeartbeatStart)
                    }
                    Some(false) => self.recovery_fail(id, ArCause::HostServices),
                    None if self.take_ring(id, TimerKind::Mtc)? => self.recovery_fail(id, ArCause::HostServices),
                    None => Ok(()),
                }
            }
            RecoveryStage::HeartbeatStart => {
                self.heartbeat_start(id)?;
                let soak = self.config.timeouts.heartbeat_soak;
                self.start_timer(id, TimerKind::Mtc, soak)?;
                self.set_task(id, "Heartbeat Soak")?;
                self.set_stage(id, RecoveryStage::HeartbeatSoak)
            }
            RecoveryStage::HeartbeatSoak => {
                if self.host_ref(id)?.progress.heartbeat_failed {
                    return self.recovery_fail(id, ArCause::Heartbeat);
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    return self.set_stage(id, RecoveryStage::StateChange);
                }
                Ok(())
            }
            RecoveryStage::StateChange => {
                self.declare_enabled(id)?;
                let name = self.hostname_of(id)?;
                mtce_info!(context = LogContext::host(&name).with_action("recover"), "graceful recovery complete");
                self.set_stage(id, RecoveryStage::Done)
            }
            RecoveryStage::ForceReenable => {
                let cause = self.host_ref(id)?.progress.failure_cause.unwrap_or(ArCause::Heartbeat);
                self.force_reenable(id, cause, "graceful recovery failed")
            }
            RecoveryStage::Done => self.finish_action(id),
        }
    }

    fn recovery_fail(&mut self, id: HostId, cause: ArCause) -> Result<()> {
        self.stop_timer(id, TimerKind::Mtc)?;
        self.host_mut(id)?.progress.failure_cause = Some(cause);
        self.set_stage(id, RecoveryStage::ForceReenable)
    }
}
