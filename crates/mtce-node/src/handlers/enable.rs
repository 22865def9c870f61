//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Enable FSM: unlock, auto-enable and subfunction enable."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{ArCause, HostId, Network};
use mtce_logging::{mtce_info, mtce_warn, LogContext};

use crate::alarm::{AlarmId, AlarmSeverity};
use crate::autorecovery::ArVerdict;
use crate::collab::{LogKind, MtcCommand, VimEvent};
use crate::error::Result;
use crate::host::MtcAliveFlags;
use crate::maintenance::Maintenance;
use crate::stage::EnableStage;
use crate::state::{AdminState, AvailStatus, OperState};
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn enable_handler(&mut self, id: HostId, stage: EnableStage) -> Result<()> {
        match stage {
            EnableStage::Start => {
                self.reset_progress(id)?;
                let host = self.host_ref(id)?;
                let reboot = host.mtc_alive_online || host.progress.retries > 0;
                self.set_oper_state(id, OperState::Disabled)?;
                if reboot {
                    self.set_stage(id, EnableStage::RebootRequest)
                } else {
                    self.enable_await_mtc_alive(id)
                }
            }
            EnableStage::RebootRequest => {
                let name = self.hostname_of(id)?;
                self.host_mut(id)?.mtc_alive_gate = false;
                self.mtc_send(id, MtcCommand::Reboot, &[Network::Mgmnt, Network::Clstr])?;
                self.customer_log(&name, LogKind::Reboot, format!("{name} is rebooting for enable"));
                self.set_task(id, "Rebooting")?;
                self.start_offline_watch(id)?;
                let timeout = self.offline_timeout();
                self.start_timer(id, TimerKind::Mtc, timeout)?;
                self.set_stage(id, EnableStage::OfflineWait)
            }
            EnableStage::OfflineWait => {
                if self.host_ref(id)?.mtc_alive_offline {
                    self.stop_timer(id, TimerKind::Mtc)?;
                    return self.enable_await_mtc_alive(id);
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name), "host did not go offline after reboot request");
                    return self.enable_await_mtc_alive(id);
                }
                Ok(())
            }
            EnableStage::MtcAliveWait => {
                let host = self.host_ref(id)?;
                let (online, flags) = (host.mtc_alive_online, host.mtc_alive_flags);
                if online {
                    self.stop_timer(id, TimerKind::MtcAlive)?;
                    if flags.contains(MtcAliveFlags::CONFIG_FAIL) {
                        return self.enable_fail(id, Some(ArCause::Config), "Configuration failure");
                    }
                    self.set_avail_status(id, AvailStatus::Intest)?;
                    self.set_task(id, "Testing")?;
                    let timeout = self.goenabled_timeout();
                    self.start_timer(id, TimerKind::Mtc, timeout)?;
                    return self.set_stage(id, EnableStage::GoEnabledWait);
                }
                if self.take_ring(id, TimerKind::MtcAlive)? {
                    return self.enable_fail(id, None, "Boot timeout");
                }
                Ok(())
            }
            EnableStage::GoEnabledWait => {
                let result = self.host_ref(id)?.progress.goenabled;
                match result {
                    Some(true) => {
                        self.stop_timer(id, TimerKind::Mtc)?;
                        self.set_stage(id, EnableStage::HostServicesStart)
                    }
                    Some(false) => self.enable_fail(id, Some(ArCause::GoEnable), "In-Test failure"),
                    None if self.take_ring(id, TimerKind::Mtc)? => {
                        self.enable_fail(id, Some(ArCause::GoEnable), "In-Test timeout")
                    }
                    None => Ok(()),
                }
            }
            EnableStage::HostServicesStart => {
                self.host_mut(id)?.progress.host_services = None;
                self.mtc_send(id, MtcCommand::StartHostServices, &[Network::Mgmnt])?;
                self.set_task(id, "Initializing")?;
                let timeout = self.config.timeouts.host_services;
                self.start_timer(id, TimerKind::Mtc, timeout)?;
                self.set_stage(id, EnableStage::HostServicesWait)
            }
            EnableStage::HostServicesWait => {
                let result = self.host_ref(id)?.progress.host_services;
                match result {
                    Some(true) => {
                        self.stop_timer(id, TimerKind::Mtc)?;
                        if self.host_ref(id)?.is_all_in_one() {
                            self.host_mut(id)?.progress.goenabled_subf = None;
                            let timeout = self.goenabled_timeout();
                            self.start_timer(id, TimerKind::Mtc, timeout)?;
                            self.set_stage(id, EnableStage::SubfGoEnabledWait)
                        } else {
                            self.set_stage(id, EnableStage::HeartbeatStart)
                        }
                    }
                    Some(false) => self.enable_fail(id, Some(ArCause::HostServices), "Service failure"),
                    None if self.take_ring(id, TimerKind::Mtc)? => {
                        self.enable_fail(id, Some(ArCause::HostServices), "Service timeout")
                    }
                    None => Ok(()),
                }
            }
            EnableStage::SubfGoEnabledWait => {
                let result = self.host_ref(id)?.progress.goenabled_subf;
                match result {
                    Some(true) => {
                        self.host_mut(id)?.progress.host_services_subf = None;
                        self.mtc_send(id, MtcCommand::StartSubfServices, &[Network::Mgmnt])?;
                        let timeout = self.config.timeouts.host_services;
                        self.start_timer(id, TimerKind::Mtc, timeout)?;
                        self.set_stage(id, EnableStage::SubfServicesWait)
                    }
                    Some(false) => self.subf_fail(id, ArCause::GoEnable, "Worker In-Test failure"),
                    None if self.take_ring(id, TimerKind::Mtc)? => {
                        self.subf_fail(id, ArCause::GoEnable, "Worker In-Test timeout")
                    }
                    None => {
                        // Entered directly by an enable-subf request.
                        if !self.host_ref(id)?.timers.is_armed(TimerKind::Mtc) {
                            let timeout = self.goenabled_timeout();
                            self.start_timer(id, TimerKind::Mtc, timeout)?;
                        }
                        Ok(())
                    }
                }
            }
            EnableStage::SubfServicesWait => {
                let result = self.host_ref(id)?.progress.host_services_subf;
                match result {
                    Some(true) => {
                        self.stop_timer(id, TimerKind::Mtc)?;
                        self.set_oper_state_subf(id, OperState::Enabled)?;
                        self.set_avail_status_subf(id, AvailStatus::Available)?;
                        self.alarm_clear(id, AlarmId::SubfEnable, None)?;
                        self.set_stage(id, EnableStage::HeartbeatStart)
                    }
                    Some(false) => self.subf_fail(id, ArCause::HostServices, "Worker service failure"),
                    None if self.take_ring(id, TimerKind::Mtc)? => {
                        self.subf_fail(id, ArCause::HostServices, "Worker service timeout")
                    }
                    None => Ok(()),
                }
            }
            EnableStage::HeartbeatStart => {
                self.heartbeat_start(id)?;
                let soak = self.config.timeouts.heartbeat_soak;
                self.start_timer(id, TimerKind::Mtc, soak)?;
                self.set_stage(id, EnableStage::HeartbeatSoak)
            }
            EnableStage::HeartbeatSoak => {
                if self.host_ref(id)?.progress.heartbeat_failed {
                    self.stop_timer(id, TimerKind::Mtc)?;
                    return self.enable_fail(id, Some(ArCause::Heartbeat), "Heartbeat failure");
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    return self.set_stage(id, EnableStage::StateChange);
                }
                Ok(())
            }
            EnableStage::StateChange => {
                self.declare_enabled(id)?;
                let name = self.hostname_of(id)?;
                mtce_info!(context = LogContext::host(&name).with_action("enable"), "host is enabled");
                self.set_stage(id, EnableStage::Done)
            }
            EnableStage::Failure => {
                let cause = self.host_ref(id)?.progress.failure_cause;
                self.heartbeat_stop(id)?;
                self.force_all_state(id, AdminState::Unlocked, OperState::Disabled, AvailStatus::Failed)?;
                self.alarm_raise(id, AlarmId::Enable, AlarmSeverity::Critical, None)?;
                self.vim_notify(id, VimEvent::Failed)?;
                let verdict = match cause {
                    Some(cause) => self.ar_govern(id, cause)?,
                    None => {
                        let retry = self.config.timeouts.recovery_retry;
                        self.start_timer(id, TimerKind::AutoRecovery, retry)?;
                        ArVerdict::Continue
                    }
                };
                match verdict {
                    ArVerdict::Continue => self.set_stage(id, EnableStage::FailureWait),
                    ArVerdict::Disabled => self.finish_action(id),
                }
            }
            EnableStage::FailureWait => {
                if self.take_ring(id, TimerKind::AutoRecovery)? {
                    self.host_mut(id)?.progress.retries += 1;
                    return self.set_stage(id, EnableStage::Start);
                }
                Ok(())
            }
            EnableStage::Done => self.finish_action(id),
        }
    }

    fn enable_await_mtc_alive(&mut self, id: HostId) -> Result<()> {
        self.await_mtc_alive(id, TimerKind::MtcAlive)?;
        self.set_task(id, "Booting")?;
        self.set_stage(id, EnableStage::MtcAliveWait)
    }

    fn enable_fail(&mut self, id: HostId, cause: Option<ArCause>, task: &str) -> Result<()> {
        let name = self.hostname_of(id)?;
        mtce_warn!(
            context = LogContext::host(&name).with_action("enable"),
            "enable failed: {task}"
        );
        self.stop_timer(id, TimerKind::Mtc)?;
        self.host_mut(id)?.progress.failure_cause = cause;
        self.set_task(id, task)?;
        self.set_stage(id, EnableStage::Failure)
    }

    fn subf_fail(&mut self, id: HostId, cause: ArCause, task: &str) -> Result<()> {
        self.set_oper_state_subf(id, OperState::Disabled)?;
        self.set_avail_status_subf(id, AvailStatus::Failed)?;
        self.alarm_raise(id, AlarmId::SubfEnable, AlarmSeverity::Critical, None)?;
        self.enable_fail(id, Some(cause), task)
    }
}
