//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Disable FSM: lock and force-lock."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{HostId, Network};
use mtce_logging::{mtce_info, mtce_warn, LogContext};

use crate::alarm::{AlarmId, AlarmSeverity};
use crate::collab::{MtcCommand, VimEvent};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::{DisableStage, OnlineStage, Stage};
use crate::state::{AdminAction, AdminState, AvailStatus, OperState};
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn disable_handler(&mut self, id: HostId, stage: DisableStage) -> Result<()> {
        match stage {
            DisableStage::Start => {
                let force = self.host_ref(id)?.admin_action == AdminAction::ForceLock;
                self.set_admin_state(id, AdminState::Locked)?;
                self.heartbeat_stop(id)?;
                self.set_task(id, "Disabling")?;
                if force {
                    self.mtc_send(id, MtcCommand::Reset, &[Network::Mgmnt, Network::Clstr])?;
                    self.start_offline_watch(id)?;
                    let timeout = self.offline_timeout();
                    self.start_timer(id, TimerKind::Mtc, timeout)?;
                    self.set_stage(id, DisableStage::ForceLockResetWait)
                } else {
                    self.set_stage(id, DisableStage::DisableServices)
                }
            }
            DisableStage::ForceLockResetWait => {
                if self.host_ref(id)?.mtc_alive_offline {
                    self.stop_timer(id, TimerKind::Mtc)?;
                    return self.set_stage(id, DisableStage::TaskStateUpdate);
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name).with_action("force-lock"), "host did not go offline after reset");
                    return self.set_stage(id, DisableStage::TaskStateUpdate);
                }
                Ok(())
            }
            DisableStage::DisableServices => {
                self.host_mut(id)?.progress.command_ack = false;
                self.mtc_send(id, MtcCommand::StopHostServices, &[Network::Mgmnt])?;
                let timeout = self.config.timeouts.disable_services;
                self.start_timer(id, TimerKind::Mtc, timeout)?;
                self.set_stage(id, DisableStage::DisableServicesWait)
            }
            DisableStage::DisableServicesWait => {
                if self.host_ref(id)?.progress.command_ack {
                    self.stop_timer(id, TimerKind::Mtc)?;
                    return self.set_stage(id, DisableStage::TaskStateUpdate);
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name).with_action("lock"), "stop host services not acknowledged");
                    return self.set_stage(id, DisableStage::TaskStateUpdate);
                }
                Ok(())
            }
            DisableStage::TaskStateUpdate => {
                self.set_oper_state(id, OperState::Disabled)?;
                self.set_oper_state_subf(id, OperState::Disabled)?;
                let avail = if self.host_ref(id)?.mtc_alive_online {
                    AvailStatus::Online
                } else {
                    AvailStatus::Offline
                };
                self.set_avail_status(id, avail)?;
                self.clear_heartbeat_faults(id)?;
                self.alarm_clear(id, AlarmId::Enable, None)?;
                self.alarm_clear(id, AlarmId::SubfEnable, None)?;
                self.alarm_raise(id, AlarmId::Lock, AlarmSeverity::Warning, None)?;
                self.vim_notify(id, VimEvent::Disabled)?;
                self.set_task(id, "")?;
                let host = self.host_mut(id)?;
                host.progress.online_hits = 0;
                host.progress.online_misses = 0;
                host.change_stage(OnlineStage::START);
                let name = host.hostname.clone();
                mtce_info!(context = LogContext::host(&name).with_action("lock"), "host is locked-disabled-{avail}");
                self.set_stage(id, DisableStage::Disabled)
            }
            DisableStage::Disabled => self.finish_action(id),
        }
    }
}
