//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Reboot FSM with board management escalation."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{HostId, Network};
use mtce_logging::{mtce_info, mtce_warn, LogContext};

use crate::collab::{BmcAction, BmcPoll, LogKind, MtcCommand};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::RebootStage;
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn reboot_handler(&mut self, id: HostId, stage: RebootStage) -> Result<()> {
        match stage {
            RebootStage::Start => {
                let name = self.hostname_of(id)?;
                self.host_mut(id)?.progress.command_ack = false;
                self.mtc_send(id, MtcCommand::Reboot, &[Network::Mgmnt])?;
                self.customer_log(&name, LogKind::Reboot, format!("{name} reboot requested"));
                self.set_task(id, "Rebooting")?;
                let timeout = self.config.timeouts.command_ack;
                self.start_timer(id, TimerKind::Command, timeout)?;
                self.set_stage(id, RebootStage::RebootAck)
            }
            RebootStage::RebootAck => {
                if self.host_ref(id)?.progress.command_ack {
                    self.stop_timer(id, TimerKind::Command)?;
                    self.start_offline_watch(id)?;
                    let timeout = self.offline_timeout();
                    self.start_timer(id, TimerKind::Mtc, timeout)?;
                    return self.set_stage(id, RebootStage::OfflineWait);
                }
                if self.take_ring(id, TimerKind::Command)? {
                    return self.set_stage(id, RebootStage::Retry);
                }
                Ok(())
            }
            RebootStage::Retry => {
                let name = self.hostname_of(id)?;
                let limit = self.config.timeouts.reboot_retries;
                let host = self.host_mut(id)?;
                let provisioned = host.bmc.is_provisioned();
                if host.progress.retries < limit {
                    host.progress.retries += 1;
                    host.progress.command_ack = false;
                    let attempt = host.progress.retries;
                    mtce_info!(context = LogContext::host(&name).with_action("reboot"), "reboot retry {attempt} of {limit}");
                    self.mtc_send(id, MtcCommand::Reboot, &[Network::Mgmnt, Network::Clstr])?;
                    let timeout = self.config.timeouts.command_ack;
                    self.start_timer(id, TimerKind::Command, timeout)?;
                    return self.set_stage(id, RebootStage::RebootAck);
                }
                mtce_warn!(context = LogContext::host(&name).with_action("reboot"), "reboot request not acknowledged");
                if provisioned {
                    self.set_stage(id, RebootStage::BmcReset)
                } else {
                    self.set_task(id, "Reboot failed, no acknowledgement")?;
                    self.set_stage(id, RebootStage::Fail)
                }
            }
            RebootStage::BmcReset => {
                if !self.bmc_start(id, BmcAction::Reset)? {
                    self.set_task(id, "Reboot failed, board management busy")?;
                    return self.set_stage(id, RebootStage::Fail);
                }
                let name = self.hostname_of(id)?;
                self.customer_log(&name, LogKind::Reset, format!("{name} reset requested after unacknowledged reboot"));
                let timeout = self.config.timeouts.bmc_action;
                self.start_timer(id, TimerKind::ResetCtrl, timeout)?;
                self.set_stage(id, RebootStage::BmcResetWait)
            }
            RebootStage::BmcResetWait => match self.bmc_poll(id)? {
                BmcPoll::Done(Ok(())) => {
                    self.stop_timer(id, TimerKind::ResetCtrl)?;
                    self.start_offline_watch(id)?;
                    let timeout = self.offline_timeout();
                    self.start_timer(id, TimerKind::Mtc, timeout)?;
                    self.set_stage(id, RebootStage::OfflineWait)
                }
                BmcPoll::Done(Err(reason)) => {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name).with_action("reboot"), "reset failed: {reason}");
                    self.stop_timer(id, TimerKind::ResetCtrl)?;
                    self.set_task(id, "Reboot failed")?;
                    self.set_stage(id, RebootStage::Fail)
                }
                BmcPoll::Pending if !self.take_ring(id, TimerKind::ResetCtrl)? => Ok(()),
                BmcPoll::Pending | BmcPoll::Idle => {
                    self.bmc_cancel(id)?;
                    self.stop_timer(id, TimerKind::ResetCtrl)?;
                    self.set_task(id, "Reboot failed, no response from board management")?;
                    self.set_stage(id, RebootStage::Fail)
                }
            },
            RebootStage::OfflineWait => {
                if self.host_ref(id)?.mtc_alive_offline {
                    self.stop_timer(id, TimerKind::Mtc)?;
                    return self.set_stage(id, RebootStage::Done);
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    self.set_task(id, "Reboot failed, host did not go offline")?;
                    return self.set_stage(id, RebootStage::Fail);
                }
                Ok(())
            }
            RebootStage::Done => {
                self.set_task(id, "")?;
                self.finish_action(id)
            }
            RebootStage::Fail => self.finish_action(id),
        }
    }
}
