//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Reset FSM."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;
use mtce_logging::{mtce_warn, LogContext};

use crate::collab::{BmcAction, BmcPoll, LogKind};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::ResetStage;
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn reset_handler(&mut self, id: HostId, stage: ResetStage) -> Result<()> {
        match stage {
            ResetStage::Start => {
                let name = self.hostname_of(id)?;
                if !self.host_ref(id)?.bmc.is_provisioned() {
                    self.set_task(id, "Reset failed, board management not provisioned")?;
                    return self.set_stage(id, ResetStage::Fail);
                }
                if !self.bmc_start(id, BmcAction::Reset)? {
                    self.set_task(id, "Reset failed, board management busy")?;
                    return self.set_stage(id, ResetStage::Fail);
                }
                self.customer_log(&name, LogKind::Reset, format!("{name} reset requested"));
                self.set_task(id, "Resetting")?;
                let timeout = self.config.timeouts.bmc_action;
                self.start_timer(id, TimerKind::ResetCtrl, timeout)?;
                self.set_stage(id, ResetStage::BmcResetWait)
            }
            ResetStage::BmcResetWait => match self.bmc_poll(id)? {
                BmcPoll::Done(Ok(())) => {
                    self.stop_timer(id, TimerKind::ResetCtrl)?;
                    self.start_offline_watch(id)?;
                    let timeout = self.offline_timeout();
                    self.start_timer(id, TimerKind::ResetRecovery, timeout)?;
                    self.set_stage(id, ResetStage::OfflineWait)
                }
                BmcPoll::Done(Err(reason)) => {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name).with_action("reset"), "reset failed: {reason}");
                    self.stop_timer(id, TimerKind::ResetCtrl)?;
                    self.set_task(id, "Reset failed")?;
                    self.set_stage(id, ResetStage::Fail)
                }
                BmcPoll::Pending if !self.take_ring(id, TimerKind::ResetCtrl)? => Ok(()),
                BmcPoll::Pending | BmcPoll::Idle => {
                    self.bmc_cancel(id)?;
                    self.stop_timer(id, TimerKind::ResetCtrl)?;
                    self.set_task(id, "Reset failed, no response from board management")?;
                    self.set_stage(id, ResetStage::Fail)
                }
            },
            ResetStage::OfflineWait => {
                if self.host_ref(id)?.mtc_alive_offline {
                    self.stop_timer(id, TimerKind::ResetRecovery)?;
                    return self.set_stage(id, ResetStage::Done);
                }
                if self.take_ring(id, TimerKind::ResetRecovery)? {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name).with_action("reset"), "host did not go offline after reset");
                    return self.set_stage(id, ResetStage::Done);
                }
                Ok(())
            }
            ResetStage::Done => {
                self.set_task(id, "")?;
                self.finish_action(id)
            }
            ResetStage::Fail => self.finish_action(id),
        }
    }
}
