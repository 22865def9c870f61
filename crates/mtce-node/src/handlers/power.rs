//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Power-off and power-on FSM."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;
use mtce_logging::{mtce_warn, LogContext};

use crate::collab::{BmcAction, BmcPoll};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::{OnlineStage, PowerStage, Stage};
use crate::state::{AdminAction, AvailStatus};
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn power_handler(&mut self, id: HostId, stage: PowerStage) -> Result<()> {
        match stage {
            PowerStage::Start => {
                let host = self.host_ref(id)?;
                let power_on = host.admin_action == AdminAction::PowerOn;
                let (action, next, task) = if power_on {
                    (BmcAction::PowerOn, PowerStage::PowerOnWait, "Powering On")
                } else {
                    (BmcAction::PowerOff, PowerStage::PowerOffWait, "Powering Off")
                };
                if !host.bmc.is_provisioned() {
                    self.set_task(id, "Power action failed, board management not provisioned")?;
                    return self.set_stage(id, PowerStage::Fail);
                }
                if !self.bmc_start(id, action)? {
                    return self.power_retry(id, action);
                }
                self.set_task(id, task)?;
                let timeout = self.config.timeouts.power_action;
                self.start_timer(id, TimerKind::Mtc, timeout)?;
                self.set_stage(id, next)
            }
            PowerStage::PowerOffWait | PowerStage::PowerOnWait => {
                let action = if stage == PowerStage::PowerOnWait {
                    BmcAction::PowerOn
                } else {
                    BmcAction::PowerOff
                };
                match self.bmc_poll(id)? {
                    BmcPoll::Done(Ok(())) => {
                        self.stop_timer(id, TimerKind::Mtc)?;
                        if action == BmcAction::PowerOff {
                            self.set_avail_status(id, AvailStatus::PowerOff)?;
                        } else {
                            self.set_avail_status(id, AvailStatus::Offline)?;
                            self.host_mut(id)?.change_stage(OnlineStage::START);
                        }
                        self.set_stage(id, PowerStage::Done)
                    }
                    BmcPoll::Done(Err(reason)) => {
                        let name = self.hostname_of(id)?;
                        mtce_warn!(context = LogContext::host(&name).with_action(action.as_str()), "{reason}");
                        self.stop_timer(id, TimerKind::Mtc)?;
                        self.power_retry(id, action)
                    }
                    BmcPoll::Pending if !self.take_ring(id, TimerKind::Mtc)? => Ok(()),
                    BmcPoll::Pending | BmcPoll::Idle => {
                        self.bmc_cancel(id)?;
                        self.stop_timer(id, TimerKind::Mtc)?;
                        self.power_retry(id, action)
                    }
                }
            }
            PowerStage::Done => {
                self.set_task(id, "")?;
                self.finish_action(id)
            }
            PowerStage::Fail => self.finish_action(id),
        }
    }

    fn power_retry(&mut self, id: HostId, action: BmcAction) -> Result<()> {
        let limit = self.config.timeouts.power_retries;
        let host = self.host_mut(id)?;
        if host.progress.retries < limit {
            host.progress.retries += 1;
            return self.set_stage(id, PowerStage::Start);
        }
        let task = match action {
            BmcAction::PowerOn => "Power-On failed",
            _ => "Power-Off failed",
        };
        self.set_task(id, task)?;
        self.set_stage(id, PowerStage::Fail)
    }
}
