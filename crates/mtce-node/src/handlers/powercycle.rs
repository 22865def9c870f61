//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Powercycle FSM."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Power the host off, let it cool, power it back on and watch it boot.
//! A host that does not come back is cycled again up to the configured
//! attempt limit.

use mtce_common::HostId;
use mtce_logging::{mtce_info, mtce_warn, LogContext};

use crate::collab::{BmcAction, BmcPoll};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::PowercycleStage;
use crate::state::AvailStatus;
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn powercycle_handler(&mut self, id: HostId, stage: PowercycleStage) -> Result<()> {
        match stage {
            PowercycleStage::Start => {
                let limit = self.config.timeouts.powercycle_max_attempts;
                let host = self.host_mut(id)?;
                host.progress.powercycle_attempts += 1;
                let attempt = host.progress.powercycle_attempts;
                let provisioned = host.bmc.is_provisioned();
                let name = host.hostname.clone();
                if attempt > limit {
                    self.set_task(id, "Power-Cycle failed, attempts exhausted")?;
                    return self.set_stage(id, PowercycleStage::Fail);
                }
                if !provisioned {
                    self.set_task(id, "Power-Cycle failed, board management not provisioned")?;
                    return self.set_stage(id, PowercycleStage::Fail);
                }
                mtce_info!(context = LogContext::host(&name).with_action("powercycle"), "attempt {attempt} of {limit}");
                self.powercycle_bmc(id, BmcAction::PowerOff, PowercycleStage::OffWait, "Power-Cycle: powering off")
            }
            PowercycleStage::OffWait => match self.powercycle_poll(id)? {
                Some(true) => {
                    self.set_avail_status(id, AvailStatus::PowerOff)?;
                    let cooloff = self.config.timeouts.powercycle_cooloff;
                    self.start_timer(id, TimerKind::PowercycleCtrl, cooloff)?;
                    self.set_task(id, "Power-Cycle: cooling off")?;
                    self.set_stage(id, PowercycleStage::CoolOff)
                }
                Some(false) => self.powercycle_fail(id, "Power-Cycle failed, power-off"),
                None => Ok(()),
            },
            PowercycleStage::CoolOff => {
                if self.take_ring(id, TimerKind::PowercycleCtrl)? {
                    return self.powercycle_bmc(id, BmcAction::PowerOn, PowercycleStage::OnWait, "Power-Cycle: powering on");
                }
                Ok(())
            }
            PowercycleStage::OnWait => match self.powercycle_poll(id)? {
                Some(true) => {
                    self.set_avail_status(id, AvailStatus::Offline)?;
                    self.await_mtc_alive(id, TimerKind::PowercycleRecovery)?;
                    self.set_task(id, "Power-Cycle: booting")?;
                    self.set_stage(id, PowercycleStage::Monitor)
                }
                Some(false) => self.powercycle_fail(id, "Power-Cycle failed, power-on"),
                None => Ok(()),
            },
            PowercycleStage::Monitor => {
                if self.host_ref(id)?.mtc_alive_online {
                    let holdoff = self.config.timeouts.powercycle_holdoff;
                    self.start_timer(id, TimerKind::PowercycleRecovery, holdoff)?;
                    self.set_task(id, "Power-Cycle: holdoff")?;
                    return self.set_stage(id, PowercycleStage::Holdoff);
                }
                if self.take_ring(id, TimerKind::PowercycleRecovery)? {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name).with_action("powercycle"), "host did not boot after power-on");
                    return self.set_stage(id, PowercycleStage::Start);
                }
                Ok(())
            }
            PowercycleStage::Holdoff => {
                if self.take_ring(id, TimerKind::PowercycleRecovery)? {
                    return self.set_stage(id, PowercycleStage::Done);
                }
                Ok(())
            }
            PowercycleStage::Done => {
                self.set_task(id, "")?;
                self.finish_action(id)
            }
            PowercycleStage::Fail => self.finish_action(id),
        }
    }

    fn powercycle_bmc(
        &mut self,
        id: HostId,
        action: BmcAction,
        next: PowercycleStage,
        task: &str,
    ) -> Result<()> {
        if !self.bmc_start(id, action)? {
            return self.powercycle_fail(id, "Power-Cycle failed, board management busy");
        }
        let timeout = self.config.timeouts.power_action;
        self.start_timer(id, TimerKind::PowercycleCtrl, timeout)?;
        self.set_task(id, task)?;
        self.set_stage(id, next)
    }

    /// `Some(success)` once the board management request completed or timed out.
    fn powercycle_poll(&mut self, id: HostId) -> Result<Option<bool>> {
        match self.bmc_poll(id)? {
            BmcPoll::Done(result) => {
                self.stop_timer(id, TimerKind::PowercycleCtrl)?;
                if let Err(reason) = &result {
                    let name = self.hostname_of(id)?;
                    mtce_warn!(context = LogContext::host(&name).with_action("powercycle"), "{reason}");
                }
                Ok(Some(result.is_ok()))
            }
            BmcPoll::Pending if !self.take_ring(id, TimerKind::PowercycleCtrl)? => Ok(None),
            BmcPoll::Pending | BmcPoll::Idle => {
                self.bmc_cancel(id)?;
                self.stop_timer(id, TimerKind::PowercycleCtrl)?;
                Ok(Some(false))
            }
        }
    }

    fn powercycle_fail(&mut self, id: HostId, task: &str) -> Result<()> {
        self.set_task(id, task)?;
        self.set_stage(id, PowercycleStage::Fail)
    }
}
