//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "In-service and out-of-service periodic test FSMs."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;
use tracing::warn;

use crate::alarm::{AlarmId, AlarmSeverity};
use crate::collab::{BmcAction, BmcPoll, LogKind};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::{InsvTestStage, OosTestStage};
use crate::state::AdminAction;
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn insv_test_handler(&mut self, id: HostId) -> Result<()> {
        let host = self.host_ref(id)?;
        if host.admin_action != AdminAction::None || !host.is_unlocked_enabled() {
            return Ok(());
        }
        let stage = host.stages.insv_test;
        match stage {
            InsvTestStage::Start => {
                let period = self.config.timeouts.insv_test;
                self.start_timer(id, TimerKind::InsvTest, period)?;
                self.set_stage(id, InsvTestStage::Wait)
            }
            InsvTestStage::Wait => {
                if self.take_ring(id, TimerKind::InsvTest)? {
                    self.set_stage(id, InsvTestStage::Run)?;
                }
                Ok(())
            }
            InsvTestStage::Run => {
                self.refresh_degrade(id)?;
                self.set_stage(id, InsvTestStage::Start)
            }
        }
    }

    pub(crate) fn oos_test_handler(&mut self, id: HostId) -> Result<()> {
        let host = self.host_ref(id)?;
        if host.admin_action != AdminAction::None {
            return Ok(());
        }
        let stage = host.stages.oos_test;
        let provisioned = host.bmc.is_provisioned();
        let name = host.hostname.clone();
        match stage {
            OosTestStage::Start => {
                let next = if provisioned {
                    OosTestStage::BmcAccessTest
                } else {
                    OosTestStage::Done
                };
                self.set_stage(id, next)
            }
            OosTestStage::BmcAccessTest => {
                let info = self.host_ref(id)?.bmc.clone();
                match self.services.bmc.start(&name, BmcAction::Query, &info) {
                    Ok(()) => {
                        let timeout = self.config.timeouts.bmc_action;
                        self.start_timer(id, TimerKind::BmcAccess, timeout)?;
                        self.set_stage(id, OosTestStage::BmcAccessResult)
                    }
                    Err(err) => {
                        warn!(host = %name, error = %err, "board management access check rejected");
                        self.bmc_access_result(id, false)?;
                        self.set_stage(id, OosTestStage::Done)
                    }
                }
            }
            OosTestStage::BmcAccessResult => {
                let accessible = match self.services.bmc.poll(&name) {
                    BmcPoll::Done(result) => result.is_ok(),
                    BmcPoll::Idle => false,
                    BmcPoll::Pending => {
                        if !self.take_ring(id, TimerKind::BmcAccess)? {
                            return Ok(());
                        }
                        self.services.bmc.cancel(&name);
                        false
                    }
                };
                self.stop_timer(id, TimerKind::BmcAccess)?;
                self.bmc_access_result(id, accessible)?;
                self.set_stage(id, OosTestStage::Done)
            }
            OosTestStage::Done => {
                let period = self.config.timeouts.oos_test;
                self.start_timer(id, TimerKind::OosTest, period)?;
                self.set_stage(id, OosTestStage::Wait)
            }
            OosTestStage::Wait => {
                if self.take_ring(id, TimerKind::OosTest)? {
                    self.set_stage(id, OosTestStage::Start)?;
                }
                Ok(())
            }
        }
    }

    /// Track board management reachability; the alarm follows the access check result.
    fn bmc_access_result(&mut self, id: HostId, accessible: bool) -> Result<()> {
        let host = self.host_mut(id)?;
        let changed = host.bmc_accessible != accessible;
        host.bmc_accessible = accessible;
        let name = host.hostname.clone();
        if accessible {
            self.alarm_clear(id, AlarmId::BmcAccess, None)?;
            if changed {
                self.customer_log(&name, LogKind::BmcAccess, format!("{name} board management access established"));
            }
        } else {
            let raised = self.host_ref(id)?.alarms.get(AlarmId::BmcAccess) != AlarmSeverity::Clear;
            self.alarm_raise(id, AlarmId::BmcAccess, AlarmSeverity::Minor, None)?;
            if changed || !raised {
                self.customer_log(&name, LogKind::BmcAccess, format!("{name} board management access lost"));
            }
        }
        Ok(())
    }
}
