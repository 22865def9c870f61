//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Add FSM: bring a newly registered host under maintenance."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;
use tracing::{debug, warn};

use crate::alarm::{entity_path, AlarmId, AlarmSeverity};
use crate::collab::{HbsCommand, HwmonCommand};
use crate::error::Result;
use crate::maintenance::{report, Maintenance};
use crate::stage::{AddStage, OnlineStage, OosTestStage, Stage};

impl Maintenance {
    pub(crate) fn add_handler(&mut self, id: HostId, stage: AddStage) -> Result<()> {
        match stage {
            AddStage::Start => {
                self.set_task(id, "")?;
                self.set_stage(id, AddStage::AlarmQuery)
            }
            AddStage::AlarmQuery => {
                self.seed_alarm_cache(id)?;
                self.set_stage(id, AddStage::BmcInfo)
            }
            AddStage::BmcInfo => {
                let host = self.host_mut(id)?;
                if host.bmc.is_provisioned() {
                    host.bmc_accessible = false;
                    host.change_stage(OosTestStage::START);
                    let name = host.hostname.clone();
                    report("hwmon", &name, self.services.hwmon.send(&name, HwmonCommand::Add));
                }
                self.set_stage(id, AddStage::MonitorStart)
            }
            AddStage::MonitorStart => {
                self.hbs_send(id, HbsCommand::Add)?;
                let host = self.host_mut(id)?;
                host.mtc_alive_gate = false;
                host.change_stage(OnlineStage::START);
                let (enabled, locked) = (host.is_unlocked_enabled(), host.is_locked());
                if enabled {
                    self.heartbeat_start(id)?;
                } else if locked {
                    self.alarm_raise(id, AlarmId::Lock, AlarmSeverity::Warning, None)?;
                }
                self.set_stage(id, AddStage::Done)
            }
            AddStage::Done => self.finish_action(id),
        }
    }

    /// Learn which alarms the fault manager already holds for the host.
    fn seed_alarm_cache(&mut self, id: HostId) -> Result<()> {
        let name = self.hostname_of(id)?;
        for &alarm in AlarmId::ALL {
            let entity = entity_path(&name, alarm.network());
            match self.services.alarm.query_alarm(&name, alarm, &entity) {
                Ok(AlarmSeverity::Clear) => {}
                Ok(severity) => {
                    debug!(host = %name, alarm = alarm.as_str(), severity = severity.as_str(), "alarm already raised");
                    self.host_mut(id)?.alarms.set(alarm, severity);
                }
                Err(err) => warn!(host = %name, alarm = alarm.as_str(), error = %err, "alarm query failed"),
            }
        }
        Ok(())
    }
}
