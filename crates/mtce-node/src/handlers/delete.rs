//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Delete FSM."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;

use crate::collab::{HbsCommand, HwmonCommand};
use crate::error::Result;
use crate::handlers::HandlerOutcome;
use crate::maintenance::{report, Maintenance};
use crate::stage::DeleteStage;
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn delete_handler(&mut self, id: HostId, stage: DeleteStage) -> Result<HandlerOutcome> {
        match stage {
            DeleteStage::Start => {
                let name = self.hostname_of(id)?;
                self.set_task(id, "Deleting")?;
                self.heartbeat_stop(id)?;
                self.hbs_send(id, HbsCommand::Delete)?;
                report("hwmon", &name, self.services.hwmon.send(&name, HwmonCommand::Delete));
                let raised: Vec<_> = self.host_ref(id)?.alarms.raised().map(|(alarm, _)| alarm).collect();
                for alarm in raised {
                    self.alarm_clear(id, alarm, alarm.network())?;
                }
                let wait = self.config.timeouts.delete_wait;
                self.start_timer(id, TimerKind::Mtc, wait)?;
                self.set_stage(id, DeleteStage::DisableWait)?;
            }
            DeleteStage::DisableWait => {
                if self.take_ring(id, TimerKind::Mtc)? {
                    self.set_stage(id, DeleteStage::Done)?;
                }
            }
            DeleteStage::Done => return Ok(HandlerOutcome::Remove),
        }
        Ok(HandlerOutcome::Continue)
    }
}
