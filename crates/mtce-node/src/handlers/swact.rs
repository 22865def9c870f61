//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Swact FSM: hand controller services over to the peer."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;
use mtce_logging::{mtce_warn, LogContext};

use crate::collab::{LogKind, SwactPoll};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::SwactStage;
use crate::state::AdminAction;
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn swact_handler(&mut self, id: HostId, stage: SwactStage) -> Result<()> {
        let host = self.host_ref(id)?;
        let name = host.hostname.clone();
        let force = host.admin_action == AdminAction::ForceSwact;
        let controller = host.is_controller();
        match stage {
            SwactStage::Start => {
                if !controller {
                    return self.swact_fail(id, "Swact rejected, not a controller");
                }
                self.set_task(id, "Swact: requesting")?;
                self.set_stage(id, SwactStage::Query)
            }
            SwactStage::Query => match self.services.sm.query_swact(&name) {
                Ok(true) => self.set_stage(id, SwactStage::Request),
                Ok(false) if force => {
                    mtce_warn!(context = LogContext::host(&name).with_action("force-swact"), "service manager refused, forcing");
                    self.set_stage(id, SwactStage::Request)
                }
                Ok(false) => self.swact_fail(id, "Swact refused by service manager"),
                Err(err) => {
                    mtce_warn!(context = LogContext::host(&name).with_action("swact"), "swact query failed: {err}");
                    self.swact_fail(id, "Swact failed, service manager unavailable")
                }
            },
            SwactStage::Request => match self.services.sm.request_swact(&name, force) {
                Ok(()) => {
                    let timeout = self.config.timeouts.swact;
                    self.start_timer(id, TimerKind::Swact, timeout)?;
                    self.set_task(id, "Swact: in progress")?;
                    self.set_stage(id, SwactStage::Poll)
                }
                Err(err) => {
                    mtce_warn!(context = LogContext::host(&name).with_action("swact"), "swact request failed: {err}");
                    self.swact_fail(id, "Swact failed")
                }
            },
            SwactStage::Poll => match self.services.sm.poll_swact(&name) {
                SwactPoll::Done(true) => {
                    self.stop_timer(id, TimerKind::Swact)?;
                    self.customer_log(&name, LogKind::Swact, format!("{name} swact complete"));
                    self.set_task(id, "")?;
                    self.set_stage(id, SwactStage::Done)
                }
                SwactPoll::Done(false) => {
                    self.stop_timer(id, TimerKind::Swact)?;
                    self.swact_fail(id, "Swact failed")
                }
                SwactPoll::Pending => {
                    if self.take_ring(id, TimerKind::Swact)? {
                        return self.swact_fail(id, "Swact timeout");
                    }
                    Ok(())
                }
            },
            SwactStage::Done | SwactStage::Fail => self.finish_action(id),
        }
    }

    fn swact_fail(&mut self, id: HostId, task: &str) -> Result<()> {
        self.set_task(id, task)?;
        self.set_stage(id, SwactStage::Fail)
    }
}
