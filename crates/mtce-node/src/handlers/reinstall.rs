//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Reinstall FSM."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{HostId, Network};

use crate::collab::{LogKind, MtcCommand};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::ReinstallStage;
use crate::state::AvailStatus;
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn reinstall_handler(&mut self, id: HostId, stage: ReinstallStage) -> Result<()> {
        match stage {
            ReinstallStage::Start => {
                let name = self.hostname_of(id)?;
                self.mtc_send(id, MtcCommand::Reinstall, &[Network::Mgmnt])?;
                self.customer_log(&name, LogKind::Reinstall, format!("{name} reinstall requested"));
                self.set_task(id, "Reinstalling")?;
                self.start_offline_watch(id)?;
                let timeout = self.offline_timeout();
                self.start_timer(id, TimerKind::Mtc, timeout)?;
                self.set_stage(id, ReinstallStage::OfflineWait)
            }
            ReinstallStage::OfflineWait => {
                if self.host_ref(id)?.mtc_alive_offline {
                    let host = self.host_mut(id)?;
                    host.mtc_alive_gate = false;
                    host.mtc_alive_online = false;
                    let timeout = self.config.timeouts.reinstall;
                    self.start_timer(id, TimerKind::Mtc, timeout)?;
                    return self.set_stage(id, ReinstallStage::OnlineWait);
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    self.set_task(id, "Reinstall failed, host did not go offline")?;
                    return self.set_stage(id, ReinstallStage::Fail);
                }
                Ok(())
            }
            ReinstallStage::OnlineWait => {
                if self.host_ref(id)?.mtc_alive_online {
                    self.stop_timer(id, TimerKind::Mtc)?;
                    return self.set_stage(id, ReinstallStage::Complete);
                }
                if self.take_ring(id, TimerKind::Mtc)? {
                    self.set_task(id, "Reinstall timeout")?;
                    return self.set_stage(id, ReinstallStage::Fail);
                }
                Ok(())
            }
            ReinstallStage::Complete => {
                let name = self.hostname_of(id)?;
                self.set_avail_status(id, AvailStatus::Online)?;
                self.customer_log(&name, LogKind::Reinstall, format!("{name} reinstall complete"));
                self.set_task(id, "Reinstall complete")?;
                self.reinstall_display(id)
            }
            ReinstallStage::Fail => self.reinstall_display(id),
            ReinstallStage::MsgDisplay => {
                if self.take_ring(id, TimerKind::Mtc)? {
                    self.set_task(id, "")?;
                    return self.set_stage(id, ReinstallStage::Done);
                }
                Ok(())
            }
            ReinstallStage::Done => self.finish_action(id),
        }
    }

    /// Hold the outcome in the task string for a while before clearing it.
    fn reinstall_display(&mut self, id: HostId) -> Result<()> {
        let hold = self.config.timeouts.reinstall_msg_display;
        self.start_timer(id, TimerKind::Mtc, hold)?;
        self.set_stage(id, ReinstallStage::MsgDisplay)
    }
}
