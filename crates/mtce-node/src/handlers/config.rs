//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "In-service configuration FSM."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{HostId, Network};
use mtce_logging::{mtce_info, LogContext};

use crate::alarm::{AlarmId, AlarmSeverity};
use crate::collab::{LogKind, MtcCommand};
use crate::error::Result;
use crate::host::{DegradeCause, MtcAliveFlags};
use crate::maintenance::Maintenance;
use crate::stage::{ConfigStage, Stage};
use crate::state::AdminAction;
use crate::timer::TimerKind;

impl Maintenance {
    /// Push a configuration change to an enabled host and verify it applied.
    pub(crate) fn config_handler(&mut self, id: HostId) -> Result<()> {
        let host = self.host_ref(id)?;
        let stage = host.stages.config;
        if stage == ConfigStage::Idle || host.admin_action != AdminAction::None {
            return Ok(());
        }
        if !host.is_unlocked_enabled() {
            // Deferred until the host is back in service.
            return Ok(());
        }
        let name = host.hostname.clone();
        match stage {
            ConfigStage::Idle => Ok(()),
            ConfigStage::Start => {
                self.host_mut(id)?.progress.config_result = None;
                self.mtc_send(id, MtcCommand::Config, &[Network::Mgmnt])?;
                let timeout = self.config.timeouts.config;
                self.start_timer(id, TimerKind::Config, timeout)?;
                self.set_stage(id, ConfigStage::Wait)
            }
            ConfigStage::Wait => {
                let result = self.host_ref(id)?.progress.config_result;
                match result {
                    Some(true) => {
                        self.stop_timer(id, TimerKind::Config)?;
                        self.set_stage(id, ConfigStage::Verify)
                    }
                    Some(false) => {
                        self.stop_timer(id, TimerKind::Config)?;
                        self.set_stage(id, ConfigStage::Failure)
                    }
                    None => {
                        if self.take_ring(id, TimerKind::Config)? {
                            self.set_stage(id, ConfigStage::Failure)?;
                        }
                        Ok(())
                    }
                }
            }
            ConfigStage::Verify => {
                let failed = self.host_ref(id)?.mtc_alive_flags.contains(MtcAliveFlags::CONFIG_FAIL);
                let next = if failed { ConfigStage::Failure } else { ConfigStage::Done };
                self.set_stage(id, next)
            }
            ConfigStage::Failure => {
                self.alarm_raise(id, AlarmId::Config, AlarmSeverity::Major, None)?;
                self.degrade_set(id, DegradeCause::Config)?;
                self.customer_log(&name, LogKind::ConfigFailed, format!("{name} configuration failed"));
                self.set_stage(id, ConfigStage::Idle)
            }
            ConfigStage::Done => {
                mtce_info!(context = LogContext::host(&name).with_action("config"), "configuration applied");
                self.alarm_clear(id, AlarmId::Config, None)?;
                self.degrade_clear(id, DegradeCause::Config)?;
                self.set_stage(id, ConfigStage::Idle)
            }
        }
    }

    /// Queue an in-service configuration push for the host.
    pub fn request_config(&mut self, hostname: &str) -> Result<()> {
        let id = self.resolve(hostname)?;
        self.set_stage(id, ConfigStage::START)
    }
}
