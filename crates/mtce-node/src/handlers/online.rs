//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Online and offline FSMs driven by mtcAlive presence."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Presence tracking.
//!
//! The offline FSM runs on behalf of an action that expects the host to go
//! away (reboot, reset, power-off) and declares it offline after
//! `offline_threshold` silent periods. The online FSM audits locked hosts
//! and flips their availability between online and offline with hysteresis.

use mtce_common::{HostId, Network};
use tracing::debug;

use crate::collab::MtcCommand;
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::stage::{OfflineStage, OnlineStage};
use crate::state::{AdminAction, AdminState, AvailStatus};
use crate::timer::TimerKind;

impl Maintenance {
    pub(crate) fn offline_handler(&mut self, id: HostId) -> Result<()> {
        let host = self.host_ref(id)?;
        let stage = host.stages.offline;
        if stage == OfflineStage::Idle {
            return Ok(());
        }
        if host.admin_action == AdminAction::None {
            // The action that asked for the watch has already finished.
            self.stop_timer(id, TimerKind::Offline)?;
            return self.set_stage(id, OfflineStage::Idle);
        }
        match stage {
            OfflineStage::Idle => Ok(()),
            OfflineStage::Start => {
                let host = self.host_mut(id)?;
                host.progress.offline_misses = 0;
                host.mtc_alive_offline = false;
                self.consume_mtc_alive(id)?;
                self.set_stage(id, OfflineStage::SendMtcAlive)
            }
            OfflineStage::SendMtcAlive => {
                let networks = self.mtc_alive_networks(id)?;
                self.mtc_send(id, MtcCommand::MtcAliveRequest, &networks)?;
                let period = self.config.timeouts.offline_period;
                self.start_timer(id, TimerKind::Offline, period)?;
                self.set_stage(id, OfflineStage::Wait)
            }
            OfflineStage::Wait => {
                if !self.take_ring(id, TimerKind::Offline)? {
                    return Ok(());
                }
                let threshold = self.config.timeouts.offline_threshold;
                let seen = self.consume_mtc_alive(id)?;
                let host = self.host_mut(id)?;
                if seen {
                    host.progress.offline_misses = 0;
                    return self.set_stage(id, OfflineStage::SendMtcAlive);
                }
                host.progress.offline_misses += 1;
                if host.progress.offline_misses < threshold {
                    return self.set_stage(id, OfflineStage::SendMtcAlive);
                }
                debug!(host = %host.hostname, misses = host.progress.offline_misses, "host is offline");
                host.mtc_alive_offline = true;
                host.mtc_alive_online = false;
                let locked = host.admin_state == AdminState::Locked;
                let avail = host.avail_status;
                if locked && avail != AvailStatus::PowerOff {
                    self.set_avail_status(id, AvailStatus::Offline)?;
                }
                self.set_stage(id, OfflineStage::Idle)
            }
        }
    }

    pub(crate) fn online_handler(&mut self, id: HostId) -> Result<()> {
        let host = self.host_ref(id)?;
        if host.admin_action != AdminAction::None
            || host.admin_state != AdminState::Locked
            || host.avail_status == AvailStatus::PowerOff
        {
            return Ok(());
        }
        let stage = host.stages.online;
        let armed = host.timers.is_armed(TimerKind::Online);
        let period = self.config.timeouts.online_audit;
        match stage {
            OnlineStage::Start => {
                let host = self.host_mut(id)?;
                host.progress.online_hits = 0;
                host.progress.online_misses = 0;
                self.start_timer(id, TimerKind::Online, period)?;
                self.set_stage(id, OnlineStage::Waiting)
            }
            OnlineStage::Waiting => {
                if !self.take_ring(id, TimerKind::Online)? {
                    if !armed {
                        self.start_timer(id, TimerKind::Online, period)?;
                    }
                    return Ok(());
                }
                self.start_timer(id, TimerKind::Online, period)?;
                let seen = self.consume_mtc_alive(id)?;
                self.online_audit(id, seen)?;
                if !seen {
                    self.set_stage(id, OnlineStage::Retrying)?;
                }
                Ok(())
            }
            OnlineStage::Retrying => {
                let networks = self.mtc_alive_networks(id)?;
                self.mtc_send(id, MtcCommand::MtcAliveRequest, &networks)?;
                self.set_stage(id, OnlineStage::Waiting)
            }
        }
    }

    /// Count one audit period and flip availability once the run is long enough.
    fn online_audit(&mut self, id: HostId, seen: bool) -> Result<()> {
        let threshold = self.config.timeouts.online_threshold;
        let host = self.host_mut(id)?;
        let progress = &mut host.progress;
        if seen {
            progress.online_misses = 0;
            progress.online_hits = progress.online_hits.saturating_add(1);
        } else {
            progress.online_hits = 0;
            progress.online_misses = progress.online_misses.saturating_add(1);
        }
        let next = if progress.online_hits >= threshold {
            AvailStatus::Online
        } else if progress.online_misses >= threshold {
            AvailStatus::Offline
        } else {
            return Ok(());
        };
        if host.avail_status != next {
            self.set_avail_status(id, next)?;
        }
        Ok(())
    }

    /// Take the per-network receive flags; true when any network saw mtcAlive.
    pub(crate) fn consume_mtc_alive(&mut self, id: HostId) -> Result<bool> {
        let host = self.host_mut(id)?;
        let mut seen = false;
        for (_, state) in host.mtc_alive.iter_mut() {
            seen |= std::mem::take(&mut state.received);
        }
        Ok(seen)
    }

    fn mtc_alive_networks(&self, id: HostId) -> Result<Vec<Network>> {
        let host = self.host_ref(id)?;
        let mut networks = vec![Network::Mgmnt];
        if host.hbs.clstr_capable {
            networks.push(Network::Clstr);
        }
        Ok(networks)
    }
}
