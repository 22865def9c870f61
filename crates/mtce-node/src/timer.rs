//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Per-host one-shot timers.
//!
//! Timers are plain deadlines polled from the maintenance tick. An expired
//! timer latches its `ring` flag for the owning handler and produces a
//! [`TimerId`] event; ids that no longer resolve are dropped as stale.

use std::ops::{Index, IndexMut};
use std::time::{Duration, Instant};

use mtce_common::HostId;

mtce_enum! {
    /// Named timer slots carried by every host.
    pub enum TimerKind: "timer" {
        Mtc => "mtc",
        Swact => "swact",
        MtcAlive => "mtcalive",
        Online => "online",
        Offline => "offline",
        Command => "command",
        Config => "config",
        InsvTest => "insv-test",
        OosTest => "oos-test",
        BmcAccess => "bmc-access",
        BmcAudit => "bmc-audit",
        ResetCtrl => "reset-ctrl",
        PowercycleCtrl => "powercycle-ctrl",
        ResetRecovery => "reset-recovery",
        PowercycleRecovery => "powercycle-recovery",
        AutoRecovery => "auto-recovery",
    }
}

const TIMER_COUNT: usize = 16;

/// A one-shot deadline with a latched expiry flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtcTimer {
    deadline: Option<Instant>,
    ring: bool,
}

impl MtcTimer {
    /// Arm the timer, discarding any previous deadline or unconsumed ring.
    pub fn start(&mut self, now: Instant, duration: Duration) {
        self.deadline = Some(now + duration);
        self.ring = false;
    }

    /// Cancel the timer. Stopping an idle timer is a no-op.
    pub fn stop(&mut self) {
        self.deadline = None;
        self.ring = false;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn ring(&self) -> bool {
        self.ring
    }

    /// Consume the ring flag.
    pub fn take_ring(&mut self) -> bool {
        std::mem::take(&mut self.ring)
    }

    /// Latch expiry when the deadline has passed. Returns `true` on the transition.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.ring = true;
                true
            }
            _ => false,
        }
    }
}

/// Event produced when a host timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub host: HostId,
    pub kind: TimerKind,
}

/// The full timer set of one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostTimers([MtcTimer; TIMER_COUNT]);

impl HostTimers {
    pub fn start(&mut self, kind: TimerKind, now: Instant, duration: Duration) {
        self[kind].start(now, duration);
    }

    pub fn stop(&mut self, kind: TimerKind) {
        self[kind].stop();
    }

    pub fn stop_all(&mut self) {
        self.0.iter_mut().for_each(MtcTimer::stop);
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self[kind].is_armed()
    }

    pub fn take_ring(&mut self, kind: TimerKind) -> bool {
        self[kind].take_ring()
    }

    /// Latch every due timer and report which ones fired.
    pub fn expire(&mut self, now: Instant) -> Vec<TimerKind> {
        TimerKind::ALL
            .iter()
            .copied()
            .filter(|kind| self[*kind].expire(now))
            .collect()
    }

    pub fn armed(&self) -> usize {
        self.0.iter().filter(|timer| timer.is_armed()).count()
    }
}

impl Index<TimerKind> for HostTimers {
    type Output = MtcTimer;

    fn index(&self, kind: TimerKind) -> &Self::Output {
        &self.0[kind.raw() as usize]
    }
}

impl IndexMut<TimerKind> for HostTimers {
    fn index_mut(&mut self, kind: TimerKind) -> &mut Self::Output {
        &mut self.0[kind.raw() as usize]
    }
}
