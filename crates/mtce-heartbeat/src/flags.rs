//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Heartbeat pulse tracking and loss thresholding."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Service flags carried in a pulse response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PulseFlags(u32);

impl PulseFlags {
    pub const NONE: PulseFlags = PulseFlags(0);
    /// Process monitor on the host is alive.
    pub const PMOND: PulseFlags = PulseFlags(1 << 0);
    /// Host can be heartbeat on the cluster-host network.
    pub const CLSTR_CAPABLE: PulseFlags = PulseFlags(1 << 1);
    /// Host recovered from a stall.
    pub const STALL_REC: PulseFlags = PulseFlags(1 << 2);
    /// Host reports a stall it could not recover from.
    pub const STALL_ERROR: PulseFlags = PulseFlags(1 << 3);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: PulseFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn is_stalled(&self) -> bool {
        self.contains(Self::STALL_REC) || self.contains(Self::STALL_ERROR)
    }
}

impl BitOr for PulseFlags {
    type Output = PulseFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        PulseFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for PulseFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_checks_every_bit() {
        let flags = PulseFlags::PMOND | PulseFlags::CLSTR_CAPABLE;
        assert!(flags.contains(PulseFlags::PMOND));
        assert!(flags.contains(PulseFlags::PMOND | PulseFlags::CLSTR_CAPABLE));
        assert!(!flags.contains(PulseFlags::STALL_REC));
        assert!(!flags.contains(PulseFlags::NONE));
        assert!(!flags.is_stalled());
        assert!(PulseFlags::STALL_ERROR.is_stalled());
    }
}
