//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Administrative, operational and availability state of a host.

use std::fmt;
use std::str::FromStr;

use mtce_common::UnknownValue;
use mtce_logging::{slog, LogContext};

mtce_enum! {
    /// Administrative state requested by the operator.
    pub enum AdminState: "admin state" {
        Locked => "locked",
        Unlocked => "unlocked",
    }
}

mtce_enum! {
    /// Operational state owned by maintenance.
    pub enum OperState: "operational state" {
        Disabled => "disabled",
        Enabled => "enabled",
    }
}

mtce_enum! {
    /// Availability status of a host function.
    pub enum AvailStatus: "availability status" {
        NotInstalled => "not-installed",
        Available => "available",
        Degraded => "degraded",
        Failed => "failed",
        Intest => "intest",
        PowerOff => "power-off",
        Offline => "offline",
        Online => "online",
        Offduty => "offduty",
    }
}

mtce_enum! {
    /// Administrative action driving the host's handler FSM.
    pub enum AdminAction: "admin action" {
        None => "none",
        Lock => "lock",
        Unlock => "unlock",
        Reset => "reset",
        Reboot => "reboot",
        Reinstall => "reinstall",
        PowerOff => "power-off",
        PowerOn => "power-on",
        Recovery => "recover",
        Delete => "delete",
        Powercycle => "powercycle",
        Add => "add",
        Swact => "swact",
        ForceLock => "force-lock",
        ForceSwact => "force-swact",
        Enable => "enable",
        EnableSubf => "enable-subf",
    }
}

impl AdminAction {
    /// Actions that may not be displaced while in progress; new requests queue behind them.
    pub fn is_protected(&self) -> bool {
        matches!(self, AdminAction::Add | AdminAction::ForceLock)
    }

    /// Actions that only make sense against a locked host.
    pub fn requires_locked(&self) -> bool {
        matches!(
            self,
            AdminAction::Reset
                | AdminAction::Reboot
                | AdminAction::Reinstall
                | AdminAction::PowerOff
                | AdminAction::PowerOn
        )
    }
}

/// Lenient decoding for state values arriving from outside maintenance.
///
/// Unknown input is logged as a software error and replaced by the
/// variant that is safe to hold: locked, disabled, offduty or no action.
pub trait Clamped: Copy + FromStr + 'static {
    const KIND: &'static str;
    const FALLBACK: Self;

    fn from_raw(raw: u8) -> Option<Self>;
    fn as_str(&self) -> &'static str;

    fn from_raw_clamped(raw: u8, hostname: &str) -> Self {
        Self::from_raw(raw).unwrap_or_else(|| {
            slog!(
                context = LogContext::host(hostname),
                "invalid {} {raw}, using {}",
                Self::KIND,
                Self::FALLBACK.as_str()
            );
            Self::FALLBACK
        })
    }

    fn from_text_clamped(text: &str, hostname: &str) -> Self {
        text.parse().unwrap_or_else(|_| {
            slog!(
                context = LogContext::host(hostname),
                "invalid {} '{text}', using {}",
                Self::KIND,
                Self::FALLBACK.as_str()
            );
            Self::FALLBACK
        })
    }
}

macro_rules! clamped {
    ($name:ident, $kind:literal, $fallback:expr) => {
        impl Clamped for $name {
            const KIND: &'static str = $kind;
            const FALLBACK: Self = $fallback;

            fn from_raw(raw: u8) -> Option<Self> {
                $name::from_raw(raw)
            }

            fn as_str(&self) -> &'static str {
                $name::as_str(self)
            }
        }
    };
}

clamped!(AdminState, "admin state", AdminState::Locked);
clamped!(OperState, "oper state", OperState::Disabled);
clamped!(AvailStatus, "avail status", AvailStatus::Offduty);
clamped!(AdminAction, "admin action", AdminAction::None);

impl AvailStatus {
    pub fn is_online_or_offline(&self) -> bool {
        matches!(self, AvailStatus::Online | AvailStatus::Offline)
    }
}

/// Host personality bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeType(u32);

impl NodeType {
    pub const NONE: NodeType = NodeType(0);
    pub const CONTROLLER: NodeType = NodeType(1 << 0);
    pub const WORKER: NodeType = NodeType(1 << 1);
    pub const STORAGE: NodeType = NodeType(1 << 2);

    const NAMES: [(NodeType, &'static str); 3] = [
        (NodeType::CONTROLLER, "controller"),
        (NodeType::WORKER, "worker"),
        (NodeType::STORAGE, "storage"),
    ];

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: NodeType) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: NodeType) -> NodeType {
        NodeType(self.0 | other.0)
    }

    /// Controller with a worker subfunction.
    pub const fn is_all_in_one(&self) -> bool {
        self.contains(NodeType::CONTROLLER) && self.contains(NodeType::WORKER)
    }
}

impl std::ops::BitOr for NodeType {
    type Output = NodeType;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl FromStr for NodeType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = NodeType::NONE;
        for part in s.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let bit = Self::NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(part))
                .map(|(bit, _)| *bit)
                .ok_or_else(|| UnknownValue::new("node type", part))?;
            mask = mask | bit;
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_their_wire_text() {
        for action in AdminAction::ALL {
            assert_eq!(action.as_str().parse::<AdminAction>().unwrap(), *action);
            assert_eq!(AdminAction::from_raw(action.raw()), Some(*action));
        }
        assert_eq!(AvailStatus::PowerOff.to_string(), "power-off");
        assert!("sleeping".parse::<AvailStatus>().is_err());
    }

    #[test]
    fn out_of_range_raw_values_clamp() {
        assert_eq!(AdminState::from_raw_clamped(9, "compute-0"), AdminState::Locked);
        assert_eq!(OperState::from_raw_clamped(200, "compute-0"), OperState::Disabled);
        assert_eq!(AvailStatus::from_raw_clamped(42, "compute-0"), AvailStatus::Offduty);
        assert_eq!(AdminAction::from_raw_clamped(99, "compute-0"), AdminAction::None);
        assert_eq!(AdminState::from_raw_clamped(1, "compute-0"), AdminState::Unlocked);
    }

    #[test]
    fn unknown_text_clamps_to_safe_state() {
        assert_eq!(AdminState::from_text_clamped("frozen", "compute-0"), AdminState::Locked);
        assert_eq!(OperState::from_text_clamped("", "compute-0"), OperState::Disabled);
        assert_eq!(AvailStatus::from_text_clamped("asleep", "compute-0"), AvailStatus::Offduty);
        assert_eq!(AvailStatus::from_text_clamped("degraded", "compute-0"), AvailStatus::Degraded);
        assert_eq!(AdminAction::from_text_clamped("explode", "compute-0"), AdminAction::None);
    }

    #[test]
    fn node_type_parses_and_prints_lists() {
        let aio: NodeType = "controller, worker".parse().unwrap();
        assert!(aio.is_all_in_one());
        assert_eq!(aio.to_string(), "controller,worker");
        assert!(!NodeType::STORAGE.contains(NodeType::WORKER));
        assert!("gpu".parse::<NodeType>().is_err());
    }

    #[test]
    fn state_enums_serialize_as_text() {
        let json = serde_json::to_string(&AvailStatus::NotInstalled).unwrap();
        assert_eq!(json, "\"not-installed\"");
        let back: AdminAction = serde_json::from_str("\"force-lock\"").unwrap();
        assert_eq!(back, AdminAction::ForceLock);
    }
}
