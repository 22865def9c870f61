//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::HostId;
use mtce_heartbeat::PulseError;

/// Result alias used throughout the node crate.
pub type Result<T> = std::result::Result<T, MtceError>;

/// Errors reported to the immediate caller. None of them are fatal to the agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MtceError {
    #[error("duplicate uuid '{0}'")]
    DuplicateUuid(String),
    #[error("duplicate hostname '{0}'")]
    DuplicateHostname(String),
    #[error("duplicate {field} '{value}'")]
    DuplicateIp { field: &'static str, value: String },
    #[error("duplicate {field} '{value}'")]
    DuplicateMac { field: &'static str, value: String },
    #[error("host '{0}' not found")]
    NotFound(String),
    #[error("host handle {0} is stale")]
    StaleHost(HostId),
    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),
    #[error("invalid {field} '{value}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("{hostname}: action queue full, '{action}' rejected")]
    QueueFull { hostname: String, action: String },
    #[error("{hostname}: action '{action}' already pending")]
    DuplicateAction { hostname: String, action: String },
    #[error("registry at capacity ({0} hosts)")]
    AtCapacity(usize),
    #[error("{hostname} cannot be locked: {reason}")]
    LockRejected { hostname: String, reason: String },
    #[error("{hostname}: {reason}")]
    InvalidRequest { hostname: String, reason: String },
    #[error(transparent)]
    Pulse(#[from] PulseError),
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    #[error("{service} rejected request: {reason}")]
    Rejected { service: &'static str, reason: String },
    #[error("{0} unavailable")]
    Unavailable(&'static str),
    #[error("board management busy for {0}")]
    Busy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_field() {
        let err = MtceError::DuplicateIp {
            field: "mgmt_ip",
            value: "10.0.0.5".into(),
        };
        assert_eq!(err.to_string(), "duplicate mgmt_ip '10.0.0.5'");
        let err = MtceError::QueueFull {
            hostname: "compute-1".into(),
            action: "reboot".into(),
        };
        assert_eq!(err.to_string(), "compute-1: action queue full, 'reboot' rejected");
    }
}
