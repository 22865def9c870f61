//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Node maintenance core: host registry, per-host state machines, heartbeat
//! escalation, multi-node failure avoidance and auto-recovery.

#[macro_use]
mod macros;

pub mod alarm;
pub mod autorecovery;
pub mod bmc;
pub mod collab;
pub mod error;
pub mod event;
mod handlers;
pub mod heartbeat;
pub mod host;
pub mod lock;
pub mod maintenance;
pub mod mnfa;
pub mod mtce_info;
pub mod registry;
pub mod stage;
pub mod state;
pub mod testing;
pub mod timer;

pub use alarm::{AlarmCache, AlarmId, AlarmSeverity};
pub use autorecovery::ArVerdict;
pub use bmc::{BmcDriver, ThreadedBmc};
pub use collab::{BmcAction, CustomerLog, LogKind, MtcCommand, Services, VimEvent};
pub use error::{CollabError, MtceError, Result};
pub use event::MtceEvent;
pub use host::{BmcInfo, DegradeCause, Host, HostInfo, MtcAliveFlags};
pub use maintenance::{Dor, Maintenance};
pub use mnfa::Mnfa;
pub use mtce_heartbeat::PulseResponse;
pub use mtce_info::MtceInfo;
pub use registry::Registry;
pub use stage::{ActionFsm, FsmKind, Stage};
pub use state::{AdminAction, AdminState, AvailStatus, NodeType, OperState};
pub use timer::TimerKind;
