mod agent;
mod channel;
mod config;
mod engine;
mod error;
mod logger;
mod table;

pub use crate::agent::Agent;
pub use tapflow_common::{
    Direction, DpiProtocol, FlowRecord, FlowRule, FlowRuleError, FrameMeta, Mode, SyscallEvent,
    SyscallKind, Verdict, MAX_MATCH_FIELDS, RULE_SLOTS,
};

pub use channel::{channel, EventReceiver, EventSender};
pub use config::EngineConfig;
pub use engine::{FlowEngine, Outcome};
pub use error::Error;
pub use table::RuleTable;
pub type Result<T> = std::result::Result<T, Error>;

const EVENT_RING: &str = "EVENTS";
const SYSCALL_RING: &str = "SYSCALL_EVENTS";
const RULE_ARRAY: &str = "FLOW_RULES";
const CONFIG: &str = "CONFIG";
