use std::path::Path;

use aya::{
    maps::{Array, MapData, RingBuf},
    programs::{tc, SchedClassifier, TcAttachType, TracePoint},
    Ebpf,
};
use tapflow_common::{FlowRule, Mode, MAX_MATCH_FIELDS, RULE_SLOTS};

use crate::{
    config::{ConfigHandler, EngineConfig},
    logger::Logger,
    Error, Result, EVENT_RING, RULE_ARRAY, SYSCALL_RING,
};

/// Syscall programs shipped in the object, with the tracepoint each one
/// attaches to under the `syscalls` category.
const TRACED_SYSCALLS: [(&str, &str); 9] = [
    ("log_execve", "sys_enter_execve"),
    ("log_execveat", "sys_enter_execveat"),
    ("log_open", "sys_enter_openat"),
    ("log_unlink", "sys_enter_unlinkat"),
    ("log_chmod", "sys_enter_chmod"),
    ("log_mount", "sys_enter_mount"),
    ("log_setuid", "sys_enter_setuid"),
    ("log_socket", "sys_enter_socket"),
    ("log_connect", "sys_enter_connect"),
];

/// Represents a running observation agent on one interface.
///
/// Both traffic directions are inspected and every IPv4 flow becomes a
/// record in the kernel ring buffer. In [Enforce](Mode::Enforce) mode a
/// record matching a rule slot drops the packet; in
/// [Observe](Mode::Observe) mode matches are recorded but nothing is
/// dropped.
///
/// The agent can log flow and syscall records using [tracing], currently
/// hardcoded at `info` level, by calling [start_logging](Self::start_logging).
pub struct Agent {
    bpf: Ebpf,
    rules: RuleSync,
    logger: Logger,
    config: ConfigHandler,
}

impl Agent {
    /// Loads the compiled eBPF object and attaches it to `iface`.
    ///
    /// The interface must already exist when calling this function, and
    /// the object is the one produced by `cargo xtask build-ebpf`.
    ///
    /// As soon as the [Agent] is created it starts inspecting packets in
    /// [Enforce](Mode::Enforce) mode with an empty rule table, so
    /// nothing is dropped until rules are installed.
    ///
    /// # Example
    /// ```no_run
    /// # use tapflow::Agent;
    /// let agent = Agent::new(
    ///     "eth0",
    ///     "tapflow-ebpf/target/bpfel-unknown-none/release/tapflow",
    /// )
    /// .unwrap();
    /// ```
    pub fn new(iface: impl AsRef<str>, object: impl AsRef<Path>) -> Result<Agent> {
        let mut bpf = Ebpf::load_file(object.as_ref())?;

        // error adding clsact to the interface if it is already added is harmless
        // the full cleanup can be done with 'sudo tc qdisc del dev eth0 clsact'.
        let _ = tc::qdisc_add_clsact(iface.as_ref());
        for (name, attach_type) in [
            ("tapflow_ingress", TcAttachType::Ingress),
            ("tapflow_egress", TcAttachType::Egress),
        ] {
            let program: &mut SchedClassifier = bpf.program_mut(name).unwrap().try_into()?;
            program.load()?;
            program.attach(iface.as_ref(), attach_type)?;
        }

        for (name, tracepoint) in TRACED_SYSCALLS {
            let program: &mut TracePoint = bpf.program_mut(name).unwrap().try_into()?;
            program.load()?;
            program.attach("syscalls", tracepoint)?;
        }

        let rules = RuleSync::new(&mut bpf)?;
        let flow_ring = RingBuf::try_from(
            bpf.take_map(EVENT_RING)
                .ok_or(Error::MapMissing(EVENT_RING))?,
        )?;
        let syscall_ring = RingBuf::try_from(
            bpf.take_map(SYSCALL_RING)
                .ok_or(Error::MapMissing(SYSCALL_RING))?,
        )?;
        let logger = Logger::new(flow_ring, syscall_ring);
        let config = ConfigHandler::new()?;

        let mut agent = Self {
            bpf,
            rules,
            logger,
            config,
        };
        agent.config.apply(&mut agent.bpf, &EngineConfig::default())?;
        Ok(agent)
    }

    /// Switches between observing matches and enforcing them.
    ///
    /// If not specified it will be set to [Enforce](Mode::Enforce).
    ///
    /// # Example
    /// ```no_run
    /// # use tapflow::{Agent, Mode};
    /// # let mut agent = Agent::new("eth0", "tapflow").unwrap();
    /// agent.set_mode(Mode::Observe).unwrap();
    /// ```
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.config.set_mode(&mut self.bpf, mode)
    }

    /// Caps how many rule slots are walked per packet. Values above the
    /// table size are clamped.
    pub fn set_scan_limit(&mut self, limit: u32) -> Result<()> {
        self.config.set_scan_limit(&mut self.bpf, limit)
    }

    /// Installs `rule` at slot `index` of the kernel table.
    ///
    /// The slot takes effect for the very next packet; packets already
    /// past the matcher keep the old decision.
    ///
    /// # Example
    /// ```no_run
    /// # use tapflow::{Agent, Direction, FlowRule};
    /// # let mut agent = Agent::new("eth0", "tapflow").unwrap();
    /// // Drop ingress DNS: three core fields plus the gated port make 4.
    /// let rule = FlowRule::new()
    ///     .with_dst_port(53)
    ///     .with_protocol(17)
    ///     .with_direction(Direction::Ingress)
    ///     .with_threshold(4);
    /// agent.set_rule(0, &rule).unwrap();
    /// ```
    pub fn set_rule(&mut self, index: u32, rule: &FlowRule) -> Result<()> {
        self.rules.set(index, rule)
    }

    /// Disables slot `index` by writing the empty rule over it.
    ///
    /// # Example
    /// ```no_run
    /// # use tapflow::{Agent, FlowRule};
    /// # let mut agent = Agent::new("eth0", "tapflow").unwrap();
    /// # agent.set_rule(0, &FlowRule::new().with_dst_port(53).with_threshold(4)).unwrap();
    /// agent.clear_rule(0).unwrap();
    /// ```
    pub fn clear_rule(&mut self, index: u32) -> Result<()> {
        self.rules.set(index, &FlowRule::empty())
    }

    /// Starts logging flow and syscall records to `info` level of the
    /// [tracing] crate, as one JSON line per record.
    ///
    /// # Example
    /// ```no_run
    /// # use tapflow::Agent;
    /// let mut agent = Agent::new("eth0", "tapflow").unwrap();
    /// agent.start_logging();
    /// ```
    pub fn start_logging(&mut self) {
        self.logger.init()
    }
}

/// Writes whole rule entries into the kernel-side array.
struct RuleSync {
    table: Array<MapData, FlowRule>,
}

impl RuleSync {
    fn new(bpf: &mut Ebpf) -> Result<Self> {
        let table = Array::try_from(
            bpf.take_map(RULE_ARRAY)
                .ok_or(Error::MapMissing(RULE_ARRAY))?,
        )?;
        Ok(Self { table })
    }

    fn set(&mut self, index: u32, rule: &FlowRule) -> Result<()> {
        if index as usize >= RULE_SLOTS {
            return Err(Error::InvalidIndex(index));
        }
        if rule.action > MAX_MATCH_FIELDS {
            tracing::warn!(
                index,
                threshold = rule.action,
                "rule can never fire: threshold exceeds the attainable match count"
            );
        }
        self.table.set(index, rule, 0)?;
        Ok(())
    }
}
