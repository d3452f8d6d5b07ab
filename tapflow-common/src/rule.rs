mod user;

#[cfg(feature = "user")]
pub use user::FlowRuleError;

use crate::record::{FlowRecord, METHOD_LEN, PATH_LEN, QUERY_NAME_LEN};

/// Capacity of the rule table. Slots are addressed by index; an empty
/// slot is simply a rule whose `action` is 0.
pub const RULE_SLOTS: usize = 128;

/// Upper bound on a single record's match count: nine presence-gated
/// fields plus the three that are always compared. A rule whose `action`
/// exceeds this can never fire.
pub const MAX_MATCH_FIELDS: u16 = 12;

/// One match rule.
///
/// `action` is a match-count threshold, not a verdict: the rule fires
/// only when the number of matching fields equals `action` exactly, and
/// `action == 0` disables the slot. Most fields participate only when
/// they hold a non-zero value in the rule; `protocol`, `direction` and
/// `icmp_type` are compared unconditionally, so a zero there means
/// "require zero", not "any". Thresholds must account for those three:
/// against a TCP record, a rule with matching `protocol` and `direction`
/// already scores 3 before any gated field is considered, because the
/// zero `icmp_type` fields agree as well.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub struct FlowRule {
    /// Host byte order, 0 = any.
    pub src_ip: u32,
    pub dst_ip: u32,
    /// 0 = any.
    pub src_port: u16,
    pub dst_port: u16,
    /// 0 = any.
    pub query_type: u16,
    /// Match-count threshold; 0 disables the slot.
    pub action: u16,
    /// Always compared.
    pub protocol: u8,
    /// Always compared.
    pub direction: u8,
    /// 0 = any.
    pub dpi_protocol: u8,
    /// Always compared.
    pub icmp_type: u8,
    /// Empty (leading NUL) = any; otherwise whole-array equality.
    pub method: [u8; METHOD_LEN],
    pub path: [u8; PATH_LEN],
    pub query_name: [u8; QUERY_NAME_LEN],
}

impl FlowRule {
    /// A disabled slot.
    pub const fn empty() -> Self {
        Self {
            src_ip: 0,
            dst_ip: 0,
            src_port: 0,
            dst_port: 0,
            query_type: 0,
            action: 0,
            protocol: 0,
            direction: 0,
            dpi_protocol: 0,
            icmp_type: 0,
            method: [0; METHOD_LEN],
            path: [0; PATH_LEN],
            query_name: [0; QUERY_NAME_LEN],
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.action != 0
    }

    /// Number of fields of `record` this rule matches.
    pub fn match_count(&self, record: &FlowRecord) -> u16 {
        let mut count = 0;
        if self.src_ip != 0 && self.src_ip == record.src_ip {
            count += 1;
        }
        if self.dst_ip != 0 && self.dst_ip == record.dst_ip {
            count += 1;
        }
        if self.src_port != 0 && self.src_port == record.src_port {
            count += 1;
        }
        if self.dst_port != 0 && self.dst_port == record.dst_port {
            count += 1;
        }
        if self.query_type != 0 && self.query_type == record.query_type {
            count += 1;
        }
        if self.dpi_protocol != 0 && self.dpi_protocol == record.dpi_protocol {
            count += 1;
        }
        if self.protocol == record.protocol {
            count += 1;
        }
        if self.direction == record.direction {
            count += 1;
        }
        if self.icmp_type == record.icmp_type {
            count += 1;
        }
        if self.method[0] != 0 && self.method == record.method {
            count += 1;
        }
        if self.path[0] != 0 && self.path == record.path {
            count += 1;
        }
        if self.query_name[0] != 0 && self.query_name == record.query_name {
            count += 1;
        }
        count
    }

    /// Whether this rule fires for `record`: enabled and the match count
    /// hits the threshold exactly.
    #[inline]
    pub fn fires(&self, record: &FlowRecord) -> bool {
        self.action != 0 && self.match_count(record) == self.action
    }
}

#[cfg(feature = "user")]
impl Default for FlowRule {
    fn default() -> Self {
        Self::empty()
    }
}

// Safety FlowRule is repr(C), Copy and free of references
#[cfg(feature = "user")]
unsafe impl aya::Pod for FlowRule {}

/// Scan `rules` in slot order and return the index of the first rule
/// that fires, looking at no more than `scan_limit` slots. Evaluation is
/// read-only; the same record against the same slice always yields the
/// same answer.
pub fn first_match(record: &FlowRecord, rules: &[FlowRule], scan_limit: u32) -> Option<u32> {
    let bound = (scan_limit as usize).min(RULE_SLOTS).min(rules.len());
    for (index, rule) in rules.iter().enumerate().take(bound) {
        if rule.fires(record) {
            return Some(index as u32);
        }
    }
    None
}
