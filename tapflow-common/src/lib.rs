#![cfg_attr(not(feature = "user"), no_std)]

#[cfg(test)]
extern crate std;

mod decoder;
mod dpi;
mod flow;
mod record;
mod rule;
mod syscall;
#[cfg(test)]
mod testutil;

pub use decoder::{
    decode, Decoded, Transport, ETH_HDR_LEN, ETH_P_IP, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP,
};
pub use dpi::{
    classify, sniff_dns, sniff_http, sniff_icmp, DNS_HDR_LEN, DNS_PORT, HTTP_PORTS, HTTP_SCAN_LEN,
};
pub use flow::{inspect, FrameMeta, Inspection};
pub use record::{nul_trimmed, FlowRecord, METHOD_LEN, PATH_LEN, QUERY_NAME_LEN};
pub use rule::{first_match, FlowRule, MAX_MATCH_FIELDS, RULE_SLOTS};
pub use syscall::{SyscallEvent, SyscallKind, SYSCALL_PATH_LEN, TASK_COMM_LEN};

#[cfg(feature = "user")]
pub use rule::FlowRuleError;

use strum::EnumCount as _;
use strum_macros::EnumCount;

// These are also defined in aya-ebpf::bindings.
// Based on the tc-bpf man https://man7.org/linux/man-pages/man8/tc-bpf.8.html
// We redefine them here as not to depend on aya-ebpf in this crate.
const TC_ACT_OK: i32 = 0;
const TC_ACT_SHOT: i32 = 2;

/// Packet travel direction relative to the monitored host.
///
/// The numbering is fixed by the record layout: classifiers attached at
/// egress tag packets with 0, ingress with 1.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
#[cfg_attr(
    feature = "user",
    derive(Hash, num_derive::FromPrimitive, serde::Serialize)
)]
pub enum Direction {
    Egress = 0,
    Ingress = 1,
}

/// Application protocol recognized by the payload classifier.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
#[cfg_attr(
    feature = "user",
    derive(Hash, num_derive::FromPrimitive, serde::Serialize)
)]
pub enum DpiProtocol {
    Unknown = 0,
    Http = 1,
    Dns = 2,
    Icmp = 3,
}

/// Effective treatment of a packet, stored in [`FlowRecord::verdict`].
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
#[cfg_attr(
    feature = "user",
    derive(Hash, num_derive::FromPrimitive, serde::Serialize)
)]
pub enum Verdict {
    /// Let the packet continue.
    Allow = TC_ACT_OK,
    /// Drop the packet.
    Drop = TC_ACT_SHOT,
}

impl Default for Verdict {
    fn default() -> Self {
        Self::Allow
    }
}

/// What a matching rule does to the packet, stored in the `Mode` config cell.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
#[cfg_attr(feature = "user", derive(num_derive::FromPrimitive, serde::Serialize))]
pub enum Mode {
    /// Record which rule matched but allow every packet.
    Observe = 0,
    /// A matching rule drops the packet and suppresses its record.
    Enforce = 1,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Enforce
    }
}

/// Keys of the runtime configuration map.
#[repr(u8)]
#[derive(Clone, Copy, EnumCount)]
pub enum ConfigOpt {
    Mode = 0,
    ScanLimit = 1,
}

/// Entry count for the configuration map, one cell per [`ConfigOpt`].
pub const CONFIG_SLOTS: u32 = ConfigOpt::COUNT as u32;

// Safety ConfigOpt is repr(u8)
#[cfg(feature = "user")]
unsafe impl aya::Pod for ConfigOpt {}
