#![cfg(feature = "user")]

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::rule::FlowRule;
use crate::{Direction, DpiProtocol};

#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum FlowRuleError {
    #[error("{field} value exceeds {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },
}

/// Builder-style setters for provisioning rules from userspace.
///
/// String setters reject values that do not fit their fixed-width field;
/// everything else is infallible. Remember that `action` is a match-count
/// threshold: finish with [`require_full_match`](FlowRule::require_full_match)
/// unless a partial-match threshold is wanted deliberately.
impl FlowRule {
    pub fn new() -> Self {
        Self::empty()
    }

    pub fn with_src_ip(mut self, addr: Ipv4Addr) -> Self {
        self.src_ip = u32::from(addr);
        self
    }

    pub fn with_dst_ip(mut self, addr: Ipv4Addr) -> Self {
        self.dst_ip = u32::from(addr);
        self
    }

    pub fn with_src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction as u8;
        self
    }

    pub fn with_dpi_protocol(mut self, dpi: DpiProtocol) -> Self {
        self.dpi_protocol = dpi as u8;
        self
    }

    pub fn with_icmp_type(mut self, icmp_type: u8) -> Self {
        self.icmp_type = icmp_type;
        self
    }

    pub fn with_query_type(mut self, query_type: u16) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn with_method(mut self, method: &str) -> Result<Self, FlowRuleError> {
        copy_field(&mut self.method, method, "method")?;
        Ok(self)
    }

    pub fn with_path(mut self, path: &str) -> Result<Self, FlowRuleError> {
        copy_field(&mut self.path, path, "path")?;
        Ok(self)
    }

    pub fn with_query_name(mut self, name: &str) -> Result<Self, FlowRuleError> {
        copy_field(&mut self.query_name, name, "query_name")?;
        Ok(self)
    }

    /// Set the raw match-count threshold.
    pub fn with_threshold(mut self, threshold: u16) -> Self {
        self.action = threshold;
        self
    }

    /// The count a record matching every set field of this rule scores,
    /// the three always-compared fields included.
    pub fn full_match_threshold(&self) -> u16 {
        let gated = [
            self.src_ip != 0,
            self.dst_ip != 0,
            self.src_port != 0,
            self.dst_port != 0,
            self.query_type != 0,
            self.dpi_protocol != 0,
            self.method[0] != 0,
            self.path[0] != 0,
            self.query_name[0] != 0,
        ];
        3 + gated.iter().filter(|&&set| set).count() as u16
    }

    /// Arm the rule to fire on records matching every set field.
    pub fn require_full_match(mut self) -> Self {
        self.action = self.full_match_threshold();
        self
    }
}

fn copy_field<const N: usize>(
    field: &mut [u8; N],
    value: &str,
    name: &'static str,
) -> Result<(), FlowRuleError> {
    let bytes = value.as_bytes();
    if bytes.len() > N {
        return Err(FlowRuleError::FieldTooLong {
            field: name,
            max: N,
        });
    }
    field[..bytes.len()].copy_from_slice(bytes);
    field[bytes.len()..].fill(0);
    Ok(())
}
