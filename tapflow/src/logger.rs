use crate::{Error, Result};
use num_traits::FromPrimitive;
use serde::Serialize;
use std::{
    convert::TryFrom,
    mem::size_of,
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use aya::maps::{MapData, RingBuf};
use tapflow_common::{
    nul_trimmed, Direction, DpiProtocol, FlowRecord, SyscallEvent, SyscallKind, Verdict,
};

use tokio::spawn;

pub struct Logger {
    flow_ring: Option<RingBuf<MapData>>,
    syscall_ring: Option<RingBuf<MapData>>,
}

impl Logger {
    pub(crate) fn new(flow_ring: RingBuf<MapData>, syscall_ring: RingBuf<MapData>) -> Self {
        Self {
            flow_ring: Some(flow_ring),
            syscall_ring: Some(syscall_ring),
        }
    }

    /// Spawn one drain task per ring buffer. Requires a running tokio
    /// runtime; a second call is a no-op.
    pub fn init(&mut self) {
        if let Some(ring) = self.flow_ring.take() {
            spawn(log_flow_events(ring));
        }
        if let Some(ring) = self.syscall_ring.take() {
            spawn(log_syscall_events(ring));
        }
    }
}

pub async fn log_flow_events(mut ring: RingBuf<MapData>) {
    loop {
        while let Some(item) = ring.next() {
            if item.len() < size_of::<FlowRecord>() {
                continue;
            }
            // SAFETY: the kernel submits whole FlowRecords and FlowRecord is Copy
            let record = unsafe { (item.as_ptr() as *const FlowRecord).read_unaligned() };
            let Ok(flow) = FlowFormatted::try_from(record) else { continue; };
            let Ok(flow) = serde_json::to_string(&flow) else { continue; };
            tracing::info!(target: "flow_log", "{flow}");
        }
        // The ring gives no wakeup on this path; poll at a coarse interval.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub async fn log_syscall_events(mut ring: RingBuf<MapData>) {
    loop {
        while let Some(item) = ring.next() {
            if item.len() < size_of::<SyscallEvent>() {
                continue;
            }
            // SAFETY: the kernel submits whole SyscallEvents and SyscallEvent is Copy
            let event = unsafe { (item.as_ptr() as *const SyscallEvent).read_unaligned() };
            let Ok(event) = SyscallFormatted::try_from(event) else { continue; };
            let Ok(event) = serde_json::to_string(&event) else { continue; };
            tracing::info!(target: "syscall_log", "{event}");
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[derive(Debug, Clone, Serialize)]
struct FlowFormatted {
    source_ip: IpAddr,
    destination_ip: IpAddr,
    destination_port: u16,
    source_port: u16,
    verdict: Verdict,
    protocol: u8,
    direction: Direction,
    interface: u32,
    length: u32,
    dpi: DpiProtocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_rule: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icmp_type: Option<u8>,
    timestamp: String,
}

impl TryFrom<FlowRecord> for FlowFormatted {
    type Error = Error;

    fn try_from(value: FlowRecord) -> Result<Self> {
        let timestamp =
            chrono::offset::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let dpi = DpiProtocol::from_u8(value.dpi_protocol).ok_or(Error::LogFormatError)?;
        let (method, path, query_name, query_type, icmp_type) = match dpi {
            DpiProtocol::Http => (text(&value.method), text(&value.path), None, None, None),
            DpiProtocol::Dns => (
                None,
                None,
                text(&value.query_name),
                (value.query_type != 0).then_some(value.query_type),
                None,
            ),
            DpiProtocol::Icmp => (None, None, None, None, Some(value.icmp_type)),
            DpiProtocol::Unknown => (None, None, None, None, None),
        };
        Ok(Self {
            source_ip: IpAddr::from(Ipv4Addr::from(value.src_ip)),
            destination_ip: IpAddr::from(Ipv4Addr::from(value.dst_ip)),
            destination_port: value.dst_port,
            source_port: value.src_port,
            verdict: Verdict::from_i32(value.verdict).ok_or(Error::LogFormatError)?,
            protocol: value.protocol,
            direction: Direction::from_u8(value.direction).ok_or(Error::LogFormatError)?,
            interface: value.ifindex,
            length: value.payload_len,
            dpi,
            matched_rule: (value.matched_rule >= 0).then(|| value.matched_rule as u32),
            method,
            path,
            query_name,
            query_type,
            icmp_type,
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct SyscallFormatted {
    pid: u32,
    syscall: &'static str,
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    timestamp: String,
}

impl TryFrom<SyscallEvent> for SyscallFormatted {
    type Error = Error;

    fn try_from(value: SyscallEvent) -> Result<Self> {
        let timestamp =
            chrono::offset::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let kind = SyscallKind::from_u32(value.kind).ok_or(Error::LogFormatError)?;
        Ok(Self {
            pid: value.pid,
            syscall: kind.as_str(),
            command: String::from_utf8_lossy(nul_trimmed(&value.comm)).into_owned(),
            path: text(&value.path),
            timestamp,
        })
    }
}

fn text(field: &[u8]) -> Option<String> {
    let trimmed = nul_trimmed(field);
    if trimmed.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(trimmed).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(dst: &mut [u8], src: &[u8]) {
        dst[..src.len()].copy_from_slice(src);
    }

    fn base_record() -> FlowRecord {
        let mut record = FlowRecord::empty();
        record.src_ip = 0x0a00_0001;
        record.dst_ip = 0x0a00_0002;
        record.src_port = 40000;
        record.dst_port = 80;
        record.protocol = 6;
        record.direction = Direction::Ingress as u8;
        record.payload_len = 74;
        record.ifindex = 2;
        record
    }

    #[test]
    fn http_record_formats_with_method_and_path() {
        let mut record = base_record();
        record.dpi_protocol = DpiProtocol::Http as u8;
        put(&mut record.method, b"GET");
        put(&mut record.path, b"/index.html");

        let flow = FlowFormatted::try_from(record).unwrap();
        assert_eq!(flow.source_ip, IpAddr::from(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(flow.method.as_deref(), Some("GET"));
        assert_eq!(flow.path.as_deref(), Some("/index.html"));
        assert!(flow.query_name.is_none());
        assert!(flow.matched_rule.is_none());

        let json = serde_json::to_string(&flow).unwrap();
        assert!(json.contains(r#""method":"GET""#));
        assert!(json.contains(r#""verdict":"Allow""#));
        assert!(!json.contains("query_name"));
    }

    #[test]
    fn dns_record_formats_with_query_fields() {
        let mut record = base_record();
        record.dst_port = 53;
        record.protocol = 17;
        record.dpi_protocol = DpiProtocol::Dns as u8;
        record.query_type = 1;
        record.matched_rule = 3;
        put(&mut record.query_name, b"example.com");

        let flow = FlowFormatted::try_from(record).unwrap();
        assert_eq!(flow.query_name.as_deref(), Some("example.com"));
        assert_eq!(flow.query_type, Some(1));
        assert_eq!(flow.matched_rule, Some(3));
        assert!(flow.method.is_none());
    }

    #[test]
    fn icmp_record_formats_with_the_type_byte() {
        let mut record = base_record();
        record.protocol = 1;
        record.src_port = 0;
        record.dst_port = 0;
        record.dpi_protocol = DpiProtocol::Icmp as u8;
        record.icmp_type = 8;

        let flow = FlowFormatted::try_from(record).unwrap();
        assert_eq!(flow.icmp_type, Some(8));
        assert!(flow.method.is_none());
        assert!(flow.query_name.is_none());
    }

    #[test]
    fn out_of_range_wire_values_are_rejected() {
        let mut record = base_record();
        record.dpi_protocol = 9;
        assert!(FlowFormatted::try_from(record).is_err());

        let mut record = base_record();
        record.verdict = 7;
        assert!(FlowFormatted::try_from(record).is_err());

        let mut record = base_record();
        record.direction = 4;
        assert!(FlowFormatted::try_from(record).is_err());
    }

    #[test]
    fn syscall_event_formats_with_name_and_path() {
        let mut event = SyscallEvent::empty();
        event.pid = 4242;
        event.kind = SyscallKind::Execve as u32;
        put(&mut event.comm, b"bash");
        put(&mut event.path, b"/usr/bin/true");

        let line = SyscallFormatted::try_from(event).unwrap();
        assert_eq!(line.pid, 4242);
        assert_eq!(line.syscall, "execve");
        assert_eq!(line.command, "bash");
        assert_eq!(line.path.as_deref(), Some("/usr/bin/true"));

        let json = serde_json::to_string(&line).unwrap();
        assert!(json.contains(r#""syscall":"execve""#));
    }

    #[test]
    fn pathless_syscall_event_omits_the_path() {
        let mut event = SyscallEvent::empty();
        event.pid = 7;
        event.kind = SyscallKind::Setuid as u32;
        put(&mut event.comm, b"sudo");

        let line = SyscallFormatted::try_from(event).unwrap();
        assert!(line.path.is_none());
        let json = serde_json::to_string(&line).unwrap();
        assert!(!json.contains("path"));
    }

    #[test]
    fn unknown_syscall_kind_is_rejected() {
        let mut event = SyscallEvent::empty();
        event.kind = 99;
        assert!(SyscallFormatted::try_from(event).is_err());
    }
}
