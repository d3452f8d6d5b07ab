//! Shallow payload classification. Each sniffer reads a fixed window of
//! the transport payload, fills the matching record fields and tags the
//! record with the recognized protocol. Truncation is never an error: a
//! scan that runs out of bytes stops and leaves its field partial.

use crate::decoder::{Transport, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use crate::record::{FlowRecord, METHOD_LEN, PATH_LEN, QUERY_NAME_LEN};
use crate::DpiProtocol;

/// Widest HTTP request-line window a sniffer will look at.
pub const HTTP_SCAN_LEN: usize = 256;
/// Ports that trigger the HTTP sniffer on TCP.
pub const HTTP_PORTS: [u16; 2] = [80, 8080];
/// Port that triggers the DNS sniffer on UDP.
pub const DNS_PORT: u16 = 53;
/// Fixed DNS message header preceding the question section.
pub const DNS_HDR_LEN: usize = 12;

/// Dispatch the payload to the sniffer selected by transport and port.
pub fn classify(frame: &[u8], transport: &Transport, record: &mut FlowRecord) {
    let payload = frame.get(transport.payload..).unwrap_or(&[]);
    match transport.protocol {
        IPPROTO_TCP if http_port(transport.src_port) || http_port(transport.dst_port) => {
            sniff_http(payload, record)
        }
        IPPROTO_UDP if transport.src_port == DNS_PORT || transport.dst_port == DNS_PORT => {
            sniff_dns(payload, record)
        }
        IPPROTO_ICMP => sniff_icmp(payload, record),
        _ => {}
    }
}

fn http_port(port: u16) -> bool {
    HTTP_PORTS.contains(&port)
}

/// Pick the request method and path out of what looks like an HTTP
/// request line. The record is tagged HTTP whenever the sniffer runs;
/// port 80 traffic that is not HTTP simply yields empty fields.
pub fn sniff_http(payload: &[u8], record: &mut FlowRecord) {
    let window = &payload[..payload.len().min(HTTP_SCAN_LEN)];
    for (i, &byte) in window.iter().take(METHOD_LEN).enumerate() {
        if byte == b' ' {
            break;
        }
        record.method[i] = byte;
    }
    if let Some(space) = window.iter().position(|&b| b == b' ') {
        for (i, &byte) in window[space + 1..].iter().take(PATH_LEN).enumerate() {
            if byte == b' ' {
                break;
            }
            record.path[i] = byte;
        }
    }
    record.dpi_protocol = DpiProtocol::Http as u8;
}

/// Decode the question name of a DNS message into dotted text and pull
/// out the query type. The name scan covers at most [`QUERY_NAME_LEN`]
/// wire bytes; the type is read only when the name terminator and two
/// more bytes sit inside the window. Messages too short to hold a
/// question leave the record untagged.
pub fn sniff_dns(payload: &[u8], record: &mut FlowRecord) {
    let Some(question) = payload.get(DNS_HDR_LEN..) else {
        return;
    };
    if question.is_empty() {
        return;
    }

    let mut out = 0;
    let mut wire = 0;
    let mut name_end = None;
    while wire < question.len() && wire < QUERY_NAME_LEN {
        let label_len = question[wire] as usize;
        if label_len == 0 {
            name_end = Some(wire + 1);
            break;
        }
        // Compression pointers never appear in a query name.
        if label_len >= 0x40 {
            break;
        }
        if out > 0 {
            if out < QUERY_NAME_LEN {
                record.query_name[out] = b'.';
            }
            out += 1;
        }
        wire += 1;
        let label_end = (wire + label_len).min(question.len()).min(QUERY_NAME_LEN);
        while wire < label_end {
            if out < QUERY_NAME_LEN {
                record.query_name[out] = question[wire];
            }
            out += 1;
            wire += 1;
        }
    }

    if let Some(end) = name_end {
        if let Some(bytes) = question.get(end..end + 2) {
            record.query_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        }
    }
    record.dpi_protocol = DpiProtocol::Dns as u8;
}

/// Record the ICMP type byte.
pub fn sniff_icmp(header: &[u8], record: &mut FlowRecord) {
    let Some(&icmp_type) = header.first() else {
        return;
    };
    record.icmp_type = icmp_type;
    record.dpi_protocol = DpiProtocol::Icmp as u8;
}
