/// Capacity of [`FlowRecord::method`].
pub const METHOD_LEN: usize = 8;
/// Capacity of [`FlowRecord::path`].
pub const PATH_LEN: usize = 64;
/// Capacity of [`FlowRecord::query_name`].
pub const QUERY_NAME_LEN: usize = 64;

/// One observed packet, as emitted over the event channel.
///
/// The layout is fixed: the kernel programs write this struct into a ring
/// buffer and userspace reads it back byte for byte. Addresses and ports
/// are host byte order. Fields outside the group selected by
/// `dpi_protocol` stay zero and are never matched against.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub struct FlowRecord {
    /// Monotonic capture time in nanoseconds.
    pub timestamp: u64,
    pub src_ip: u32,
    pub dst_ip: u32,
    /// Index of the capturing interface.
    pub ifindex: u32,
    /// Total observed frame length, headers included.
    pub payload_len: u32,
    /// Index of the rule that matched, -1 when none did.
    pub matched_rule: i32,
    /// Effective TC action applied to the packet.
    pub verdict: i32,
    pub src_port: u16,
    pub dst_port: u16,
    /// DNS query type in host order, 0 unless `dpi_protocol` is DNS.
    pub query_type: u16,
    /// IPv4 protocol number, one of 6 (TCP), 17 (UDP) or 1 (ICMP).
    pub protocol: u8,
    /// See [`Direction`](crate::Direction).
    pub direction: u8,
    /// See [`DpiProtocol`](crate::DpiProtocol).
    pub dpi_protocol: u8,
    pub icmp_type: u8,
    /// HTTP method bytes, NUL padded.
    pub method: [u8; METHOD_LEN],
    /// HTTP path bytes, NUL padded.
    pub path: [u8; PATH_LEN],
    /// DNS question name in dotted text, NUL padded.
    pub query_name: [u8; QUERY_NAME_LEN],
    pub _pad: [u8; 6],
}

impl FlowRecord {
    /// A record with every field at its unset value.
    pub const fn empty() -> Self {
        Self {
            timestamp: 0,
            src_ip: 0,
            dst_ip: 0,
            ifindex: 0,
            payload_len: 0,
            matched_rule: -1,
            verdict: 0,
            src_port: 0,
            dst_port: 0,
            query_type: 0,
            protocol: 0,
            direction: 0,
            dpi_protocol: 0,
            icmp_type: 0,
            method: [0; METHOD_LEN],
            path: [0; PATH_LEN],
            query_name: [0; QUERY_NAME_LEN],
            _pad: [0; 6],
        }
    }
}

#[cfg(feature = "user")]
impl Default for FlowRecord {
    fn default() -> Self {
        Self::empty()
    }
}

// Safety FlowRecord is repr(C), Copy and free of references
#[cfg(feature = "user")]
unsafe impl aya::Pod for FlowRecord {}

/// The slice up to the first NUL, or the whole buffer when none is found.
pub fn nul_trimmed(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == 0) {
        Some(end) => &buf[..end],
        None => buf,
    }
}
