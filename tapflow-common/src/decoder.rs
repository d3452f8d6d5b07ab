//! Bounded walk over the link, network and transport headers of a raw
//! frame. Every offset is validated against the buffer before it is read;
//! the walk never loops and never allocates.

pub const ETH_HDR_LEN: usize = 14;
pub const ETH_P_IP: u16 = 0x0800;
pub const IPV4_MIN_HDR_LEN: usize = 20;
pub const TCP_MIN_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;
pub const ICMP_HDR_LEN: usize = 8;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// Transport-layer summary of a successfully decoded frame.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub struct Transport {
    /// Host byte order.
    pub src_ip: u32,
    pub dst_ip: u32,
    /// Zero for ICMP.
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    /// Offset of the transport payload within the frame. For ICMP this is
    /// the transport header itself, which is all the classifier reads.
    pub payload: usize,
}

/// Outcome of the header walk.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub enum Decoded {
    /// Not IPv4. The frame is none of our business and flows on untouched.
    PassThrough,
    /// IPv4 but structurally unsound, or an unsupported transport. The
    /// frame itself still flows on; only its record is abandoned.
    Discard,
    Transport(Transport),
}

/// Walk the headers of `frame` down to the transport layer.
pub fn decode(frame: &[u8]) -> Decoded {
    let Some(ethertype) = read_u16(frame, ETH_HDR_LEN - 2) else {
        return Decoded::PassThrough;
    };
    if ethertype != ETH_P_IP {
        return Decoded::PassThrough;
    }
    decode_ipv4(frame)
}

fn decode_ipv4(frame: &[u8]) -> Decoded {
    if frame.len() < ETH_HDR_LEN + IPV4_MIN_HDR_LEN {
        return Decoded::Discard;
    }
    let ip = &frame[ETH_HDR_LEN..];
    let ihl = (ip[0] & 0x0f) as usize;
    if ihl < 5 {
        return Decoded::Discard;
    }
    // The declared header, options included, must fit the buffer.
    let header_len = ihl * 4;
    if ip.len() < header_len {
        return Decoded::Discard;
    }
    let protocol = ip[9];
    let src_ip = u32::from_be_bytes([ip[12], ip[13], ip[14], ip[15]]);
    let dst_ip = u32::from_be_bytes([ip[16], ip[17], ip[18], ip[19]]);
    let l4 = ETH_HDR_LEN + header_len;
    match protocol {
        IPPROTO_TCP => decode_tcp(frame, l4, src_ip, dst_ip),
        IPPROTO_UDP => decode_udp(frame, l4, src_ip, dst_ip),
        IPPROTO_ICMP => decode_icmp(frame, l4, src_ip, dst_ip),
        _ => Decoded::Discard,
    }
}

fn decode_tcp(frame: &[u8], l4: usize, src_ip: u32, dst_ip: u32) -> Decoded {
    let Some(tcp) = frame.get(l4..l4 + TCP_MIN_HDR_LEN) else {
        return Decoded::Discard;
    };
    let doff = (tcp[12] >> 4) as usize;
    if doff < 5 {
        return Decoded::Discard;
    }
    let header_len = doff * 4;
    if frame.len() < l4 + header_len {
        return Decoded::Discard;
    }
    Decoded::Transport(Transport {
        src_ip,
        dst_ip,
        src_port: u16::from_be_bytes([tcp[0], tcp[1]]),
        dst_port: u16::from_be_bytes([tcp[2], tcp[3]]),
        protocol: IPPROTO_TCP,
        payload: l4 + header_len,
    })
}

fn decode_udp(frame: &[u8], l4: usize, src_ip: u32, dst_ip: u32) -> Decoded {
    let Some(udp) = frame.get(l4..l4 + UDP_HDR_LEN) else {
        return Decoded::Discard;
    };
    Decoded::Transport(Transport {
        src_ip,
        dst_ip,
        src_port: u16::from_be_bytes([udp[0], udp[1]]),
        dst_port: u16::from_be_bytes([udp[2], udp[3]]),
        protocol: IPPROTO_UDP,
        payload: l4 + UDP_HDR_LEN,
    })
}

fn decode_icmp(frame: &[u8], l4: usize, src_ip: u32, dst_ip: u32) -> Decoded {
    if frame.get(l4..l4 + ICMP_HDR_LEN).is_none() {
        return Decoded::Discard;
    }
    Decoded::Transport(Transport {
        src_ip,
        dst_ip,
        src_port: 0,
        dst_port: 0,
        protocol: IPPROTO_ICMP,
        payload: l4,
    })
}

fn read_u16(frame: &[u8], offset: usize) -> Option<u16> {
    let bytes = frame.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
