//! Synthetic frame builders shared by the unit tests.

use std::vec;
use std::vec::Vec;

use crate::decoder::{ETH_HDR_LEN, ETH_P_IP, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};

/// 10.0.0.1 in host order.
pub const SRC: u32 = 0x0a00_0001;
/// 10.0.0.2 in host order.
pub const DST: u32 = 0x0a00_0002;

pub fn arp_frame() -> Vec<u8> {
    let mut frame = vec![0u8; ETH_HDR_LEN];
    frame[12..14].copy_from_slice(&0x0806u16.to_be_bytes());
    frame.extend_from_slice(&[0u8; 28]);
    frame
}

/// An Ethernet + minimal IPv4 frame around the given transport bytes.
pub fn ipv4_frame(protocol: u8, l4: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; ETH_HDR_LEN];
    frame[12..14].copy_from_slice(&ETH_P_IP.to_be_bytes());
    let mut ip = [0u8; 20];
    ip[0] = 0x45;
    ip[9] = protocol;
    ip[12..16].copy_from_slice(&SRC.to_be_bytes());
    ip[16..20].copy_from_slice(&DST.to_be_bytes());
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(l4);
    frame
}

pub fn tcp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[12] = 0x50;
    tcp.extend_from_slice(payload);
    ipv4_frame(IPPROTO_TCP, &tcp)
}

pub fn udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut udp = vec![0u8; 8];
    udp[0..2].copy_from_slice(&src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    udp.extend_from_slice(payload);
    ipv4_frame(IPPROTO_UDP, &udp)
}

pub fn icmp_frame(icmp_type: u8) -> Vec<u8> {
    let mut icmp = [0u8; 8];
    icmp[0] = icmp_type;
    ipv4_frame(IPPROTO_ICMP, &icmp)
}

/// A DNS message holding a single question, ready to ride in a UDP frame.
pub fn dns_question(name: &str, query_type: u16) -> Vec<u8> {
    let mut payload = vec![0u8; 12];
    for label in name.split('.') {
        payload.push(label.len() as u8);
        payload.extend_from_slice(label.as_bytes());
    }
    payload.push(0);
    payload.extend_from_slice(&query_type.to_be_bytes());
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload
}
