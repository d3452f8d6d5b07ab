//! Assembly of one [`FlowRecord`] per decoded frame.

use crate::decoder::{self, Decoded};
use crate::dpi;
use crate::record::FlowRecord;
use crate::Direction;

/// Capture-time facts supplied by the packet source next to the buffer.
#[derive(Clone, Copy)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub struct FrameMeta {
    /// Monotonic nanoseconds.
    pub timestamp: u64,
    pub ifindex: u32,
    pub direction: Direction,
}

/// What became of one frame.
#[derive(Clone, Copy)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub enum Inspection {
    /// Not IPv4; no record exists.
    PassThrough,
    /// Structurally unsound; the record was abandoned.
    Discard,
    /// A completed record, ready for matching and publication.
    Flow(FlowRecord),
}

/// Decode `frame` and assemble its record. Pure bookkeeping: every
/// decision was already taken by the decoder and the classifier.
pub fn inspect(frame: &[u8], meta: FrameMeta) -> Inspection {
    let transport = match decoder::decode(frame) {
        Decoded::PassThrough => return Inspection::PassThrough,
        Decoded::Discard => return Inspection::Discard,
        Decoded::Transport(transport) => transport,
    };

    let mut record = FlowRecord::empty();
    record.timestamp = meta.timestamp;
    record.ifindex = meta.ifindex;
    record.direction = meta.direction as u8;
    record.payload_len = frame.len() as u32;
    record.src_ip = transport.src_ip;
    record.dst_ip = transport.dst_ip;
    record.src_port = transport.src_port;
    record.dst_port = transport.dst_port;
    record.protocol = transport.protocol;
    dpi::classify(frame, &transport, &mut record);
    Inspection::Flow(record)
}
