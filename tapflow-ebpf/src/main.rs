#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::{TC_ACT_OK, TC_ACT_SHOT},
    cty::c_long,
    helpers::{bpf_ktime_get_ns, bpf_probe_read_user_str_bytes, gen},
    macros::{classifier, map, tracepoint},
    maps::{ring_buf::RingBufEntry, Array, HashMap, RingBuf},
    programs::{TcContext, TracePointContext},
};
use network_types::{
    eth::{EthHdr, EtherType},
    icmp::IcmpHdr,
    ip::{IpProto, Ipv4Hdr},
    tcp::TcpHdr,
    udp::UdpHdr,
};
use tapflow_common::{
    sniff_dns, sniff_http, sniff_icmp, ConfigOpt, Direction, FlowRecord, FlowRule, Mode,
    SyscallEvent, SyscallKind, CONFIG_SLOTS, DNS_HDR_LEN, DNS_PORT, HTTP_PORTS, HTTP_SCAN_LEN,
    QUERY_NAME_LEN, RULE_SLOTS, TASK_COMM_LEN,
};

#[no_mangle]
#[link_section = "license"]
pub static _license: [u8; 4] = *b"GPL\0";

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(1 << 24, 0);

#[map]
static SYSCALL_EVENTS: RingBuf = RingBuf::with_byte_size(1 << 24, 0);

#[map]
static FLOW_RULES: Array<FlowRule> = Array::with_max_entries(RULE_SLOTS as u32, 0);

#[map]
static CONFIG: HashMap<ConfigOpt, u32> = HashMap::with_max_entries(CONFIG_SLOTS, 0);

// DNS header plus the widest name the record can hold and its type.
const DNS_SCAN_LEN: usize = DNS_HDR_LEN + QUERY_NAME_LEN + 2;

// Offset of the args array in trace_event_raw_sys_enter.
const SYS_ENTER_ARGS: usize = 16;

#[classifier]
pub fn tapflow_ingress(ctx: TcContext) -> i32 {
    match try_inspect(&ctx, Direction::Ingress) {
        Ok(ret) => ret,
        Err(_) => TC_ACT_OK,
    }
}

#[classifier]
pub fn tapflow_egress(ctx: TcContext) -> i32 {
    match try_inspect(&ctx, Direction::Egress) {
        Ok(ret) => ret,
        Err(_) => TC_ACT_OK,
    }
}

fn try_inspect(ctx: &TcContext, direction: Direction) -> Result<i32, c_long> {
    let eth: EthHdr = ctx.load(0)?;
    if eth.ether_type != EtherType::Ipv4 {
        return Ok(TC_ACT_OK);
    }

    let ip: Ipv4Hdr = ctx.load(EthHdr::LEN)?;
    let ihl = ip.ihl() as usize * 4;
    if ihl < Ipv4Hdr::LEN || EthHdr::LEN + ihl > ctx.len() as usize {
        return Ok(TC_ACT_OK);
    }
    if !matches!(ip.proto, IpProto::Tcp | IpProto::Udp | IpProto::Icmp) {
        return Ok(TC_ACT_OK);
    }

    let Some(mut entry) = EVENTS.reserve::<FlowRecord>(0) else {
        return Ok(TC_ACT_OK);
    };

    let record = entry.write(FlowRecord::empty());
    record.timestamp = unsafe { bpf_ktime_get_ns() };
    record.payload_len = ctx.len();
    record.ifindex = unsafe { (*ctx.skb.skb).ifindex };
    record.direction = direction as u8;
    record.src_ip = u32::from_be(ip.src_addr);
    record.dst_ip = u32::from_be(ip.dst_addr);
    record.protocol = ip.proto as u8;

    let l4 = EthHdr::LEN + ihl;
    match ip.proto {
        IpProto::Tcp => {
            let tcp: TcpHdr = match ctx.load(l4) {
                Ok(tcp) => tcp,
                Err(_) => return Ok(abandon(entry)),
            };
            let header_len = tcp.doff() as usize * 4;
            if header_len < TcpHdr::LEN || l4 + header_len > ctx.len() as usize {
                return Ok(abandon(entry));
            }
            record.src_port = u16::from_be(tcp.source);
            record.dst_port = u16::from_be(tcp.dest);

            if HTTP_PORTS.contains(&record.dst_port) || HTTP_PORTS.contains(&record.src_port) {
                let mut window = [0u8; HTTP_SCAN_LEN];
                let filled = load_window(ctx, l4 + header_len, &mut window);
                sniff_http(&window[..filled], record);
            }
        }
        IpProto::Udp => {
            let udp: UdpHdr = match ctx.load(l4) {
                Ok(udp) => udp,
                Err(_) => return Ok(abandon(entry)),
            };
            record.src_port = u16::from_be(udp.source);
            record.dst_port = u16::from_be(udp.dest);

            if record.dst_port == DNS_PORT || record.src_port == DNS_PORT {
                let mut window = [0u8; DNS_SCAN_LEN];
                let filled = load_window(ctx, l4 + UdpHdr::LEN, &mut window);
                sniff_dns(&window[..filled], record);
            }
        }
        IpProto::Icmp => {
            let icmp: IcmpHdr = match ctx.load(l4) {
                Ok(icmp) => icmp,
                Err(_) => return Ok(abandon(entry)),
            };
            sniff_icmp(&[icmp.type_], record);
        }
        _ => return Ok(abandon(entry)),
    }

    let (mode, scan_limit) = runtime_config();
    match first_firing_slot(record, scan_limit) {
        Some(_) if mode == Mode::Enforce => {
            entry.discard(0);
            return Ok(TC_ACT_SHOT);
        }
        Some(slot) => record.matched_rule = slot as i32,
        None => {}
    }

    entry.submit(0);
    Ok(TC_ACT_OK)
}

/// Give the reservation back without publishing; the packet flows on.
fn abandon(entry: RingBufEntry<FlowRecord>) -> i32 {
    entry.discard(0);
    TC_ACT_OK
}

/// Copy up to `buf.len()` payload bytes starting at `offset`.
fn load_window(ctx: &TcContext, offset: usize, buf: &mut [u8]) -> usize {
    if offset >= ctx.len() as usize {
        return 0;
    }
    ctx.load_bytes(offset, buf).unwrap_or(0)
}

fn runtime_config() -> (Mode, u32) {
    // SAFETY: userspace writes whole cells, reads see one or the other
    let mode = match unsafe { CONFIG.get(&ConfigOpt::Mode) } {
        Some(&cell) if cell == Mode::Observe as u32 => Mode::Observe,
        _ => Mode::Enforce,
    };
    let scan_limit = match unsafe { CONFIG.get(&ConfigOpt::ScanLimit) } {
        Some(&cell) => cell,
        None => RULE_SLOTS as u32,
    };
    (mode, scan_limit)
}

fn first_firing_slot(record: &FlowRecord, scan_limit: u32) -> Option<u32> {
    let bound = scan_limit.min(RULE_SLOTS as u32);
    for slot in 0..bound {
        let Some(rule) = FLOW_RULES.get(slot) else {
            continue;
        };
        if rule.fires(record) {
            return Some(slot);
        }
    }
    None
}

#[tracepoint]
pub fn log_execve(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Execve, Some(0))
}

#[tracepoint]
pub fn log_execveat(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Execveat, Some(1))
}

#[tracepoint]
pub fn log_open(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Open, Some(1))
}

#[tracepoint]
pub fn log_unlink(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Unlink, Some(1))
}

#[tracepoint]
pub fn log_chmod(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Chmod, Some(0))
}

#[tracepoint]
pub fn log_mount(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Mount, Some(1))
}

#[tracepoint]
pub fn log_setuid(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Setuid, None)
}

#[tracepoint]
pub fn log_socket(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Socket, None)
}

#[tracepoint]
pub fn log_connect(ctx: TracePointContext) -> u32 {
    trace_syscall(&ctx, SyscallKind::Connect, None)
}

fn trace_syscall(ctx: &TracePointContext, kind: SyscallKind, path_arg: Option<usize>) -> u32 {
    let Some(mut entry) = SYSCALL_EVENTS.reserve::<SyscallEvent>(0) else {
        return 0;
    };

    let event = entry.write(SyscallEvent::empty());
    event.pid = (unsafe { gen::bpf_get_current_pid_tgid() } >> 32) as u32;
    event.kind = kind as u32;
    // The helper writes the task name straight into the reserved slot.
    unsafe {
        gen::bpf_get_current_comm(event.comm.as_mut_ptr().cast(), TASK_COMM_LEN as u32);
    }

    if let Some(arg) = path_arg {
        let user_ptr = unsafe { ctx.read_at::<u64>(SYS_ENTER_ARGS + 8 * arg) }.unwrap_or(0);
        if user_ptr != 0 {
            // A failed copy leaves the path empty rather than losing the event.
            let _ =
                unsafe { bpf_probe_read_user_str_bytes(user_ptr as *const u8, &mut event.path) };
        }
    }

    entry.submit(0);
    0
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
