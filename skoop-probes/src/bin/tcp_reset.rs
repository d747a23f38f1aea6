//! TCP reset probes that send reset events via ring buffer
//!
//! This binary:
//! - Attaches kprobes on `tcp_send_active_reset` and `tcp_v4_send_reset`
//! - Attaches to the `tcp:tcp_receive_reset` tracepoint
//! - Captures the socket tuple, TCP state and the kernel stack id
//! - Falls back to the answered segment's headers when a reset has no socket
//! - Sends events to userspace via ring buffer
//!
//! Note: This binary must be built for the bpfel-unknown-none target.
//! skoop-agent's build.rs handles cross-compilation automatically.

#![no_std]
#![no_main]

#[path = "../vmlinux.rs"]
mod vmlinux;

use aya_ebpf::{
    helpers::bpf_probe_read_kernel,
    macros::{kprobe, map, tracepoint},
    maps::{RingBuf, StackTrace},
    programs::{ProbeContext, TracePointContext},
    EbpfContext,
};
use aya_log_ebpf::debug;
use skoop_common::{kind, l3, protocol, SkbMeta, TcpResetEvent, Tuple};
use vmlinux::{iphdr, net, sk_buff, sock_common, tcphdr};

/// Ring buffer size in bytes. 256KB holds ~2900 reset events before dropping.
const RING_BUF_SIZE: u32 = 256 * 1024;

const STACK_MAP_ENTRIES: u32 = 1024;

const AF_INET: u16 = 2;
const AF_INET6: u16 = 10;

const IPPROTO_TCP: u8 = 6;

/// `skaddr` offset in the `tcp:tcp_receive_reset` tracepoint record
const RECEIVE_RESET_SKADDR_OFFSET: usize = 8;

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(RING_BUF_SIZE, 0);

#[map]
static STACKS: StackTrace = StackTrace::with_max_entries(STACK_MAP_ENTRIES, 0);

#[kprobe]
pub fn trace_sendactive(ctx: ProbeContext) -> u32 {
    let sk: *const sock_common = ctx.arg(0).unwrap_or(core::ptr::null());
    let _ = emit(&ctx, sk, core::ptr::null(), kind::ACTIVE);
    0
}

#[kprobe]
pub fn trace_sendreset(ctx: ProbeContext) -> u32 {
    let sk: *const sock_common = ctx.arg(0).unwrap_or(core::ptr::null());
    let skb: *const u8 = ctx.arg(1).unwrap_or(core::ptr::null());
    let event_kind = if sk.is_null() {
        kind::NOSOCK
    } else {
        kind::PROCESS
    };
    let _ = emit(&ctx, sk, skb, event_kind);
    0
}

#[tracepoint]
pub fn trace_rstrx(ctx: TracePointContext) -> u32 {
    // SAFETY: skaddr is the first field after the common tracepoint header
    let sk: *const sock_common =
        match unsafe { ctx.read_at::<u64>(RECEIVE_RESET_SKADDR_OFFSET) } {
            Ok(addr) => addr as *const sock_common,
            Err(_) => return 0,
        };
    let _ = emit(&ctx, sk, core::ptr::null(), kind::RECEIVE);
    0
}

/// Read a `T` at `offset` bytes into a kernel object
///
/// # Safety
/// `base` must be a kernel address; the helper validates the read itself.
unsafe fn read_at<T>(base: *const u8, offset: usize) -> Result<T, i64> {
    bpf_probe_read_kernel(base.wrapping_add(offset) as *const T)
}

/// Tuple of the IPv4 TCP segment a socketless reset answers
fn segment_tuple(skb: *const u8) -> Option<Tuple> {
    // SAFETY: skb is the sk_buff argument of tcp_v4_send_reset
    let head: u64 = unsafe { read_at(skb, sk_buff::HEAD) }.ok()?;
    let network: u16 = unsafe { read_at(skb, sk_buff::NETWORK_HEADER) }.ok()?;
    let ip_at = (head + network as u64) as *const u8;

    // SAFETY: ip_at points into the skb data area
    let ip: iphdr = unsafe { read_at(ip_at, 0) }.ok()?;
    let ihl = (ip.ihl_version & 0x0f) as usize;
    if ip.ihl_version >> 4 != 4 || ihl < 5 || ip.protocol != IPPROTO_TCP {
        return None;
    }

    // SAFETY: the TCP header follows the IP header and its options
    let tcp: tcphdr = unsafe { read_at(ip_at, ihl * 4) }.ok()?;

    Some(Tuple::reply_to_ipv4_segment(
        ip.saddr.to_ne_bytes(),
        ip.daddr.to_ne_bytes(),
        tcp.source,
        tcp.dest,
    ))
}

fn netns_inum(net_ptr: u64) -> u32 {
    if net_ptr == 0 {
        return 0;
    }
    // SAFETY: skc_net points at the socket's struct net
    unsafe { read_at(net_ptr as *const u8, net::NS_INUM) }.unwrap_or(0)
}

fn emit<C: EbpfContext>(
    ctx: &C,
    sk: *const sock_common,
    skb: *const u8,
    event_kind: u32,
) -> Result<(), i64> {
    let mut tuple = Tuple {
        saddr: [0; 16],
        daddr: [0; 16],
        sport: 0,
        dport: 0,
        l3_proto: 0,
        l4_proto: protocol::TCP,
        _pad: 0,
    };
    let mut state = 0u8;
    let mut ifindex = 0u32;
    let mut netns = 0u32;
    let mut mark = 0u32;
    let mut len = 0u32;

    if !sk.is_null() {
        // SAFETY: sk points at a kernel socket; the helper validates the read
        let common = unsafe { bpf_probe_read_kernel(sk) }?;

        let mut saddr = [0u8; 16];
        let mut daddr = [0u8; 16];
        let l3_proto = match common.skc_family {
            AF_INET => {
                saddr[..4].copy_from_slice(&common.skc_rcv_saddr.to_ne_bytes());
                daddr[..4].copy_from_slice(&common.skc_daddr.to_ne_bytes());
                l3::IPV4
            }
            AF_INET6 => {
                saddr = common.skc_v6_rcv_saddr;
                daddr = common.skc_v6_daddr;
                l3::IPV6
            }
            _ => return Ok(()),
        };

        tuple.saddr = saddr;
        tuple.daddr = daddr;
        tuple.sport = common.skc_num;
        tuple.dport = u16::from_be(common.skc_dport);
        tuple.l3_proto = l3_proto;
        state = common.skc_state;
        ifindex = common.skc_bound_dev_if as u32;
        netns = netns_inum(common.skc_net);
    } else if !skb.is_null() {
        if let Some(segment) = segment_tuple(skb) {
            tuple = segment;
        }
    }

    if !skb.is_null() {
        // SAFETY: skb is a kernel sk_buff; unreadable fields stay zero
        len = unsafe { read_at(skb, sk_buff::LEN) }.unwrap_or(0);
        mark = unsafe { read_at(skb, sk_buff::MARK) }.unwrap_or(0);
    }

    // SAFETY: get_stackid only records the current kernel stack
    let stack_id = unsafe { STACKS.get_stackid(ctx, 0) }.unwrap_or(-1);

    let event = TcpResetEvent {
        kind: event_kind,
        state,
        tuple,
        skb_meta: SkbMeta {
            netns,
            mark,
            ifindex,
            len,
            // Needs the route's device; not reachable without BTF
            mtu: 0,
            sk_state: state as u32,
            protocol: tuple.l3_proto,
            _pad: 0,
        },
        _reserved: [0; 7],
        stack_id,
    };

    if let Some(mut entry) = EVENTS.reserve::<TcpResetEvent>(0) {
        entry.write(event);
        entry.submit(0);
        let (sport, dport) = (tuple.sport, tuple.dport);
        debug!(ctx, "reset kind={} sport={} dport={}", event_kind, sport, dport);
    }
    // Ring buffer full: the event is dropped rather than stalling the stack.

    Ok(())
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
