//! Shared types between eBPF (kernel) and userspace
//!
//! This crate defines the TCP reset record that must be:
//! - `#[repr(C)]` for stable memory layout
//! - `no_std` compatible for eBPF
//! - Shared between kernel probes and the userspace agent
//!
//! Userspace never reinterprets ring buffer bytes as [`TcpResetEvent`]; it
//! decodes them field by field with [`TcpResetEvent::decode`], so the byte
//! layout documented in [`layout`] is the contract.

#![cfg_attr(not(feature = "userspace"), no_std)]

/// Connection 5-tuple as captured by the probe.
///
/// Addresses are raw network-order bytes: IPv4 uses the first 4 bytes,
/// IPv6 all 16. Ports are host byte order.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct Tuple {
    pub saddr: [u8; 16],
    pub daddr: [u8; 16],
    pub sport: u16,
    pub dport: u16,
    pub l3_proto: u16,
    pub l4_proto: u8,
    pub _pad: u8,
}

impl Tuple {
    /// Tuple of a reset sent in answer to an IPv4 TCP segment, oriented like
    /// a socket tuple on the sending host: the segment's destination is the
    /// local side. Addresses are raw header bytes; ports are in network byte
    /// order as read from the TCP header.
    pub fn reply_to_ipv4_segment(saddr: [u8; 4], daddr: [u8; 4], source: u16, dest: u16) -> Self {
        let mut local = [0u8; 16];
        local[..4].copy_from_slice(&daddr);
        let mut remote = [0u8; 16];
        remote[..4].copy_from_slice(&saddr);

        Tuple {
            saddr: local,
            daddr: remote,
            sport: u16::from_be(dest),
            dport: u16::from_be(source),
            l3_proto: l3::IPV4,
            l4_proto: protocol::TCP,
            _pad: 0,
        }
    }
}

/// Packet and socket metadata captured alongside the tuple.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct SkbMeta {
    pub netns: u32,
    pub mark: u32,
    pub ifindex: u32,
    pub len: u32,
    pub mtu: u32,
    pub sk_state: u32,
    pub protocol: u16,
    pub _pad: u16,
}

/// TCP reset event emitted by the reset probes
///
/// Layout (88 bytes total, 8-byte aligned):
/// - kind: one of the [`kind`] constants
/// - state: TCP state of the socket when the probe fired
/// - tuple: packed 5-tuple (40 bytes)
/// - skb_meta: packed metadata (28 bytes)
/// - _reserved: 7 bytes, always zero
/// - stack_id: key into the `STACKS` stack-trace map, negative when capture failed
#[repr(C)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct TcpResetEvent {
    pub kind: u32,
    pub state: u8,
    pub tuple: Tuple,
    pub skb_meta: SkbMeta,
    pub _reserved: [u8; 7],
    pub stack_id: i64,
}

/// Reset event kinds, stored in [`TcpResetEvent::kind`]
pub mod kind {
    /// Reset sent for a segment with no owning socket
    pub const NOSOCK: u32 = 1;
    /// Reset sent actively by a socket (`tcp_send_active_reset`)
    pub const ACTIVE: u32 = 2;
    /// Reset sent on behalf of a socket (`tcp_v4_send_reset`)
    pub const PROCESS: u32 = 4;
    /// Reset received from the peer
    pub const RECEIVE: u32 = 8;
}

/// L3 protocol constants (ethertype values)
pub mod l3 {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86dd;
}

/// IP protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Byte offsets of every field in the wire record.
pub mod layout {
    pub const KIND: usize = 0;
    pub const STATE: usize = 4;
    pub const SADDR: usize = 5;
    pub const DADDR: usize = 21;
    pub const SPORT: usize = 37;
    pub const DPORT: usize = 39;
    pub const L3_PROTO: usize = 41;
    pub const L4_PROTO: usize = 43;
    pub const NETNS: usize = 45;
    pub const MARK: usize = 49;
    pub const IFINDEX: usize = 53;
    pub const LEN: usize = 57;
    pub const MTU: usize = 61;
    pub const SK_STATE: usize = 65;
    pub const PROTOCOL: usize = 69;
    pub const RESERVED: usize = 73;
    pub const STACK_ID: usize = 80;
    pub const SIZE: usize = 88;
}

const _: () = {
    assert!(
        core::mem::size_of::<Tuple>() == 40,
        "Tuple must be exactly 40 bytes"
    );
    assert!(
        core::mem::size_of::<SkbMeta>() == 28,
        "SkbMeta must be exactly 28 bytes"
    );
    assert!(
        core::mem::size_of::<TcpResetEvent>() == layout::SIZE,
        "TcpResetEvent must be exactly 88 bytes"
    );
    assert!(
        core::mem::align_of::<TcpResetEvent>() == 8,
        "TcpResetEvent must be 8-byte aligned"
    );
    assert!(core::mem::offset_of!(TcpResetEvent, tuple) == layout::SADDR);
    assert!(core::mem::offset_of!(TcpResetEvent, skb_meta) == layout::NETNS);
    assert!(core::mem::offset_of!(TcpResetEvent, _reserved) == layout::RESERVED);
    assert!(core::mem::offset_of!(TcpResetEvent, stack_id) == layout::STACK_ID);
};

#[cfg(feature = "userspace")]
mod codec;

#[cfg(feature = "userspace")]
pub use codec::{tcp_state_name, DecodeError, ResetKind};
