//! Explicit little-endian codec for the ring buffer record

use crate::{kind, l3, layout, SkbMeta, TcpResetEvent, Tuple};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("reset record too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

/// Typed view of [`TcpResetEvent::kind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetKind {
    NoSock,
    Active,
    Process,
    Receive,
    Unknown(u32),
}

impl From<u32> for ResetKind {
    fn from(value: u32) -> Self {
        match value {
            kind::NOSOCK => ResetKind::NoSock,
            kind::ACTIVE => ResetKind::Active,
            kind::PROCESS => ResetKind::Process,
            kind::RECEIVE => ResetKind::Receive,
            other => ResetKind::Unknown(other),
        }
    }
}

impl fmt::Display for ResetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetKind::NoSock => write!(f, "TCPResetNoSock"),
            ResetKind::Active => write!(f, "TCPResetActive"),
            ResetKind::Process => write!(f, "TCPResetProcess"),
            ResetKind::Receive => write!(f, "TCPResetReceive"),
            ResetKind::Unknown(v) => write!(f, "TCPReset({})", v),
        }
    }
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_addr(buf: &[u8], at: usize) -> [u8; 16] {
    let mut addr = [0u8; 16];
    addr.copy_from_slice(&buf[at..at + 16]);
    addr
}

impl TcpResetEvent {
    /// Decode a record from raw ring buffer bytes.
    ///
    /// Trailing bytes beyond [`layout::SIZE`] are ignored. Pad and reserved
    /// bytes are not read and come back zeroed.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < layout::SIZE {
            return Err(DecodeError::TooShort {
                expected: layout::SIZE,
                actual: buf.len(),
            });
        }

        let mut stack_id = [0u8; 8];
        stack_id.copy_from_slice(&buf[layout::STACK_ID..layout::STACK_ID + 8]);

        Ok(Self {
            kind: read_u32(buf, layout::KIND),
            state: buf[layout::STATE],
            tuple: Tuple {
                saddr: read_addr(buf, layout::SADDR),
                daddr: read_addr(buf, layout::DADDR),
                sport: read_u16(buf, layout::SPORT),
                dport: read_u16(buf, layout::DPORT),
                l3_proto: read_u16(buf, layout::L3_PROTO),
                l4_proto: buf[layout::L4_PROTO],
                _pad: 0,
            },
            skb_meta: SkbMeta {
                netns: read_u32(buf, layout::NETNS),
                mark: read_u32(buf, layout::MARK),
                ifindex: read_u32(buf, layout::IFINDEX),
                len: read_u32(buf, layout::LEN),
                mtu: read_u32(buf, layout::MTU),
                sk_state: read_u32(buf, layout::SK_STATE),
                protocol: read_u16(buf, layout::PROTOCOL),
                _pad: 0,
            },
            _reserved: [0; 7],
            stack_id: i64::from_le_bytes(stack_id),
        })
    }

    /// Encode into the wire layout, zero-filling pad and reserved bytes.
    pub fn encode(&self) -> [u8; layout::SIZE] {
        let mut buf = [0u8; layout::SIZE];
        let tuple = self.tuple;
        let meta = self.skb_meta;

        buf[layout::KIND..layout::KIND + 4].copy_from_slice(&self.kind.to_le_bytes());
        buf[layout::STATE] = self.state;
        buf[layout::SADDR..layout::SADDR + 16].copy_from_slice(&tuple.saddr);
        buf[layout::DADDR..layout::DADDR + 16].copy_from_slice(&tuple.daddr);
        buf[layout::SPORT..layout::SPORT + 2].copy_from_slice(&tuple.sport.to_le_bytes());
        buf[layout::DPORT..layout::DPORT + 2].copy_from_slice(&tuple.dport.to_le_bytes());
        buf[layout::L3_PROTO..layout::L3_PROTO + 2].copy_from_slice(&tuple.l3_proto.to_le_bytes());
        buf[layout::L4_PROTO] = tuple.l4_proto;

        for (at, value) in [
            (layout::NETNS, meta.netns),
            (layout::MARK, meta.mark),
            (layout::IFINDEX, meta.ifindex),
            (layout::LEN, meta.len),
            (layout::MTU, meta.mtu),
            (layout::SK_STATE, meta.sk_state),
        ] {
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        buf[layout::PROTOCOL..layout::PROTOCOL + 2].copy_from_slice(&meta.protocol.to_le_bytes());
        buf[layout::STACK_ID..layout::STACK_ID + 8].copy_from_slice(&self.stack_id.to_le_bytes());

        buf
    }

    pub fn reset_kind(&self) -> ResetKind {
        ResetKind::from(self.kind)
    }

    pub fn source(&self) -> Option<SocketAddr> {
        let tuple = self.tuple;
        to_ip(tuple.l3_proto, tuple.saddr).map(|ip| SocketAddr::new(ip, tuple.sport))
    }

    pub fn destination(&self) -> Option<SocketAddr> {
        let tuple = self.tuple;
        to_ip(tuple.l3_proto, tuple.daddr).map(|ip| SocketAddr::new(ip, tuple.dport))
    }

    /// Stack map key, if the probe managed to capture a stack
    pub fn stack_key(&self) -> Option<u32> {
        u32::try_from(self.stack_id).ok()
    }
}

fn to_ip(l3_proto: u16, addr: [u8; 16]) -> Option<IpAddr> {
    match l3_proto {
        l3::IPV4 => Some(IpAddr::V4(Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]))),
        l3::IPV6 => Some(IpAddr::V6(Ipv6Addr::from(addr))),
        _ => None,
    }
}

/// Name of a kernel TCP state (`include/net/tcp_states.h`)
pub fn tcp_state_name(state: u8) -> &'static str {
    match state {
        1 => "ESTABLISHED",
        2 => "SYN_SENT",
        3 => "SYN_RECV",
        4 => "FIN_WAIT1",
        5 => "FIN_WAIT2",
        6 => "TIME_WAIT",
        7 => "CLOSE",
        8 => "CLOSE_WAIT",
        9 => "LAST_ACK",
        10 => "LISTEN",
        11 => "CLOSING",
        12 => "NEW_SYN_RECV",
        _ => "UNKNOWN",
    }
}
