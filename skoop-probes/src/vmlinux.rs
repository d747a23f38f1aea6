//! Kernel structure prefixes read by the reset probes.
//!
//! Only the leading, long-stable part of `struct sock_common` is described
//! (64-bit kernels built with CONFIG_IPV6). Fields past `skc_v6_rcv_saddr`
//! are never read. `struct sk_buff` and `struct net` move with kernel config,
//! so they are described by field offsets for x86_64 5.15 through 6.1 with
//! CONFIG_NF_CONNTRACK and CONFIG_KEYS. Headers read through those offsets
//! are checked before use.

#![allow(non_camel_case_types)]

#[repr(C)]
#[derive(Clone, Copy)]
pub struct sock_common {
    pub skc_daddr: u32,
    pub skc_rcv_saddr: u32,
    pub skc_hash: u32,
    /// network byte order
    pub skc_dport: u16,
    /// host byte order
    pub skc_num: u16,
    pub skc_family: u16,
    pub skc_state: u8,
    pub skc_flags: u8,
    pub skc_bound_dev_if: i32,
    pub skc_bind_node: [u64; 2],
    pub skc_prot: u64,
    pub skc_net: u64,
    pub skc_v6_daddr: [u8; 16],
    pub skc_v6_rcv_saddr: [u8; 16],
}

/// Field offsets in `struct sk_buff`
pub mod sk_buff {
    /// `unsigned int len`
    pub const LEN: usize = 112;
    /// `__u32 mark`
    pub const MARK: usize = 156;
    /// `__u16 network_header`, relative to `head`
    pub const NETWORK_HEADER: usize = 172;
    /// `unsigned char *head`
    pub const HEAD: usize = 184;
}

/// Field offsets in `struct net`
pub mod net {
    /// `ns.inum`, the namespace inode number
    pub const NS_INUM: usize = 136;
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct iphdr {
    /// `ihl` in the low nibble, `version` in the high nibble
    pub ihl_version: u8,
    pub tos: u8,
    pub tot_len: u16,
    pub id: u16,
    pub frag_off: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub check: u16,
    pub saddr: u32,
    pub daddr: u32,
}

/// Leading ports and sequence numbers of `struct tcphdr`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct tcphdr {
    /// network byte order
    pub source: u16,
    /// network byte order
    pub dest: u16,
    pub seq: u32,
    pub ack_seq: u32,
}
