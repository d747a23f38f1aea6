//! Node agent for skoop (DaemonSet)
//!
//! Responsibilities:
//! - Load the TCP reset probes into the kernel
//! - Drain the reset ring buffer without ever blocking on consumers
//! - Decode reset records and symbolize their kernel stacks
//! - Release every probe and map handle together on shutdown

pub mod pipeline;
pub mod symbolizer;
pub mod teardown;

#[cfg(target_os = "linux")]
pub mod probe_loader;

/// Options accepted by the reset probe loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Also trace resets received from peers (`tcp:tcp_receive_reset`)
    pub receive_reset: bool,
    /// Resolve stack ids into kernel symbols
    pub symbolize: bool,
    /// Capacity of the reader -> consumer channel
    pub channel_capacity: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            receive_reset: false,
            symbolize: true,
            channel_capacity: 4096,
        }
    }
}
