//! eBPF probes for skoop
//!
//! Kernel programs that observe TCP resets:
//! - `trace_sendactive`: kprobe on `tcp_send_active_reset`
//! - `trace_sendreset`: kprobe on `tcp_v4_send_reset`
//! - `trace_rstrx`: tracepoint `tcp:tcp_receive_reset`
//!
//! Each hit is copied into a `TcpResetEvent`, the kernel stack is stored in
//! the `STACKS` map and the record is submitted through the `EVENTS` ring
//! buffer. Probe implementations are in src/bin/

#![cfg_attr(not(test), no_std)]

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
