//! TCP reset probe loader and lifecycle management

use anyhow::{anyhow, Context, Result};
use aya::{
    maps::{MapData, RingBuf, StackTraceMap},
    programs::{KProbe, Program, TracePoint},
    Ebpf,
};
use log::{info, warn};
use skoop_common::TcpResetEvent;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{run_reader, PipelineStats};
use crate::symbolizer::StackSource;
use crate::teardown::{close_all, TeardownError};
use crate::ProbeOptions;

const EVENTS_MAP: &str = "EVENTS";
const STACKS_MAP: &str = "STACKS";

#[derive(Debug, Clone, Copy)]
enum AttachPoint {
    KProbe(&'static str),
    TracePoint(&'static str, &'static str),
}

struct ProbeSpec {
    program: &'static str,
    point: AttachPoint,
    optional: bool,
}

const PROBES: [ProbeSpec; 3] = [
    ProbeSpec {
        program: "trace_sendactive",
        point: AttachPoint::KProbe("tcp_send_active_reset"),
        optional: false,
    },
    ProbeSpec {
        program: "trace_sendreset",
        point: AttachPoint::KProbe("tcp_v4_send_reset"),
        optional: false,
    },
    ProbeSpec {
        program: "trace_rstrx",
        point: AttachPoint::TracePoint("tcp", "tcp_receive_reset"),
        optional: true,
    },
];

type ReaderHandle = JoinHandle<Result<RingBuf<MapData>>>;

/// Kernel stack table shared with the symbolizer
pub struct StackTable(StackTraceMap<MapData>);

impl StackSource for StackTable {
    fn frames(&self, stack_id: u32) -> Option<Vec<u64>> {
        match self.0.get(&stack_id, 0) {
            Ok(trace) => Some(trace.frames().iter().map(|frame| frame.ip).collect()),
            Err(e) => {
                warn!("Stack {} not found: {}", stack_id, e);
                None
            }
        }
    }
}

/// Loaded reset probes plus every map handle they use.
///
/// All of it is released together by [`TcpResetProbe::close`].
pub struct TcpResetProbe {
    bpf: Ebpf,
    /// Programs loaded into the kernel, attached or not
    loaded: Vec<&'static str>,
    events: Option<RingBuf<MapData>>,
    stacks: Option<Arc<StackTable>>,
    reader: Option<ReaderHandle>,
    cancel: CancellationToken,
}

enum Resource {
    Reader(std::result::Result<Result<RingBuf<MapData>>, tokio::task::JoinError>),
    Program(&'static str),
    Events(RingBuf<MapData>),
    Stacks(Arc<StackTable>),
}

impl TcpResetProbe {
    /// Load the reset probes, attach them and take the ring buffer and stack maps.
    ///
    /// On failure every resource opened so far is closed before returning.
    pub fn load(options: &ProbeOptions) -> Result<Self> {
        run_preflight_checks()?;

        info!("Loading TCP reset probes...");
        let bpf = Ebpf::load(aya::include_bytes_aligned!(concat!(
            env!("OUT_DIR"),
            "/tcp_reset"
        )))
        .context("Failed to load eBPF program")?;

        let mut probe = Self {
            bpf,
            loaded: Vec::new(),
            events: None,
            stacks: None,
            reader: None,
            cancel: CancellationToken::new(),
        };

        if let Err(e) = probe.attach_all(options) {
            if let Err(teardown) = probe.release(None) {
                warn!("Cleanup after failed load was incomplete: {}", teardown);
            }
            return Err(e);
        }

        Ok(probe)
    }

    fn attach_all(&mut self, options: &ProbeOptions) -> Result<()> {
        for spec in PROBES
            .iter()
            .filter(|spec| !spec.optional || options.receive_reset)
        {
            self.attach(spec)?;
        }

        let events = self
            .bpf
            .take_map(EVENTS_MAP)
            .ok_or_else(|| anyhow!("{} map not found in eBPF object", EVENTS_MAP))?;
        self.events =
            Some(RingBuf::try_from(events).context("Failed to create RingBuf from EVENTS map")?);

        let stacks = self
            .bpf
            .take_map(STACKS_MAP)
            .ok_or_else(|| anyhow!("{} map not found in eBPF object", STACKS_MAP))?;
        self.stacks = Some(Arc::new(StackTable(
            StackTraceMap::try_from(stacks).context("Failed to open STACKS map")?,
        )));

        Ok(())
    }

    fn attach(&mut self, spec: &ProbeSpec) -> Result<()> {
        let program = self
            .bpf
            .program_mut(spec.program)
            .ok_or_else(|| anyhow!("{} program not found in eBPF object", spec.program))?;
        let loaded = &mut self.loaded;

        match spec.point {
            AttachPoint::KProbe(function) => {
                let kprobe: &mut KProbe = program.try_into()?;
                load_then_attach(
                    kprobe,
                    spec.program,
                    loaded,
                    |p| Ok(p.load()?),
                    |p| {
                        p.attach(function, 0)
                            .with_context(|| format!("Failed to attach kprobe to {}", function))?;
                        Ok(())
                    },
                )?;
                info!("{} attached to {}", spec.program, function);
            }
            AttachPoint::TracePoint(category, name) => {
                let tracepoint: &mut TracePoint = program.try_into()?;
                load_then_attach(
                    tracepoint,
                    spec.program,
                    loaded,
                    |p| Ok(p.load()?),
                    |p| {
                        p.attach(category, name)
                            .with_context(|| format!("Failed to attach to {}:{}", category, name))?;
                        Ok(())
                    },
                )?;
                info!("{} attached to {}:{}", spec.program, category, name);
            }
        }

        Ok(())
    }

    /// Get mutable reference to the Ebpf object for initializing the EbpfLogger.
    pub fn bpf_mut(&mut self) -> &mut Ebpf {
        &mut self.bpf
    }

    /// Stack table for symbolization, shared with the consumer
    pub fn stack_table(&self) -> Option<Arc<StackTable>> {
        self.stacks.clone()
    }

    /// Start the ring buffer reader; decoded events go to `tx`.
    pub fn spawn_reader(
        &mut self,
        tx: mpsc::Sender<TcpResetEvent>,
        stats: Arc<PipelineStats>,
    ) -> Result<()> {
        let ring_buf = self
            .events
            .take()
            .ok_or_else(|| anyhow!("reset event reader already running"))?;
        let cancel = self.cancel.clone();

        self.reader = Some(tokio::spawn(run_reader(ring_buf, tx, stats, cancel)));
        Ok(())
    }

    /// Stop the reader, detach every program and release all maps.
    pub async fn close(mut self) -> std::result::Result<(), TeardownError> {
        info!("Closing TCP reset probes...");
        self.cancel.cancel();

        let reader = match self.reader.take() {
            Some(handle) => Some(handle.await),
            None => None,
        };

        let result = self.release(reader);
        drop(self.bpf);
        info!("TCP reset probes closed");
        result
    }

    fn release(
        &mut self,
        reader: Option<std::result::Result<Result<RingBuf<MapData>>, tokio::task::JoinError>>,
    ) -> std::result::Result<(), TeardownError> {
        let mut resources: Vec<(String, Resource)> = Vec::new();

        if let Some(joined) = reader {
            resources.push(("reader".to_string(), Resource::Reader(joined)));
        }
        if let Some(events) = self.events.take() {
            resources.push((EVENTS_MAP.to_string(), Resource::Events(events)));
        }
        if let Some(stacks) = self.stacks.take() {
            resources.push((STACKS_MAP.to_string(), Resource::Stacks(stacks)));
        }
        for program in self.loaded.drain(..).rev() {
            resources.push((program.to_string(), Resource::Program(program)));
        }

        let bpf = &mut self.bpf;
        close_all(resources, |resource| match resource {
            Resource::Reader(Ok(Ok(ring_buf))) => {
                drop(ring_buf);
                Ok(())
            }
            Resource::Reader(Ok(Err(e))) => Err(e.to_string()),
            Resource::Reader(Err(e)) => Err(e.to_string()),
            Resource::Events(ring_buf) => {
                drop(ring_buf);
                Ok(())
            }
            Resource::Stacks(stacks) => {
                if Arc::strong_count(&stacks) > 1 {
                    warn!("STACKS map still shared; it is released by its last holder");
                }
                drop(stacks);
                Ok(())
            }
            Resource::Program(name) => unload_program(bpf, name),
        })
    }
}

/// A program is recorded as soon as it is loaded, so teardown unloads it
/// even when attaching fails.
fn load_then_attach<P>(
    program: &mut P,
    name: &'static str,
    loaded: &mut Vec<&'static str>,
    load: impl FnOnce(&mut P) -> Result<()>,
    attach: impl FnOnce(&mut P) -> Result<()>,
) -> Result<()> {
    load(program)?;
    loaded.push(name);
    attach(program)
}

fn unload_program(bpf: &mut Ebpf, name: &str) -> std::result::Result<(), String> {
    match bpf.program_mut(name) {
        Some(Program::KProbe(program)) => program.unload().map_err(|e| e.to_string()),
        Some(Program::TracePoint(program)) => program.unload().map_err(|e| e.to_string()),
        Some(_) => Err(format!("{} has an unexpected program type", name)),
        None => Err(format!("{} not found", name)),
    }
}

/// Run pre-flight checks to validate the system can run eBPF programs
fn run_preflight_checks() -> Result<()> {
    info!("Running pre-flight checks...");

    check_kernel_version()?;
    check_btf();
    check_capabilities();

    info!("Pre-flight checks passed");
    Ok(())
}

/// Ring buffers need kernel >= 5.8
fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("Failed to read kernel release")?;
    let release = release.trim();

    let (major, minor) = parse_kernel_release(release)
        .ok_or_else(|| anyhow!("Could not parse kernel version: {}", release))?;

    if (major, minor) < (5, 8) {
        return Err(anyhow!(
            "Kernel {} is too old. Reset tracing requires kernel 5.8+",
            release
        ));
    }

    info!("Kernel version: {} (supported)", release);
    Ok(())
}

fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split(['.', '-']);
    let major = parts.next()?.trim().parse().ok()?;
    let minor = parts.next()?.trim().parse().ok()?;
    Some((major, minor))
}

fn check_btf() {
    if !Path::new("/sys/kernel/btf/vmlinux").exists() {
        warn!("BTF not found at /sys/kernel/btf/vmlinux; tracepoint attach may fail");
    }
}

fn check_capabilities() {
    // SAFETY: geteuid has no preconditions
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        warn!(
            "Not running as root (euid={}). Ensure CAP_BPF, CAP_PERFMON and CAP_SYS_ADMIN are granted.",
            euid
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_attach_still_records_loaded_program() {
        let mut loaded = Vec::new();
        let mut program = 0u32;

        let result = load_then_attach(
            &mut program,
            "trace_sendreset",
            &mut loaded,
            |p| {
                *p += 1;
                Ok(())
            },
            |_| Err(anyhow!("tcp_v4_send_reset not found")),
        );
        assert!(result.is_err());
        assert_eq!(program, 1);
        assert_eq!(loaded, vec!["trace_sendreset"]);

        let result = load_then_attach(
            &mut program,
            "trace_rstrx",
            &mut loaded,
            |_| Err(anyhow!("verifier rejected program")),
            |_| Ok(()),
        );
        assert!(result.is_err());
        assert_eq!(loaded, vec!["trace_sendreset"]);
    }

    #[test]
    fn test_parse_kernel_release() {
        assert_eq!(parse_kernel_release("5.15.0-91-generic"), Some((5, 15)));
        assert_eq!(parse_kernel_release("6.1"), Some((6, 1)));
        assert_eq!(parse_kernel_release("garbage"), None);
    }
}
