//! skoop-agent - TCP reset capture for connectivity diagnosis
//!
//! The agent runs on each Kubernetes node and:
//! - Loads the TCP reset probes into the kernel
//! - Streams reset events out of the ring buffer
//! - Symbolizes the kernel stack of every reset
//! - Logs each reset so it can be matched against a simulated diagnosis

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "skoop-agent")]
#[command(version)]
#[command(about = "Capture TCP resets with kernel stacks", long_about = None)]
struct Args {
    /// Also trace resets received from peers
    #[arg(long)]
    receive_reset: bool,

    /// Skip kernel stack symbolization
    #[arg(long)]
    no_symbolize: bool,

    /// Reader -> consumer channel capacity
    #[arg(long, default_value_t = 4096)]
    channel_capacity: usize,
}

impl Args {
    fn probe_options(&self) -> skoop_agent::ProbeOptions {
        skoop_agent::ProbeOptions {
            receive_reset: self.receive_reset,
            symbolize: !self.no_symbolize,
            channel_capacity: self.channel_capacity.max(1),
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn main() -> Result<()> {
    let _ = Args::parse().probe_options();
    eprintln!("Error: skoop-agent requires Linux to run eBPF programs");
    std::process::exit(1);
}

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> Result<()> {
    use aya_log::EbpfLogger;
    use log::{info, warn};
    use skoop_agent::pipeline::{run_consumer, PipelineStats};
    use skoop_agent::probe_loader::TcpResetProbe;
    use skoop_agent::symbolizer::{KernelSymbols, StackSource, Symbolizer};
    use std::sync::Arc;
    use tokio::signal;
    use tokio::sync::mpsc;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = Args::parse().probe_options();
    info!("skoop-agent starting with {:?}", options);

    let mut probe = TcpResetProbe::load(&options)?;

    if let Err(e) = EbpfLogger::init(probe.bpf_mut()) {
        warn!(
            "Failed to initialize EbpfLogger: {}. eBPF probe logs will not be visible.",
            e
        );
    }

    let symbolizer = if options.symbolize {
        let symbols = match KernelSymbols::load() {
            Ok(symbols) => Some(symbols),
            Err(e) => {
                warn!("{:#}; stacks will show raw addresses", e);
                None
            }
        };
        let stacks = probe
            .stack_table()
            .map(|table| table as Arc<dyn StackSource>);
        Symbolizer::new(stacks, symbols)
    } else {
        Symbolizer::default()
    };

    let (tx, rx) = mpsc::channel(options.channel_capacity);
    let stats = Arc::new(PipelineStats::new());
    probe.spawn_reader(tx, stats.clone())?;
    let consumer = tokio::spawn(run_consumer(rx, symbolizer, None));

    info!("skoop-agent running. Press Ctrl+C to exit.");
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Closing the probe stops the reader, which closes the channel and ends the consumer.
    let closed = probe.close().await;
    let handled = consumer.await.unwrap_or_default();

    info!(
        "Handled {} reset events (received={}, dropped={}, malformed={})",
        handled,
        stats.received(),
        stats.dropped(),
        stats.malformed()
    );

    closed?;
    info!("skoop-agent stopped");
    Ok(())
}
