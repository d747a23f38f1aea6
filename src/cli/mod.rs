pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::model::{NetNodeType, Protocol};

#[derive(Parser)]
#[command(name = "skoop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diagnose Kubernetes network connectivity by simulating the packet path", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to a YAML config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Walk a packet from source to destination and report where it ends")]
    Diagnose(DiagnoseArgs),
    #[command(about = "Resolve a single node and print its links")]
    Resolve(ResolveArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DiagnoseArgs {
    #[arg(short, long, help = "Topology snapshot captured from the cluster")]
    pub snapshot: PathBuf,

    #[arg(long, help = "Source address")]
    pub src: IpAddr,

    #[arg(long, help = "Destination address")]
    pub dst: IpAddr,

    #[arg(long, default_value_t = 80, help = "Destination port")]
    pub dport: u16,

    #[arg(long, default_value = "tcp", help = "Protocol (tcp, udp, icmp)")]
    pub protocol: Protocol,

    #[arg(long, help = "Print the diagnosis as JSON")]
    pub json: bool,

    #[arg(long, help = "Locate pods through the live cluster instead of the snapshot")]
    pub kube: bool,

    #[arg(long, help = "Print resolver metrics after the diagnosis")]
    pub metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    #[arg(short, long, help = "Topology snapshot captured from the cluster")]
    pub snapshot: PathBuf,

    #[arg(short = 't', long = "type", help = "Node type (pod, node, generic, external)")]
    pub node_type: NetNodeType,

    #[arg(long, help = "Node id: a pod address or a node name")]
    pub id: String,
}
