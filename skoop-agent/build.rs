use anyhow::{anyhow, Context};
use std::env;

const PROBE_PACKAGE: &str = "skoop-probes";
const PROBE_BINARY: &str = "tcp_reset";

fn main() -> anyhow::Result<()> {
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default() == "bpf" {
        return Ok(());
    }

    if env::consts::OS != "linux" {
        println!(
            "cargo:warning=TCP reset probes are Linux only; skipping eBPF build on {}",
            env::consts::OS
        );
        return Ok(());
    }

    // CI runners have no bpf-linker
    if env::var("CI").is_ok() {
        println!("cargo:warning=Skipping {} build in CI", PROBE_PACKAGE);
        return Ok(());
    }

    let aya_build::cargo_metadata::Metadata { packages, .. } =
        aya_build::cargo_metadata::MetadataCommand::new()
            .no_deps()
            .exec()
            .context("MetadataCommand::exec")?;

    let probes = packages
        .into_iter()
        .find(|pkg| pkg.name == PROBE_PACKAGE)
        .ok_or_else(|| anyhow!("{} package not found in workspace", PROBE_PACKAGE))?;

    aya_build::build_ebpf([probes])?;

    let object = format!("{}/{}", env::var("OUT_DIR")?, PROBE_BINARY);
    if !std::path::Path::new(&object).exists() {
        return Err(anyhow!("reset probe object missing after build: {}", object));
    }

    Ok(())
}
