use clap::{Parser, ValueEnum};
use gso_rs::iface::DEFAULT_BUFFER_CAPACITY;
use gso_rs::scenario::{self, ScenarioError, ScenarioRunner, ScenarioSpec};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Builtin {
    /// Pass-through, segmentation, fragmentation, PMTU errors and VXLAN
    Functional,
}

#[derive(Debug, Parser)]
#[command(
    name = "gso-sim",
    about = "Replay a scenario.json through the GSO segmentation engine"
)]
struct Args {
    /// Path to scenario.json
    #[arg(long, required_unless_present = "builtin", conflicts_with = "builtin")]
    scenario: Option<PathBuf>,

    /// Run a built-in scenario instead of a file
    #[arg(long, value_enum)]
    builtin: Option<Builtin>,

    /// Write the full report as JSON
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Buffer capacity for interfaces that do not set one (bytes)
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    buffer_capacity: usize,
}

fn main() -> Result<(), ScenarioError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let spec = match (&args.scenario, args.builtin) {
        (Some(path), _) => ScenarioSpec::from_path(path)?,
        (None, Some(Builtin::Functional)) | (None, None) => scenario::functional()?,
    };

    let report = ScenarioRunner::new(&spec, args.buffer_capacity)?.run(&spec)?;

    for send in &report.sends {
        let label = send.label.as_deref().unwrap_or("-");
        let unit = send
            .unit_size
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "step={} {} -> {} decision={:?} mtu={} unit={} packets={} payload_bytes={} label={}",
            send.step,
            send.ingress,
            send.egress,
            send.decision,
            send.effective_mtu,
            unit,
            send.packets,
            send.payload_bytes,
            label,
        );
    }
    let s = &report.stats;
    println!(
        "stats forwarded={} passed_through={} segmented={} segments_out={} \
         fragmented={} fragments_out={} pmtu_errors={} bytes_out={}",
        s.forwarded_pkts,
        s.passed_through_pkts,
        s.segmented_pkts,
        s.segments_out,
        s.fragmented_pkts,
        s.fragments_out,
        s.pmtu_errors,
        s.bytes_out,
    );

    if let Some(path) = &args.json_out {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).map_err(|source| ScenarioError::Io {
            path: path.clone(),
            source,
        })?;
        println!("wrote report to {}", path.display());
    }
    Ok(())
}
