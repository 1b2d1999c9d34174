use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trafficnet_core::{NetworkConfig, Stage};
use trafficnet_scheduler::{Monitor, Pipeline, StageReport};

#[derive(Parser)]
#[command(name = "trafficnet")]
#[command(about = "Signed traffic telemetry ledger and congestion pipeline", long_about = None)]
struct Cli {
    /// Configuration file (TOML or YAML); TRAFFICNET__* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pipeline stage against its upstream ledger
    Run {
        /// telemetry, congestion, managed, ordered, real-time, smart, healed or optimized
        stage: String,
    },

    /// Run every stage in order
    RunAll,

    /// Re-check hash, linkage and signatures of a persisted ledger
    Verify { stage: String },

    /// Produce live blocks into the smart ledger until Ctrl-C
    Monitor {
        /// Stop after this many accepted blocks
        #[arg(long)]
        blocks: Option<usize>,
    },

    /// Print the generated node graph
    Topology,
}

fn print_report(report: &StageReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn parse_stage(name: &str) -> Result<Stage> {
    name.parse::<Stage>().map_err(anyhow::Error::msg)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = NetworkConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let pipeline = Pipeline::open(config).context("opening ledger store")?;

    match cli.command {
        Commands::Run { stage } => {
            let report = pipeline.run(parse_stage(&stage)?)?;
            print_report(&report, cli.json)?;
        }
        Commands::RunAll => {
            for report in pipeline.run_all()? {
                print_report(&report, cli.json)?;
            }
        }
        Commands::Verify { stage } => {
            let report = pipeline.verify(parse_stage(&stage)?)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            if !report.valid {
                bail!("{} ledger failed verification", report.stage);
            }
        }
        Commands::Monitor { blocks } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl-C received, stopping monitor");
                    on_signal.cancel();
                }
            });

            info!("Starting live monitor...");
            let summary = Monitor::new(&pipeline)?.spawn(cancel, blocks).await??;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Monitor stopped: {} blocks, {} rejected, {} outages, {} DDoS, {} redistributions, {} threshold changes",
                    summary.blocks,
                    summary.rejected,
                    summary.outages,
                    summary.ddos,
                    summary.redistributions,
                    summary.threshold_changes
                );
            }
        }
        Commands::Topology => {
            let ctx = pipeline.context().lock();
            if cli.json {
                let nodes: Vec<serde_json::Value> = ctx
                    .registry()
                    .iter()
                    .map(|node| {
                        serde_json::json!({
                            "id": node.id,
                            "capacity": node.capacity,
                            "neighbors": ctx.graph().neighbors(&node.id),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for node in ctx.registry().iter() {
                    let neighbors: Vec<String> = ctx
                        .graph()
                        .neighbors(&node.id)
                        .iter()
                        .map(|l| format!("{} ({:.2})", l.neighbor, l.weight))
                        .collect();
                    println!("{} capacity {:.0} -> {}", node.id, node.capacity, neighbors.join(", "));
                }
            }
        }
    }

    Ok(())
}
