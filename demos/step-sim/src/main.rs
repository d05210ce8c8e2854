use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use log::{error, info, warn};
use manet::driver::SimulationHandle;
use manet::framework::{ProtocolKind, ProtocolParams};
use manet::simulator::Simulator;
use manet::topology::TopologyRecord;
use simplelog::*;
use tokio::fs;

const DIAMOND: &str = include_str!("../diamond.json");

/// Steps an ad hoc network loaded from a topology file and prints every routing table
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// topology json with `nodes` and `links`, a five node diamond if omitted
    topology: Option<PathBuf>,
    /// dsdv, aodv, dsr or olsr
    #[arg(short, long, default_value = "dsdv")]
    protocol: String,
    #[arg(short, long, default_value_t = 30)]
    steps: u64,
    /// pause between steps in milliseconds
    #[arg(short, long, default_value_t = 200)]
    delay: u64,
    /// json file overriding the protocol timings
    #[arg(long)]
    params: Option<PathBuf>,
    /// `from:to:payload`, sent once before the first step
    #[arg(long)]
    send: Vec<String>,
    #[arg(short, long)]
    verbose: bool,
}

async fn load_simulator(args: &Args) -> anyhow::Result<Simulator> {
    let params: ProtocolParams = match &args.params {
        Some(path) => serde_json::from_str(&fs::read_to_string(path).await?)
            .with_context(|| format!("Invalid parameters in {}", path.display()))?,
        None => ProtocolParams::default(),
    };
    let json = match &args.topology {
        Some(path) => fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?,
        None => DIAMOND.to_string(),
    };
    let record = TopologyRecord::from_json(&json)?;
    let simulator = Simulator::from_topology(&record, params)?;
    info!(
        "Loaded {} node(s) and {} link(s)",
        record.nodes.len(),
        record.links.len()
    );
    Ok(simulator)
}

fn print_tables(handle: &SimulationHandle) {
    handle.read(|sim| {
        println!("=== step {} ===", sim.step_count());
        for client in sim.clients() {
            print!("{}", client.routing_data());
            let data = client.current_data();
            if !data.is_empty() {
                print!("received:\n{data}");
            }
            println!();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])?;

    let kind: ProtocolKind = args.protocol.parse().map_err(|e| anyhow!("{e}"))?;
    let mut simulator = load_simulator(&args).await?;
    simulator.initialize_protocol(kind);
    info!("Running {kind} for {} step(s)", args.steps);

    let handle = SimulationHandle::new(simulator);
    for send in &args.send {
        let mut parts = send.splitn(3, ':');
        let (Some(from), Some(to), Some(payload)) = (parts.next(), parts.next(), parts.next()) else {
            warn!("Ignoring malformed message {send}, expected from:to:payload");
            continue;
        };
        handle.write(|sim| sim.send_data(from, to, payload))?;
    }

    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current step");
            stopper.stop();
        }
    });

    handle.start();
    let mut done = 0;
    while done < args.steps && handle.is_running() {
        if let Err(err) = handle.step() {
            error!("Step {done} failed: {err}");
            handle.stop();
            return Err(err.into());
        }
        done += 1;
        tokio::time::sleep(Duration::from_millis(args.delay)).await;
    }
    handle.stop();

    print_tables(&handle);
    info!("Finished after {done} step(s)");
    Ok(())
}
