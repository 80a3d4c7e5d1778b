use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use quorum::{Cluster, FileStorage, MemoryStorage, NodeConfig, Storage};
use tracing_subscriber::EnvFilter;

/// Run an in-process Paxos cluster: node n0 proposes a value and every
/// learner must report the same chosen value.
#[derive(Parser)]
struct Args {
    /// Number of nodes in the cluster.
    #[arg(long, default_value_t = 5)]
    nodes: usize,

    /// The value node n0 proposes.
    #[arg(long, default_value = "hello")]
    value: String,

    /// Directory for durable acceptor state, one subdirectory per node.
    /// Without it, state is in-memory and lost on exit.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.nodes == 0 {
        return Err("--nodes must be at least 1".into());
    }

    let storages: Vec<Box<dyn Storage>> = match &args.data_dir {
        Some(dir) => (0..args.nodes)
            .map(|i| {
                FileStorage::open(&dir.join(format!("n{i}")))
                    .map(|storage| Box::new(storage) as Box<dyn Storage>)
            })
            .collect::<Result<_, _>>()?,
        None => (0..args.nodes)
            .map(|_| Box::new(MemoryStorage::new()) as Box<dyn Storage>)
            .collect(),
    };

    let cluster = Cluster::with_storages(storages, NodeConfig::default())?;
    cluster.start();

    let chosen = cluster.node(0).propose(args.value.clone().into_bytes())?;
    println!(
        "n0 proposed {:?}; the cluster chose {:?}",
        args.value,
        String::from_utf8_lossy(&chosen)
    );

    let mut agreed = true;
    for node in cluster.nodes() {
        match node
            .learner()
            .wait_for_chosen_timeout(Duration::from_secs(2))
        {
            Some(report) => {
                println!(
                    "{}: chose {:?} at {}",
                    node.id(),
                    String::from_utf8_lossy(&report.value),
                    report.proposal
                );
                agreed &= report.value == chosen;
            }
            None => {
                println!("{}: never learned a chosen value", node.id());
                agreed = false;
            }
        }
    }

    cluster.stop();

    if !agreed {
        return Err("cluster disagreed on the chosen value".into());
    }
    Ok(())
}
