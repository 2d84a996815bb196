//! `ovn-lab-builder`: build and destroy OVN virtual lab topologies from a
//! JSON specification.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ovnlab_builder::ovsdb::DEFAULT_TIMEOUT;
use ovnlab_builder::{Endpoints, LabReconciler, OvsdbClient, OVN_NB_DB, OVN_SB_DB};
use ovnlab_core::LabConfig;
use ovnlab_topology::Topology;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ovn-lab-builder")]
#[command(about = "Create and destroy OVN virtual lab topologies")]
#[command(version)]
struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an OVN virtual lab topology from a configuration file
    Build(LabArgs),
    /// Destroy an OVN virtual lab topology defined in a configuration file
    Destroy(LabArgs),
}

#[derive(Args)]
struct LabArgs {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Directory containing OVN socket files
    #[arg(short, long)]
    socket_dir: Option<PathBuf>,
}

impl LabArgs {
    fn check_paths(&self) -> Result<()> {
        if !self.config.is_file() {
            bail!(
                "configuration file {} does not exist or is not a file",
                self.config.display()
            );
        }
        if let Some(dir) = &self.socket_dir {
            if !dir.is_dir() {
                bail!(
                    "socket directory {} does not exist or is not a directory",
                    dir.display()
                );
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log_level, cli.json_logs) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level `{level}`"))?;

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Everything a subcommand needs, with both database sessions held open
/// for the duration of the run.
struct Session {
    config: LabConfig,
    topology: Topology,
    reconciler: LabReconciler<OvsdbClient>,
    _southbound: OvsdbClient,
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build(args) => {
            args.check_paths()?;
            let session = prepare(&args).await?;
            session
                .reconciler
                .build(&session.topology)
                .await
                .context("failed to build topology")?;
            println!("Topology '{}' successfully built", session.config.vpc.name);
        }
        Commands::Destroy(args) => {
            args.check_paths()?;
            let session = prepare(&args).await?;
            session
                .reconciler
                .destroy(&session.topology)
                .await
                .context("failed to destroy topology")?;
            println!(
                "Topology '{}' successfully destroyed",
                session.config.vpc.name
            );
        }
    }
    Ok(())
}

async fn prepare(args: &LabArgs) -> Result<Session> {
    let config = LabConfig::from_path(&args.config)?;
    let topology = Topology::derive(&config);

    let endpoints = Endpoints::from_socket_dir(args.socket_dir.as_deref());
    let nb = OvsdbClient::connect(&endpoints.northbound, OVN_NB_DB, DEFAULT_TIMEOUT)
        .await
        .context("failed to connect to the northbound database")?;

    // A misconfigured socket directory should fail before any northbound
    // changes are made.
    let sb = OvsdbClient::connect(&endpoints.southbound, OVN_SB_DB, DEFAULT_TIMEOUT)
        .await
        .context("failed to connect to the southbound database")?;

    Ok(Session {
        config,
        topology,
        reconciler: LabReconciler::new(nb),
        _southbound: sb,
    })
}
