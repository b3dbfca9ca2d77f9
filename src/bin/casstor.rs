//! Command-line entry point (§4.6): `casstor write <src> <dst>` and
//! `casstor read <src> <dst>`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use casstor::backend::memory_gateway::MemoryGateway;
use casstor::backend::scylla_gateway::ScyllaGateway;
use casstor::backend::Gateway;
use casstor::block_store::BlockStore;
use casstor::chunking::fastcdc_chunk_sizes;
use casstor::config::Config;
use casstor::manifest_store::ManifestStore;
use casstor::{restore_pipeline, store_pipeline, CasstorError};

#[derive(Parser)]
#[command(name = "casstor", about = "Content-addressed, deduplicating file storage client")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Use an in-process backend instead of connecting to CASSTOR_NODES.
    /// Intended for local experimentation; state does not persist.
    #[arg(long, global = true)]
    memory_backend: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, deduplicate and store a file under a destination path.
    Write { src: PathBuf, dst: String },
    /// Reassemble a previously stored path into a local file.
    Read { src: String, dst: PathBuf },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            let code = err
                .downcast_ref::<CasstorError>()
                .map(CasstorError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();

    let runtime = Runtime::new()?;
    let gateway: Arc<dyn Gateway> = if cli.memory_backend {
        Arc::new(MemoryGateway::new())
    } else {
        Arc::new(ScyllaGateway::connect(&config.nodes, runtime.handle().clone())?)
    };

    let block_store = Arc::new(BlockStore::new(Arc::clone(&gateway), &config)?);
    let manifest_store = ManifestStore::new(gateway)?;

    match cli.command {
        Command::Write { src, dst } => {
            let chunk_sizes = fastcdc_chunk_sizes(&src)?;
            let stats = store_pipeline::store_file(
                block_store,
                &manifest_store,
                &config,
                &src,
                &dst,
                chunk_sizes,
            )?;
            println!("{}", stats.report());
        }
        Command::Read { src, dst } => {
            let stats =
                restore_pipeline::restore_file(block_store, &manifest_store, &config, &src, &dst)?;
            println!("{}", stats.report());
        }
    }

    Ok(())
}
