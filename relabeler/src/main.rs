//! Relabeler binary.
//!
//! Relabels every record of the configured store with one of the two pipeline designs and
//! exits with a non-zero status when the run fails.

use clap::{Parser, Subcommand};
use telemetry::init_tracing;
use tracing::error;

use crate::core::{Design, start_relabeler};

mod core;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submits every page as soon as it is read, without bounding in-flight work.
    Loop {
        /// Records per page.
        #[arg(long, allow_hyphen_values = true)]
        page_size: i64,
    },
    /// Feeds pages through a bounded queue drained by one worker per core.
    LoopImproved {
        /// Records per page.
        #[arg(long, allow_hyphen_values = true)]
        page_size: i64,
    },
}

impl Command {
    fn into_parts(self) -> (Design, i64) {
        match self {
            Command::Loop { page_size } => (Design::Unbounded, page_size),
            Command::LoopImproved { page_size } => (Design::Bounded, page_size),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    let (design, page_size) = args.command.into_parts();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if let Err(err) = runtime.block_on(start_relabeler(design, page_size)) {
        error!("relabeler failed: {err:#}");
        return Err(err);
    }

    Ok(())
}
