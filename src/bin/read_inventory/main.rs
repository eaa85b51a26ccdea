//! CLI entry point: read one or more inventory files and print a
//! kept/dropped pollutant summary.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use error_stack::ResultExt;
use thiserror::Error;

use emis_rs::inventory::{read_inventory, render_report, CancellationScope, InventoryFile};
use emis_rs::logging::init_logging;

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read inventory files")]
    Read,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Read and merge ORL/IDA/FF10/COARDS inventory files")]
struct Args {
    /// Inventory files to read; format is auto-detected per file.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Label applied to every file in the summary report.
    #[arg(long, default_value = "default")]
    group: String,

    #[command(flatten)]
    verbosity: Verbosity<clap_verbosity_flag::InfoLevel>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbosity.log_level_filter());

    match driver(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn driver(args: Args) -> error_stack::Result<(), CliError> {
    let files: Vec<InventoryFile> = args.files.iter().map(|p| InventoryFile::new(p.clone(), args.group.clone())).collect();
    let cancel = CancellationScope::new();

    let (records, report) = read_inventory(&files, None, &cancel).change_context(CliError::Read)?;
    log::info!("read {} merged records from {} files", records.len(), report.files_read);
    println!("{}", render_report(&report));

    Ok(())
}
