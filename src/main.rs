//! Commodity Ledger CLI
//!
//! Replays ledger operations from a CSV file and prints the final balance of
//! every customer.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > balances.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `LEDGER_COMMIT_ATTEMPTS`, `LEDGER_MAX_PAGE_SIZE`, `LEDGER_DEFAULT_PAGE_SIZE`:
//!   engine overrides, see [`EngineConfig`]

use commodity_ledger::{EngineConfig, LedgerEngine, LedgerError, OpenDirectory, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(LedgerError::MissingArgument);
    }

    let config = EngineConfig::from_env()?;

    let input_path = &args[1];
    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let engine = LedgerEngine::with_directory(Arc::new(OpenDirectory), config)?;
    engine.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    engine.write_output(handle)?;

    Ok(())
}
