//! # photo-cluster CLI
//!
//! Command-line interface for the near-duplicate clustering engine.
//!
//! ## Usage
//! ```bash
//! photo-cluster --items items.ndjson --similarity sim.ndjson --run run.json
//! photo-cluster probe --items items.ndjson --out reports
//! ```

mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    photo_cluster::init_tracing();
    cli::run()
}
