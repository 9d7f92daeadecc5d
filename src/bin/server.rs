//! Portfolio agent server binary.
//! Run with: cargo run --bin folio-server

use std::process::ExitCode;

use folio_agent::start_folio_agent;

fn main() -> ExitCode {
    start_folio_agent::run()
}
