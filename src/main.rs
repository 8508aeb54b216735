mod backup;
mod batch;
mod choices;
mod classifier;
mod cli;
mod config;
mod context;
mod controls;
mod database;
mod error;
mod legacy_date;
mod logging;
mod markers;
mod quickpaste;
mod schema;
mod sequencer;
mod sort_terms;
mod upgrade;
mod upgrade_result;
mod utils;
mod version;

#[cfg(test)]
mod test_support;

use cli::Cli;
use log::{debug, error};

fn main() {
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprint!("{}", err);
        std::process::exit(1);
    }
}
