use std::process::ExitCode;

use scopewire::cli::apps::db::DbApp;
use scopewire::{CliBuilder, Entrypoint, Error};

fn main() -> ExitCode {
    let cli = CliBuilder::new(Entrypoint::from_default_env())
        .include_app(DbApp)
        .build();

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cli(err)) => err.exit(),
        Err(err) => {
            eprintln!("Error: {:?}", anyhow::Error::from(err));
            ExitCode::FAILURE
        }
    }
}
