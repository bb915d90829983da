use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::Command;

use super::CliApp;
use crate::entrypoint::Entrypoint;
use crate::error::Result;

/// Collects [`CliApp`] groups into a [`Cli`].
///
/// # Examples
///
/// ```rust
/// use scopewire::cli::apps::db::DbApp;
/// use scopewire::{CliBuilder, Entrypoint};
///
/// let cli = CliBuilder::new(Entrypoint::from_env_file(".env.missing"))
///     .include_app(DbApp)
///     .build();
///
/// let names: Vec<_> = cli.command().get_subcommands().map(|c| c.get_name().to_string()).collect();
/// assert_eq!(names, ["db"]);
/// ```
pub struct CliBuilder {
    entrypoint: Entrypoint,
    apps: Vec<Box<dyn CliApp>>,
}

impl CliBuilder {
    pub fn new(entrypoint: Entrypoint) -> Self {
        Self {
            entrypoint,
            apps: Vec::new(),
        }
    }

    pub fn include_app(mut self, app: impl CliApp + 'static) -> Self {
        self.apps.push(Box::new(app));
        self
    }

    pub fn include_apps(mut self, apps: impl IntoIterator<Item = Box<dyn CliApp>>) -> Self {
        self.apps.extend(apps);
        self
    }

    pub fn build(self) -> Cli {
        let mut command = Command::new(env!("CARGO_PKG_NAME"))
            .version(env!("CARGO_PKG_VERSION"))
            .about(env!("CARGO_PKG_DESCRIPTION"))
            .subcommand_required(true)
            .arg_required_else_help(true);
        for app in &self.apps {
            command = command.subcommand(app.command());
        }
        Cli {
            command,
            apps: self.apps,
            entrypoint: self.entrypoint,
        }
    }
}

/// The assembled root command.
pub struct Cli {
    command: Command,
    apps: Vec<Box<dyn CliApp>>,
    entrypoint: Entrypoint,
}

impl Cli {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn entrypoint(&self) -> &Entrypoint {
        &self.entrypoint
    }

    /// Parses the process arguments and dispatches.
    pub fn run(&self) -> Result<()> {
        self.run_from(std::env::args_os())
    }

    /// Parses `args` (program name first) and dispatches to the matching group.
    pub fn run_from<I, T>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.clone().try_get_matches_from(args)?;
        let Some((name, sub_matches)) = matches.subcommand() else {
            return Err(self
                .command
                .clone()
                .error(ErrorKind::MissingSubcommand, "a command is required")
                .into());
        };

        let app = self
            .apps
            .iter()
            .find(|app| app.command().get_name() == name)
            .ok_or_else(|| {
                self.command
                    .clone()
                    .error(ErrorKind::InvalidSubcommand, format!("unknown command {name}"))
            })?;
        tracing::debug!(command = name, "dispatching");
        app.dispatch(&self.entrypoint, sub_matches)
    }
}
