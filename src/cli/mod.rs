//! Command-line surface.
//!
//! A [`Cli`] is a clap root command assembled from [`CliApp`] groups by the
//! [`CliBuilder`]. Each group owns its clap definition and decides how to run
//! a parsed invocation, usually through [`Entrypoint::block_on`].

use clap::{ArgMatches, Command};

use crate::entrypoint::Entrypoint;
use crate::error::Result;

pub mod apps;
pub mod builder;

pub use builder::{Cli, CliBuilder};

/// A named group of sub-commands, such as `db`.
pub trait CliApp: Send + Sync {
    /// The group's clap definition. Its name is the group's sub-command name.
    fn command(&self) -> Command;

    /// Runs a parsed invocation of this group.
    fn dispatch(&self, entrypoint: &Entrypoint, matches: &ArgMatches) -> Result<()>;
}
