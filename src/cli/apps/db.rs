//! `db` command group: create and drop the configured database.
//!
//! Both commands run through the [`Entrypoint`], so the database admin and the
//! confirmation prompt are resolved from the container and can be overridden
//! in tests. Admin statements use one unpooled autocommit connection to the
//! `template1` maintenance database.

use async_trait::async_trait;
use clap::{ArgMatches, Command, FromArgMatches, Subcommand};
use console::style;
use sqlx::{Connection, Executor, PgConnection};

use crate::cli::CliApp;
use crate::collection::{ProviderModule, ProviderRegistry};
use crate::entrypoint::Entrypoint;
use crate::error::{BoxError, DiResult, Result};
use crate::provider::ResolverContext;
use crate::registration::Provision;
use crate::settings::Settings;
use crate::traits::Resolver;

/// Maintenance database admin statements connect to.
pub const MAINTENANCE_DATABASE: &str = "template1";

const DUPLICATE_DATABASE: &str = "42P04";
const INVALID_CATALOG_NAME: &str = "3D000";

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum DbCommand {
    /// Create the database (defaults to DB__NAME)
    Create { database_name: Option<String> },
    /// Drop the database (defaults to DB__NAME)
    Drop {
        database_name: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// What `CREATE DATABASE` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// What `DROP DATABASE` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    Missing,
}

/// Creates and drops databases.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn create_database(&self, name: &str) -> Result<CreateOutcome, sqlx::Error>;
    async fn drop_database(&self, name: &str) -> Result<DropOutcome, sqlx::Error>;
}

/// Yes/no confirmation.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn confirm(&self, message: &str) -> std::io::Result<bool>;
}

/// PostgreSQL admin over a single maintenance connection.
pub struct PgAdmin {
    url: String,
}

impl PgAdmin {
    /// `url` must point at the maintenance database.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.db.url(Some(MAINTENANCE_DATABASE))?))
    }

    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error> {
        let mut conn = PgConnection::connect(&self.url).await?;
        let result = Executor::execute(&mut conn, statement).await.map(|_| ());
        if let Err(err) = conn.close().await {
            tracing::warn!(error = %err, "failed to close maintenance connection");
        }
        result
    }
}

#[async_trait]
impl DatabaseAdmin for PgAdmin {
    async fn create_database(&self, name: &str) -> Result<CreateOutcome, sqlx::Error> {
        match self.execute(&format!("CREATE DATABASE {}", quote_ident(name))).await {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(err) if sqlstate(&err).as_deref() == Some(DUPLICATE_DATABASE) => Ok(CreateOutcome::AlreadyExists),
            Err(err) => Err(err),
        }
    }

    async fn drop_database(&self, name: &str) -> Result<DropOutcome, sqlx::Error> {
        match self.execute(&format!("DROP DATABASE {}", quote_ident(name))).await {
            Ok(()) => Ok(DropOutcome::Dropped),
            Err(err) if sqlstate(&err).as_deref() == Some(INVALID_CATALOG_NAME) => Ok(DropOutcome::Missing),
            Err(err) => Err(err),
        }
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Terminal prompt defaulting to "no".
pub struct TerminalPrompt;

#[async_trait]
impl Prompt for TerminalPrompt {
    async fn confirm(&self, message: &str) -> std::io::Result<bool> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(message)
                .default(false)
                .interact()
                .map_err(std::io::Error::from)
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

/// Registers the production [`DatabaseAdmin`] and [`Prompt`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DbAdminModule;

impl ProviderModule for DbAdminModule {
    fn register(&self, registry: &mut ProviderRegistry) -> DiResult<()> {
        registry
            .add_transient(|ctx: ResolverContext| async move {
                let settings = ctx.get::<Settings>().await?;
                let admin: Box<dyn DatabaseAdmin> = Box::new(PgAdmin::from_settings(&settings)?);
                Ok::<_, BoxError>(Provision::new(admin))
            })?
            .add_transient(|_| async {
                let prompt: Box<dyn Prompt> = Box::new(TerminalPrompt);
                Ok(Provision::new(prompt))
            })?;
        Ok(())
    }
}

/// Result of one `db` command, rendered by [`DbReport::print`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbReport {
    Created(String),
    AlreadyExists(String),
    Dropped(String),
    Missing(String),
    Cancelled(String),
}

impl DbReport {
    /// The line printed for this report, if any.
    pub fn message(&self) -> Option<String> {
        match self {
            DbReport::Created(name) => Some(format!("\"{name}\" database has been successfully created.")),
            DbReport::AlreadyExists(name) => Some(format!("\"{name}\" database already exists.")),
            DbReport::Dropped(name) => Some(format!("\"{name}\" database has been successfully deleted.")),
            DbReport::Missing(name) => Some(format!("\"{name}\" database doesn't exist.")),
            DbReport::Cancelled(_) => None,
        }
    }

    /// Whether the command changed anything.
    pub fn is_success(&self) -> bool {
        matches!(self, DbReport::Created(_) | DbReport::Dropped(_))
    }

    pub fn print(&self) {
        let Some(message) = self.message() else {
            return;
        };
        if self.is_success() {
            println!("{}", style(message).green().bold());
        } else {
            println!("{}", style(message).yellow().bold());
        }
    }
}

/// Runs `command` with providers from `ctx`.
///
/// The admin is resolved only once the command is committed to running, so a
/// declined drop never touches the database.
pub async fn execute(ctx: &ResolverContext, command: DbCommand) -> Result<DbReport> {
    let settings = ctx.get::<Settings>().await?;
    let resolve_name = |name: Option<String>| name.unwrap_or_else(|| settings.db.database_name().to_string());

    match command {
        DbCommand::Create { database_name } => {
            let name = resolve_name(database_name);
            let admin = ctx.get::<Box<dyn DatabaseAdmin>>().await?;
            let report = match admin.create_database(&name).await? {
                CreateOutcome::Created => DbReport::Created(name),
                CreateOutcome::AlreadyExists => DbReport::AlreadyExists(name),
            };
            Ok(report)
        }
        DbCommand::Drop { database_name, yes } => {
            let name = resolve_name(database_name);
            if !yes {
                let prompt = ctx.get::<Box<dyn Prompt>>().await?;
                let question = format!("Are you sure you want to delete \"{name}\" database?");
                if !prompt.confirm(&question).await? {
                    return Ok(DbReport::Cancelled(name));
                }
            }
            let admin = ctx.get::<Box<dyn DatabaseAdmin>>().await?;
            let report = match admin.drop_database(&name).await? {
                DropOutcome::Dropped => DbReport::Dropped(name),
                DropOutcome::Missing => DbReport::Missing(name),
            };
            Ok(report)
        }
    }
}

/// The `db` group.
#[derive(Debug, Default, Clone, Copy)]
pub struct DbApp;

impl CliApp for DbApp {
    fn command(&self) -> Command {
        let group = Command::new("db")
            .about("Manage the application database")
            .subcommand_required(true)
            .arg_required_else_help(true);
        DbCommand::augment_subcommands(group)
    }

    fn dispatch(&self, entrypoint: &Entrypoint, matches: &ArgMatches) -> Result<()> {
        let command = DbCommand::from_arg_matches(matches)?;
        let report = entrypoint.block_on(|ctx| async move { execute(&ctx, command).await })?;
        report.print();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("app"), "\"app\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_parse_drop_flags() {
        let matches = DbApp.command().try_get_matches_from(["db", "drop", "other", "-y"]).unwrap();
        assert_eq!(
            DbCommand::from_arg_matches(&matches).unwrap(),
            DbCommand::Drop {
                database_name: Some("other".into()),
                yes: true
            }
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            DbReport::Created("app".into()).message().unwrap(),
            "\"app\" database has been successfully created."
        );
        assert_eq!(
            DbReport::Missing("app".into()).message().unwrap(),
            "\"app\" database doesn't exist."
        );
        assert_eq!(DbReport::Cancelled("app".into()).message(), None);
    }
}
