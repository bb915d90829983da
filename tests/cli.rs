use async_trait::async_trait;
use clap::error::ErrorKind;
use scopewire::cli::apps::db::{
    execute, CreateOutcome, DatabaseAdmin, DbApp, DbCommand, DbReport, DropOutcome, Prompt,
};
use scopewire::testing::TestHarness;
use scopewire::{CliBuilder, Entrypoint, Error, Settings};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeServer {
    databases: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

struct FakeAdmin(Arc<FakeServer>);

#[async_trait]
impl DatabaseAdmin for FakeAdmin {
    async fn create_database(&self, name: &str) -> Result<CreateOutcome, sqlx::Error> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.databases.lock().unwrap().insert(name.to_string()) {
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    async fn drop_database(&self, name: &str) -> Result<DropOutcome, sqlx::Error> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.databases.lock().unwrap().remove(name) {
            Ok(DropOutcome::Dropped)
        } else {
            Ok(DropOutcome::Missing)
        }
    }
}

struct ScriptedPrompt {
    answer: bool,
    asked: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn confirm(&self, message: &str) -> std::io::Result<bool> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.answer)
    }
}

struct Fixture {
    harness: TestHarness,
    server: Arc<FakeServer>,
    asked: Arc<Mutex<Vec<String>>>,
}

fn fixture(answer: bool) -> Fixture {
    let server = Arc::new(FakeServer::default());
    let asked = Arc::new(Mutex::new(Vec::new()));

    let harness = TestHarness::with_settings(Settings::for_database("app")).unwrap();
    let admin: Box<dyn DatabaseAdmin> = Box::new(FakeAdmin(server.clone()));
    let prompt: Box<dyn Prompt> = Box::new(ScriptedPrompt {
        answer,
        asked: asked.clone(),
    });
    let admin_guard = harness.container().override_constant(admin);
    let prompt_guard = harness.container().override_constant(prompt);

    Fixture {
        harness: harness.keep(admin_guard).keep(prompt_guard),
        server,
        asked,
    }
}

async fn run(entrypoint: &Entrypoint, command: DbCommand) -> DbReport {
    entrypoint
        .run(|ctx| async move { execute(&ctx, command).await })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_twice_reports_existing() {
    let fx = fixture(true);
    let entrypoint = fx.harness.entrypoint();

    let first = run(&entrypoint, DbCommand::Create { database_name: None }).await;
    let second = run(&entrypoint, DbCommand::Create { database_name: None }).await;

    assert_eq!(first, DbReport::Created("app".into()));
    assert_eq!(second, DbReport::AlreadyExists("app".into()));
    assert_eq!(
        second.message().unwrap(),
        "\"app\" database already exists."
    );
    assert_eq!(fx.server.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_explicit_name_wins() {
    let fx = fixture(true);
    let report = run(
        &fx.harness.entrypoint(),
        DbCommand::Create {
            database_name: Some("other".into()),
        },
    )
    .await;
    assert_eq!(report, DbReport::Created("other".into()));
    assert!(fx.server.databases.lock().unwrap().contains("other"));
}

#[tokio::test]
async fn test_declined_drop_never_touches_the_server() {
    let fx = fixture(false);
    fx.server.databases.lock().unwrap().insert("app".into());

    let report = run(
        &fx.harness.entrypoint(),
        DbCommand::Drop {
            database_name: None,
            yes: false,
        },
    )
    .await;

    assert_eq!(report, DbReport::Cancelled("app".into()));
    assert_eq!(report.message(), None);
    assert_eq!(fx.server.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        *fx.asked.lock().unwrap(),
        ["Are you sure you want to delete \"app\" database?"]
    );
}

#[tokio::test]
async fn test_confirmed_drop_and_missing_database() {
    let fx = fixture(true);
    fx.server.databases.lock().unwrap().insert("app".into());
    let entrypoint = fx.harness.entrypoint();
    let drop = || DbCommand::Drop {
        database_name: None,
        yes: false,
    };

    assert_eq!(run(&entrypoint, drop()).await, DbReport::Dropped("app".into()));
    assert_eq!(run(&entrypoint, drop()).await, DbReport::Missing("app".into()));
    assert_eq!(fx.asked.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_drop_then_create_reports_each_command_outcome() {
    let fx = fixture(true);
    let entrypoint = fx.harness.entrypoint();
    let drop = DbCommand::Drop {
        database_name: None,
        yes: true,
    };

    assert_eq!(run(&entrypoint, drop.clone()).await, DbReport::Missing("app".into()));
    assert_eq!(
        run(&entrypoint, DbCommand::Create { database_name: None }).await,
        DbReport::Created("app".into())
    );
    assert_eq!(run(&entrypoint, drop).await, DbReport::Dropped("app".into()));
}

#[tokio::test]
async fn test_yes_flag_skips_prompt() {
    let fx = fixture(false);
    fx.server.databases.lock().unwrap().insert("app".into());

    let report = run(
        &fx.harness.entrypoint(),
        DbCommand::Drop {
            database_name: None,
            yes: true,
        },
    )
    .await;

    assert_eq!(report, DbReport::Dropped("app".into()));
    assert!(fx.asked.lock().unwrap().is_empty());
}

#[test]
fn test_cli_dispatches_to_db_group() {
    let fx = fixture(true);
    let cli = CliBuilder::new(fx.harness.entrypoint()).include_app(DbApp).build();

    cli.run_from(["scopewire", "db", "create"]).unwrap();
    cli.run_from(["scopewire", "db", "drop", "--yes"]).unwrap();

    assert_eq!(fx.server.calls.load(Ordering::SeqCst), 2);
    assert!(fx.server.databases.lock().unwrap().is_empty());
}

#[test]
fn test_help_and_usage_errors_need_no_settings() {
    let dir = tempfile::tempdir().unwrap();
    let cli = CliBuilder::new(Entrypoint::from_env_file(dir.path().join(".env")))
        .include_app(DbApp)
        .build();

    let kind = |args: &[&str]| match cli.run_from(args.iter().copied()) {
        Err(Error::Cli(err)) => err.kind(),
        other => panic!("expected a clap error, got {other:?}"),
    };

    assert_eq!(kind(&["scopewire", "--help"]), ErrorKind::DisplayHelp);
    assert_eq!(kind(&["scopewire", "db", "--help"]), ErrorKind::DisplayHelp);
    assert_eq!(
        kind(&["scopewire"]),
        ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    );
    assert_eq!(kind(&["scopewire", "db", "frobnicate"]), ErrorKind::InvalidSubcommand);
}
