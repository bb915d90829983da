use axum::extract::Json;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use scopewire::testing::{read_json, TestHarness};
use scopewire::{
    bootstrap, ApiError, BoxError, Container, Engine, Error, Inject, Provision, Resolver, Scope, ScopeExit,
    ScopeGuard, Session, Settings,
};
use serde_json::json;
use std::sync::Arc;

fn sqlite_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display())
}

/// The production container, with only the engine pointed at SQLite.
fn production_on_sqlite(url: String) -> (Container, scopewire::OverrideGuard) {
    let container = bootstrap(Settings::for_database("unused")).unwrap();
    let guard = container.override_scoped(Scope::Lifespan, move |_| {
        let url = url.clone();
        async move {
            let engine = Engine::connect_lazy(&url)?;
            Ok::<_, BoxError>(Provision::with_teardown(engine, |engine, _| async move {
                engine.close().await;
                Ok(())
            }))
        }
    });
    (container, guard)
}

async fn execute(lifespan: &ScopeGuard, sql: &'static str, fail: bool) -> Result<(), Error> {
    lifespan
        .handle()
        .enter(Scope::Request)?
        .run(|ctx| async move {
            let session = ctx.get::<Session>().await?;
            sqlx::query(sql).execute(&mut *session.connection().await?).await?;
            if fail {
                return Err(Error::Io(std::io::Error::other("handler failed")));
            }
            Ok(())
        })
        .await
}

async fn count_notes(lifespan: &ScopeGuard) -> Result<i64, Error> {
    lifespan
        .handle()
        .enter(Scope::Request)?
        .run(|ctx| async move {
            let session = ctx.get::<Session>().await?;
            let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notes")
                .fetch_one(&mut *session.connection().await?)
                .await?;
            Ok(count)
        })
        .await
}

#[tokio::test]
async fn test_session_commits_on_success_and_rolls_back_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _engine) = production_on_sqlite(sqlite_url(&dir));
    let lifespan = container.enter(Scope::Lifespan);

    execute(&lifespan, "CREATE TABLE notes (body TEXT NOT NULL)", false).await.unwrap();
    execute(&lifespan, "INSERT INTO notes (body) VALUES ('kept')", false).await.unwrap();

    let failed = execute(&lifespan, "INSERT INTO notes (body) VALUES ('discarded')", true).await;
    assert!(matches!(failed, Err(Error::Io(_))));

    assert_eq!(count_notes(&lifespan).await.unwrap(), 1);
    lifespan.close(ScopeExit::Completed).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_get_distinct_sessions_on_one_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _engine) = production_on_sqlite(sqlite_url(&dir));
    let lifespan = container.enter(Scope::Lifespan);

    let first = lifespan.handle().enter(Scope::Request).unwrap();
    let second = lifespan.handle().enter(Scope::Request).unwrap();
    let (a, b) = tokio::join!(first.get::<Session>(), second.get::<Session>());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(a.engine(), b.engine()));
    assert!(Arc::ptr_eq(a.engine(), &lifespan.get::<Engine>().await.unwrap()));

    first.close(ScopeExit::Completed).await.unwrap();
    second.close(ScopeExit::Completed).await.unwrap();
    assert!(!a.is_active().await);

    let engine = a.engine().clone();
    lifespan.close(ScopeExit::Completed).await.unwrap();
    assert!(engine.is_closed());
}

#[tokio::test]
async fn test_harness_session_is_shared_and_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url(&dir);

    {
        let harness = TestHarness::with_settings(Settings::for_database("unused"))
            .unwrap()
            .use_database_url(url.clone());
        let lifespan = harness.container().enter(Scope::Lifespan);

        execute(&lifespan, "CREATE TABLE notes (body TEXT NOT NULL)", false).await.unwrap();
        execute(&lifespan, "INSERT INTO notes (body) VALUES ('visible')", false).await.unwrap();
        // a failing request does not end the shared transaction
        execute(&lifespan, "INSERT INTO notes (body) VALUES ('also visible')", true).await.unwrap_err();
        assert_eq!(count_notes(&lifespan).await.unwrap(), 2);

        lifespan.close(ScopeExit::Completed).await.unwrap();
    }

    let harness = TestHarness::with_settings(Settings::for_database("unused"))
        .unwrap()
        .use_database_url(url);
    let lifespan = harness.container().enter(Scope::Lifespan);
    let leftover: Result<i64, Error> = lifespan
        .handle()
        .enter(Scope::Request)
        .unwrap()
        .run(|ctx| async move {
            let session = ctx.get::<Session>().await?;
            let tables = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'notes'",
            )
            .fetch_one(&mut *session.connection().await?)
            .await?;
            Ok(tables)
        })
        .await;
    assert_eq!(leftover.unwrap(), 0);
    lifespan.close(ScopeExit::Completed).await.unwrap();
}

async fn list_notes(Inject(session): Inject<Session>) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = session.connection().await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS notes (body TEXT NOT NULL)")
        .execute(&mut *conn)
        .await?;
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notes")
        .fetch_one(&mut *conn)
        .await?;
    Ok(Json(json!({ "count": count })))
}

async fn add_note(Inject(session): Inject<Session>) -> Result<StatusCode, ApiError> {
    let mut conn = session.connection().await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS notes (body TEXT NOT NULL)")
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO notes (body) VALUES ('from http')")
        .execute(&mut *conn)
        .await?;
    Ok(StatusCode::CREATED)
}

#[tokio::test]
async fn test_handlers_share_the_test_session() {
    let dir = tempfile::tempdir().unwrap();
    let harness = TestHarness::with_settings(Settings::for_database("unused"))
        .unwrap()
        .use_database_url(sqlite_url(&dir));
    let app = harness
        .app([Router::new().route("/notes", get(list_notes).post(add_note))])
        .await
        .unwrap();

    let created = app.post_json("/notes", &json!({})).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let body = read_json(app.get("/notes").await.unwrap()).await.unwrap();
    assert_eq!(body, json!({ "count": 1 }));

    app.shutdown().await.unwrap();
}
