use scopewire::testing::TestHarness;
use scopewire::{
    bootstrap_with, DiError, DiResult, Entrypoint, Error, ProviderModule, ProviderRegistry, Provision, Resolver,
    Scope, Settings,
};
use serial_test::serial;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

struct LifespanMarker;
struct RequestMarker;

struct MarkerModule(Log);

impl ProviderModule for MarkerModule {
    fn register(&self, registry: &mut ProviderRegistry) -> DiResult<()> {
        let (lifespan_log, request_log) = (self.0.clone(), self.0.clone());
        registry
            .add_scoped(Scope::Lifespan, move |_| {
                let log = lifespan_log.clone();
                async move {
                    Ok(Provision::with_teardown(LifespanMarker, move |_, exit| async move {
                        log.lock().unwrap().push(format!("lifespan:{exit:?}"));
                        Ok(())
                    }))
                }
            })?
            .add_scoped(Scope::Request, move |_| {
                let log = request_log.clone();
                async move {
                    Ok(Provision::with_teardown(RequestMarker, move |_, exit| async move {
                        log.lock().unwrap().push(format!("request:{exit:?}"));
                        Ok(())
                    }))
                }
            })?;
        Ok(())
    }
}

fn marked_entrypoint() -> (Entrypoint, Log) {
    let log = Log::default();
    let container = bootstrap_with(Settings::for_database("app"), &[&MarkerModule(log.clone())]).unwrap();
    (Entrypoint::with_container(container), log)
}

#[tokio::test]
async fn test_body_runs_in_request_nested_in_lifespan() {
    let (entrypoint, log) = marked_entrypoint();

    let scope = entrypoint
        .run(|ctx| async move {
            ctx.get::<LifespanMarker>().await?;
            ctx.get::<RequestMarker>().await?;
            Ok(ctx.scope())
        })
        .await
        .unwrap();

    assert_eq!(scope, Some(Scope::Request));
    // REQUEST closes before LIFESPAN
    assert_eq!(*log.lock().unwrap(), ["request:Completed", "lifespan:Completed"]);
}

#[tokio::test]
async fn test_failing_body_tears_both_scopes_down_as_failed() {
    let (entrypoint, log) = marked_entrypoint();

    let result: Result<(), Error> = entrypoint
        .run(|ctx| async move {
            ctx.get::<RequestMarker>().await?;
            ctx.get::<LifespanMarker>().await?;
            Err(DiError::NotFound("simulated").into())
        })
        .await;

    assert!(matches!(result, Err(Error::Di(DiError::NotFound("simulated")))));
    assert_eq!(*log.lock().unwrap(), ["request:Failed", "lifespan:Failed"]);
}

#[tokio::test]
async fn test_each_run_gets_fresh_scopes() {
    let (entrypoint, log) = marked_entrypoint();

    for _ in 0..2 {
        entrypoint
            .run(|ctx| async move {
                ctx.get::<LifespanMarker>().await?;
                Ok(())
            })
            .await
            .unwrap();
    }
    assert_eq!(
        *log.lock().unwrap(),
        ["lifespan:Completed", "lifespan:Completed"]
    );
}

#[test]
fn test_block_on_outside_a_runtime() {
    let (entrypoint, log) = marked_entrypoint();
    let name = entrypoint
        .block_on(|ctx| async move {
            ctx.get::<RequestMarker>().await?;
            let settings = ctx.get::<Settings>().await?;
            Ok(settings.db.database_name().to_string())
        })
        .unwrap();

    assert_eq!(name, "app");
    assert_eq!(*log.lock().unwrap(), ["request:Completed"]);
}

#[test]
#[serial]
fn test_env_file_entrypoint_loads_settings_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(&path, "DB__NAME=from_file\nDEBUG=false\n").unwrap();

    let previous = std::env::var("DB__NAME").ok();
    std::env::remove_var("DB__NAME");

    let entrypoint = Entrypoint::from_env_file(&path);
    let name = entrypoint.block_on(|ctx| async move {
        let settings = ctx.get::<Settings>().await?;
        Ok(settings.db.database_name().to_string())
    });

    if let Some(value) = previous {
        std::env::set_var("DB__NAME", value);
    }
    assert_eq!(name.unwrap(), "from_file");
}

#[test]
#[serial]
fn test_harness_reads_test_env_file() {
    if std::env::var_os("DB__NAME").is_some() {
        return;
    }
    let harness = TestHarness::new().unwrap();
    assert!(harness.container().contains::<Settings>());
}
