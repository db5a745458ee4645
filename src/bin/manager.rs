//! Composition root: wires the metric cache, relational stores, alarm
//! evaluator, rule provisioner, multicast announcer, and admin HTTP surface
//! into a running Manager process.

use std::sync::Arc;

use kyro_alarm_manager::alarm::{AlarmEvaluator, RuleProvisioner};
use kyro_alarm_manager::cache::MetricCache;
use kyro_alarm_manager::config::ManagerConfig;
use kyro_alarm_manager::multicast::MulticastAnnouncer;
use kyro_alarm_manager::storage::{SqliteEventRepository, SqliteTemplateRepository, TemplateRepository};
use kyro_alarm_manager::transport::{router, AdminState};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Manually parses the handful of flags this binary accepts, mirroring the
/// style of a minimal `--flag value` CLI rather than pulling in a full
/// argument-parsing framework for two options.
struct Args {
    config_path: String,
}

fn parse_args() -> Args {
    let mut config_path = "manager.toml".to_string();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(value) = args.next() {
                    config_path = value;
                }
            }
            other => {
                eprintln!("unrecognized argument: {other}");
            }
        }
    }
    Args { config_path }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args();
    let config = match ManagerConfig::load(&args.config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration, using defaults");
            ManagerConfig::default()
        }
    };

    let connect_options: SqliteConnectOptions = format!("sqlite://{}", config.sqlite_path)
        .parse()
        .expect("invalid sqlite path")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .expect("failed to open sqlite pool");

    let runtime = tokio::runtime::Handle::current();
    let template_repo: Arc<dyn TemplateRepository> =
        Arc::new(SqliteTemplateRepository::new(pool.clone(), runtime.clone()));
    // `create_tables`/`load_all_templates` block on this same runtime
    // internally; since `main` is itself running inside that runtime, the
    // call has to happen off the current worker thread via `spawn_blocking`
    // or it would trip tokio's nested-`block_on` panic.
    let repo_for_tables = template_repo.clone();
    tokio::task::spawn_blocking(move || repo_for_tables.create_tables())
        .await
        .expect("alarm table creation task panicked")
        .expect("failed to create alarm tables");

    let event_repo = Arc::new(SqliteEventRepository::new(pool, runtime));

    let cache = Arc::new(MetricCache::new());
    let evaluator = Arc::new(AlarmEvaluator::new(cache.clone(), event_repo.clone(), config.evaluator_tick()));
    let provisioner = Arc::new(RuleProvisioner::new(
        cache.clone(),
        evaluator.clone(),
        config.provisioner_sync_interval(),
        config.liveness_window(),
    ));

    let repo_for_load = template_repo.clone();
    let initial_templates = tokio::task::spawn_blocking(move || repo_for_load.load_all_templates())
        .await
        .unwrap_or(Ok(Vec::new()))
        .unwrap_or_default();
    info!(count = initial_templates.len(), "loaded alarm templates at startup");
    provisioner.set_templates(initial_templates);

    evaluator.start();
    provisioner.start();

    let announcer = Arc::new(MulticastAnnouncer::new(
        config.multicast_addr.clone(),
        config.multicast_port,
        config.multicast_interval(),
        format!("http://{}", config.listen_addr),
    ));
    announcer.start();

    let state = AdminState {
        cache,
        templates: template_repo,
        events: event_repo,
        provisioner: provisioner.clone(),
        evaluator: evaluator.clone(),
    };
    let app = router(state);

    info!(addr = %config.listen_addr, "admin HTTP surface listening");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind admin HTTP listener");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };
    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(error = %err, "admin HTTP server exited with error");
    }

    evaluator.stop();
    provisioner.stop();
    announcer.stop();
}
