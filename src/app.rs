//! Process assembly: wires the broker, repositories, executors, control
//! plane, cache, worker, and HTTP server together according to the
//! configuration and run mode.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use opsboard_api::{create_router, AppState};
use opsboard_core::traits::Broker;
use opsboard_core::AppConfig;
use opsboard_dispatcher::{
    initialize_schedule_next_runs, ExampleExecutor, ExecutorRegistry, JobExecutor,
};
use opsboard_domain::{
    JobRunSink, JobTemplateRepository, JobTemplateService, JobTypeInfo, ScheduleStore,
};
use opsboard_infrastructure::database::{
    connect_pool, run_migrations, InMemoryJobRunSink, InMemoryScheduleStore,
    InMemoryTemplateRepository, PostgresJobRunSink, PostgresScheduleStore,
    PostgresTemplateRepository,
};
use opsboard_infrastructure::{
    BrokerQueueClient, CleanupExecutor, CleanupService, MemoryBroker, PrefetchRegistry,
    QueueControlService, RedisBroker, TtlCache,
};
use opsboard_worker::WorkerRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Api,
    Worker,
    All,
}

struct Repositories {
    templates: Arc<dyn JobTemplateRepository>,
    schedules: Arc<dyn ScheduleStore>,
    job_runs: Arc<dyn JobRunSink>,
}

async fn build_repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    match &config.database {
        Some(db) => {
            let pool = connect_pool(db).await?;
            run_migrations(&pool).await?;
            Ok(Repositories {
                templates: Arc::new(PostgresTemplateRepository::new(pool.clone())),
                schedules: Arc::new(PostgresScheduleStore::new(pool.clone())),
                job_runs: Arc::new(PostgresJobRunSink::new(pool)),
            })
        }
        None => {
            info!("no database configured, using in-memory repositories");
            Ok(Repositories {
                templates: Arc::new(InMemoryTemplateRepository::new()),
                schedules: Arc::new(InMemoryScheduleStore::new()),
                job_runs: Arc::new(InMemoryJobRunSink::new()),
            })
        }
    }
}

fn job_type_catalog() -> Vec<JobTypeInfo> {
    vec![
        JobTypeInfo::new("example", "Example Job", "Reference job for smoke testing"),
        JobTypeInfo::new(
            "system.cleanup",
            "Result Cleanup",
            "Removes aged task result records",
        ),
    ]
}

pub async fn run(config: AppConfig, mode: Mode) -> anyhow::Result<()> {
    let broker: Arc<dyn Broker> = if config.embedded() {
        info!("embedded mode, using in-process broker");
        Arc::new(MemoryBroker::new())
    } else {
        Arc::new(RedisBroker::connect(&config.broker).await?)
    };
    let result_ttl = Duration::from_secs(config.broker.result_ttl_seconds);

    let repositories = build_repositories(&config).await?;

    let registry = Arc::new(ExecutorRegistry::new());
    let executors: Vec<Arc<dyn JobExecutor>> = vec![
        Arc::new(ExampleExecutor),
        Arc::new(CleanupExecutor::new(
            broker.clone(),
            config.cleanup.age_hours,
        )),
    ];
    registry.register_batch(executors).await;

    let queue_client = Arc::new(BrokerQueueClient::new(broker.clone(), result_ttl));
    let control = Arc::new(QueueControlService::new(broker.clone(), config.clone()));
    control.ensure_builtin_queues().await?;

    let cleanup = Arc::new(CleanupService::new(
        broker.clone(),
        queue_client.clone(),
        control.clone(),
    ));
    let templates = Arc::new(JobTemplateService::new(
        repositories.templates.clone(),
        job_type_catalog(),
    ));

    let initialized = initialize_schedule_next_runs(&repositories.schedules).await?;
    if initialized > 0 {
        info!(initialized, "seeded missing schedule next-run times");
    }

    let cache = Arc::new(TtlCache::new(config.cache.default_ttl_seconds));
    if config.cache.enabled && config.cache.prefetch_on_startup {
        let mut prefetch = PrefetchRegistry::new();
        let control_for_prefetch = control.clone();
        prefetch.register(
            "queue-settings",
            "settings:queues",
            Some(config.cache.default_ttl_seconds),
            move || {
                let control = control_for_prefetch.clone();
                Box::pin(async move {
                    let settings = control.get_settings().await?;
                    Ok(serde_json::to_value(settings)?)
                })
            },
        );
        prefetch.warm(cache.clone());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(crate::shutdown::listen(shutdown_tx.clone()));

    let worker_handle = if matches!(mode, Mode::Worker | Mode::All) {
        let runner = Arc::new(WorkerRunner::new(
            broker.clone(),
            registry.clone(),
            Some(repositories.job_runs.clone()),
            config.worker.clone(),
            result_ttl,
        ));
        Some(tokio::spawn(runner.run(shutdown_tx.clone())))
    } else {
        None
    };

    if matches!(mode, Mode::Api | Mode::All) {
        let state = AppState {
            templates,
            queue_client,
            control,
            cleanup,
            cache,
        };
        let router = create_router(state);
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %addr, "http server listening");

        let mut shutdown_rx = shutdown_tx.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;
    } else {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
    }

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }
    info!("shutdown complete");
    Ok(())
}
