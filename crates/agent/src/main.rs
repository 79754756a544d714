//! `jobagent <job-id>...`: run each listed job once, each on its own thread.

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{error, info};

use jobagent_core::JobId;
use jobagent_events::{EventBus, InMemoryEventBus, StatusEvent};
use jobagent_infra::event_bus::RedisPubSubNotifier;
use jobagent_infra::{AgentConfig, AgentServices, JobThread, PostgresCatalog, PostgresStepDatabases};

fn main() -> anyhow::Result<()> {
    jobagent_observability::init();

    let config = AgentConfig::from_env()?;
    let jobs = std::env::args()
        .skip(1)
        .map(|arg| arg.parse::<JobId>())
        .collect::<Result<Vec<_>, _>>()
        .context("job ids must be integers")?;
    if jobs.is_empty() {
        bail!("usage: jobagent <job-id>...");
    }

    // Job threads block on this runtime's handle; they never run on it.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to start database runtime")?;
    let handle = runtime.handle().clone();
    let _runtime = runtime.enter();

    let catalog = PostgresCatalog::connect(
        &config.database_url,
        config.pool_size,
        config.acquire_timeout,
        handle.clone(),
    )
    .context("failed to connect to the catalog database")?;
    if config.auto_migrate {
        catalog.migrate().context("failed to apply catalog schema")?;
    }
    let databases = PostgresStepDatabases::new(catalog.connect_options(), handle)
        .with_max_connections(config.step_pool_size)
        .with_acquire_timeout(config.acquire_timeout);

    info!(agent_id = %config.agent_id, jobs = jobs.len(), "job agent starting");

    match &config.redis_url {
        Some(url) => {
            let bus = RedisPubSubNotifier::new(url, config.notify_channel.clone())
                .context("invalid REDIS_URL")?;
            run_jobs(&config, catalog, databases, bus, &jobs)
        }
        None => run_jobs(&config, catalog, databases, InMemoryEventBus::new(), &jobs),
    }
}

fn run_jobs<B>(
    config: &AgentConfig,
    catalog: PostgresCatalog,
    databases: PostgresStepDatabases,
    bus: B,
    jobs: &[JobId],
) -> anyhow::Result<()>
where
    B: EventBus<StatusEvent> + 'static,
{
    let mut services = AgentServices::new(config.agent_id, catalog, databases, bus);
    if let Some(dir) = &config.scratch_dir {
        services = services.with_scratch_dir(dir.clone());
    }
    let services = Arc::new(services);

    let mut running = Vec::with_capacity(jobs.len());
    for &job_id in jobs {
        let handle = JobThread::new(job_id, services.clone())
            .spawn()
            .with_context(|| format!("failed to spawn thread for job {job_id}"))?;
        running.push((job_id, handle));
    }

    let mut unsuccessful = 0usize;
    for (job_id, handle) in running {
        match handle.join() {
            Ok(status) => {
                info!(job_id = %job_id, status = %status, "job finished");
                if !status.is_success() {
                    unsuccessful += 1;
                }
            }
            Err(_) => {
                error!(job_id = %job_id, "job thread panicked");
                unsuccessful += 1;
            }
        }
    }

    info!(jobs = jobs.len(), unsuccessful, "all jobs finished");
    Ok(())
}
