//! Background TTL sweeps.
//!
//! Registers recurring jobs that emulate document TTLs with periodic
//! deletes: hourly for product observations (24 h), daily for notification
//! audit rows (30 d) and spent link tokens.

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use cardwatch_db::{
    delete_expired_link_tokens, delete_expired_notifications, delete_expired_results,
};

const RESULT_TTL_HOURS: i32 = 24;
const NOTIFICATION_TTL_DAYS: i32 = 30;

/// Builds and starts the sweep scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_sweeper(pool: PgPool) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_results_sweep(&scheduler, pool.clone()).await?;
    register_audit_sweep(&scheduler, pool).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Hourly at :25 — remove observations older than 24 h.
async fn register_results_sweep(
    scheduler: &JobScheduler,
    pool: PgPool,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 25 * * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        Box::pin(async move {
            match delete_expired_results(&pool, RESULT_TTL_HOURS).await {
                Ok(n) if n > 0 => tracing::info!(deleted = n, "sweep: expired results removed"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "sweep: result sweep failed"),
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

/// Daily at 03:45 UTC — remove old audit rows and spent link tokens.
async fn register_audit_sweep(
    scheduler: &JobScheduler,
    pool: PgPool,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 45 3 * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        Box::pin(async move {
            match delete_expired_notifications(&pool, NOTIFICATION_TTL_DAYS).await {
                Ok(n) if n > 0 => {
                    tracing::info!(deleted = n, "sweep: expired notifications removed");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "sweep: notification sweep failed"),
            }
            match delete_expired_link_tokens(&pool).await {
                Ok(n) if n > 0 => tracing::info!(deleted = n, "sweep: spent link tokens removed"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "sweep: link token sweep failed"),
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}
