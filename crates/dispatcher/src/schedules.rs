use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use opsboard_core::OpsResult;
use opsboard_domain::ScheduleStore;
use tracing::{info, warn};

/// Startup hook: compute `next_run` for every schedule that lacks one.
///
/// A schedule's `next_run` is initialized exactly once, on first encounter;
/// existing values are never overwritten here — the external beat process
/// owns them afterwards. A schedule with an unparseable cron expression is
/// skipped with a warning so the rest of the batch still initializes.
pub async fn initialize_schedule_next_runs(store: &Arc<dyn ScheduleStore>) -> OpsResult<usize> {
    let schedules = store.list().await?;
    let mut initialized = 0usize;

    for schedule in schedules {
        if schedule.next_run.is_some() {
            continue;
        }
        let parsed = match Schedule::from_str(&schedule.cron_expr) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    schedule_id = schedule.id,
                    cron = %schedule.cron_expr,
                    "skipping schedule with invalid cron expression: {e}"
                );
                continue;
            }
        };
        let Some(next) = parsed.upcoming(Utc).next() else {
            warn!(
                schedule_id = schedule.id,
                cron = %schedule.cron_expr,
                "cron expression yields no upcoming occurrence"
            );
            continue;
        };
        store.set_next_run(schedule.id, next).await?;
        initialized += 1;
    }

    if initialized > 0 {
        info!(initialized, "initialized next_run for job schedules");
    }
    Ok(initialized)
}
