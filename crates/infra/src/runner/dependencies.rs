//! Prerequisite checks.

use tracing::debug;

use jobagent_core::{JobContext, RunStatus};

use super::RunError;
use crate::db::Catalog;

/// Check that the latest run of every prerequisite of the job succeeded.
///
/// Stops at the first prerequisite that never ran or did not succeed; the
/// ones after it are not looked at.
pub fn check_dependencies<C>(conn: &mut C, ctx: &JobContext) -> Result<(), RunError>
where
    C: Catalog + ?Sized,
{
    for prerequisite in conn.prerequisites(ctx)? {
        match conn.latest_status(prerequisite)? {
            Some(RunStatus::Success) => {
                debug!(job_id = %ctx.job_id, prerequisite = %prerequisite, "prerequisite satisfied");
            }
            status => {
                return Err(RunError::DependencyNotMet {
                    prerequisite,
                    status,
                });
            }
        }
    }
    Ok(())
}
