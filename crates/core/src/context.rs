//! Explicit per-run execution context.

use serde::{Deserialize, Serialize};

use crate::id::{AgentId, JobId};

/// Identity of one job execution: which agent is running which job.
///
/// Passed to every catalog operation so that queries never depend on
/// ambient process state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobContext {
    pub agent_id: AgentId,
    pub job_id: JobId,
}

impl JobContext {
    pub fn new(agent_id: AgentId, job_id: JobId) -> Self {
        Self { agent_id, job_id }
    }
}
