//! Status event payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use jobagent_core::{JobId, StepId};

/// Lifecycle phase reported by a status event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// A job thread began working on the job (before the claim).
    Starting,
    /// The claim succeeded and a job log was opened.
    Running,
    /// A step began executing.
    Started,
    Success,
    Failed,
    /// Finalization ran; the job log is closed.
    Completed,
}

/// What an event is about: a whole job, or one step of it.
///
/// Rendered as `"<job>"` or `"<job>:<step>"` on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NotifyTarget {
    Job(JobId),
    Step(JobId, StepId),
}

impl NotifyTarget {
    pub fn job_id(&self) -> JobId {
        match self {
            NotifyTarget::Job(job) | NotifyTarget::Step(job, _) => *job,
        }
    }
}

impl core::fmt::Display for NotifyTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NotifyTarget::Job(job) => write!(f, "{job}"),
            NotifyTarget::Step(job, step) => write!(f, "{job}:{step}"),
        }
    }
}

impl core::str::FromStr for NotifyTarget {
    type Err = jobagent_core::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((job, step)) => Ok(NotifyTarget::Step(job.parse()?, step.parse()?)),
            None => Ok(NotifyTarget::Job(s.parse()?)),
        }
    }
}

impl Serialize for NotifyTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NotifyTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single `notify(target, phase, message)` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub job_id: JobId,
    pub target: NotifyTarget,
    #[serde(rename = "status")]
    pub phase: Phase,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(target: NotifyTarget, phase: Phase, description: impl Into<String>) -> Self {
        Self {
            job_id: target.job_id(),
            target,
            phase,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}
