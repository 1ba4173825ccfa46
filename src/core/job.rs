use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Convert,
    Snapshot,
    Join,
    JoinImageSequence,
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStatus {
    Building,
    Rendering,
    Executing,
    Parsing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::Building => Some(JobStatus::Rendering),
            JobStatus::Rendering => Some(JobStatus::Executing),
            JobStatus::Executing => Some(JobStatus::Parsing),
            JobStatus::Parsing => Some(JobStatus::Complete),
            JobStatus::Complete | JobStatus::Failed => None,
        }
    }
}

/// Tracks one facade operation through its strictly sequential states.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub kind: OperationKind,
    pub status: JobStatus,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
}

impl Job {
    pub fn new(kind: OperationKind) -> Self {
        let job = Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            status: JobStatus::Building,
            started_at: Instant::now(),
            ended_at: None,
        };
        debug!(job = job.id, kind = ?kind, "job created");
        job
    }

    /// Moves to the next state. Skipping ahead or leaving a terminal state is refused.
    pub fn advance(&mut self, to: JobStatus) -> bool {
        let allowed = match to {
            JobStatus::Failed => !self.status.is_terminal(),
            other => self.status.next() == Some(other),
        };
        if !allowed {
            warn!(job = self.id, from = ?self.status, to = ?to, "refused job transition");
            return false;
        }

        debug!(job = self.id, from = ?self.status, to = ?to, "job transition");
        self.status = to;
        if to.is_terminal() {
            self.ended_at = Some(Instant::now());
        }
        true
    }

    pub fn fail(&mut self) -> bool {
        self.advance(JobStatus::Failed)
    }

    pub fn elapsed(&self) -> Duration {
        self.ended_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }
}
