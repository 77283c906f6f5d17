//! Job records and the ledger that stores them.
//!
//! The orchestrator writes the ledger at stage boundaries only:
//!
//! ```text
//! create(processing) ──▶ update(completed)
//!         │
//!         └────────────▶ update(failed)
//! ```
//!
//! Ledger writes are fire-and-forget: a failing ledger is logged and never
//! fails the job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        })
    }
}

/// One accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Processing,
            filename: filename.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown job {0}")]
    UnknownJob(Uuid),

    #[error("ledger backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait JobLedger: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), LedgerError>;
    async fn update(&self, id: Uuid, status: JobStatus) -> Result<(), LedgerError>;
}

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().ok()?.get(&id).cloned()
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = match self.jobs.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

fn poisoned() -> LedgerError {
    LedgerError::Backend("ledger lock poisoned".into())
}

#[async_trait]
impl JobLedger for MemoryLedger {
    async fn create(&self, job: &Job) -> Result<(), LedgerError> {
        self.jobs
            .lock()
            .map_err(|_| poisoned())?
            .insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, id: Uuid, status: JobStatus) -> Result<(), LedgerError> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let job = jobs.get_mut(&id).ok_or(LedgerError::UnknownJob(id))?;
        job.status = status;
        Ok(())
    }
}
