//! Synchronization run checkpoint model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What started a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Scheduled,
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Manual => "manual",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "manual" => SyncTrigger::Manual,
            _ => SyncTrigger::Scheduled,
        }
    }
}

/// Outcome of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Success,
    PartialFailure,
    Failure,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Running => "running",
            SyncRunStatus::Success => "success",
            SyncRunStatus::PartialFailure => "partial_failure",
            SyncRunStatus::Failure => "failure",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "success" => SyncRunStatus::Success,
            "partial_failure" => SyncRunStatus::PartialFailure,
            "failure" => SyncRunStatus::Failure,
            _ => SyncRunStatus::Running,
        }
    }
}

/// One synchronization run. The most recent fully successful run's end time
/// is the reference point for the next incremental fetch; partial runs leave
/// the window in place so missed references are retried.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncRun {
    pub run_id: Uuid,
    pub trigger_mode: String,
    pub status: String,
    pub started_utc: DateTime<Utc>,
    pub completed_utc: Option<DateTime<Utc>>,
    pub fetched_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn trigger(&self) -> SyncTrigger {
        SyncTrigger::from_string(&self.trigger_mode)
    }

    pub fn status(&self) -> SyncRunStatus {
        SyncRunStatus::from_string(&self.status)
    }
}
