//! Run summary: one final outcome per task, plus the tasks that were never
//! attempted and why. Serializable for `--report`.

use super::error_classifier::FailureCategory;
use crate::config::ExecutionMode;
use crate::error::FixupResult;
use crate::models::ObjectKey;
use crate::sequencer::Layer;
use crate::state_machine::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Final state of one attempted task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub layer: Layer,
    pub state: TaskState,
    /// Client invocations of the task itself, across all rounds
    pub attempts: u32,
    /// Round in which the final state was reached
    pub final_round: u32,
    /// Category of the last failure, kept for skipped duplicates too
    pub category: Option<FailureCategory>,
    pub diagnostic: Option<String>,
    pub grants_applied: Vec<String>,
    pub archived_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotAttemptedReason {
    /// The object itself cannot be represented on the target
    Unsupported,
    /// Depends on an unsupported object
    Blocked,
    /// Remap rules disagree about the target identity
    RemapConflict,
    /// Member of a dependency cycle
    Cycle,
    /// Waits on a cycle member
    BlockedByCycle,
    /// Strict mode stopped dispatch after a failure
    Cancelled,
}

impl fmt::Display for NotAttemptedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unsupported => "unsupported",
            Self::Blocked => "blocked",
            Self::RemapConflict => "remap_conflict",
            Self::Cycle => "cycle",
            Self::BlockedByCycle => "blocked_by_cycle",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotAttempted {
    pub task_id: String,
    pub reason: NotAttemptedReason,
    pub root_cause: Option<ObjectKey>,
    /// Cycle members, or the blocking chain back to the root cause
    pub related: Vec<ObjectKey>,
}

impl NotAttempted {
    pub fn new(task_id: impl Into<String>, reason: NotAttemptedReason) -> Self {
        Self {
            task_id: task_id.into(),
            reason,
            root_cause: None,
            related: Vec::new(),
        }
    }

    pub fn with_root_cause(mut self, root_cause: Option<ObjectKey>) -> Self {
        self.root_cause = root_cause;
        self
    }

    pub fn with_related(mut self, related: Vec<ObjectKey>) -> Self {
        self.related = related;
        self
    }
}

/// One dispatch group of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBatch {
    pub layer: Layer,
    pub wave: usize,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: ExecutionMode,
    pub dry_run: bool,
    pub rounds_run: u32,
    pub outcomes: Vec<TaskOutcome>,
    pub not_attempted: Vec<NotAttempted>,
    /// Round-one plan; the only content of a dry run
    pub planned_batches: Vec<PlannedBatch>,
    pub grants_planned: usize,
    pub grants_applied: usize,
}

impl RunSummary {
    pub fn new(mode: ExecutionMode, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            mode,
            dry_run,
            rounds_run: 0,
            outcomes: Vec::new(),
            not_attempted: Vec::new(),
            planned_batches: Vec::new(),
            grants_planned: 0,
            grants_applied: 0,
        }
    }

    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == task_id)
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Tasks whose final state is a failure
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, TaskState::Failed | TaskState::Error))
            .count()
    }

    pub fn failures_by_category(&self) -> BTreeMap<FailureCategory, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            if outcome.state == TaskState::Failed {
                if let Some(category) = outcome.category {
                    *counts.entry(category).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Every discovered task ended in SUCCESS or SKIPPED
    pub fn is_success(&self) -> bool {
        if self.dry_run {
            return true;
        }
        self.not_attempted.is_empty() && self.outcomes.iter().all(|o| o.state.is_ok())
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> FixupResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_report(&self, path: &Path) -> FixupResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Operator-facing text rendering
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.dry_run {
            out.push_str("Planned order (dry run):\n");
            for batch in &self.planned_batches {
                out.push_str(&format!("  [{} #{}] {}\n", batch.layer, batch.wave, batch.tasks.join(", ")));
            }
        } else {
            out.push_str(&format!(
                "Run {}: {} rounds, {} success, {} skipped, {} failed, {} error, {} not attempted\n",
                self.run_id,
                self.rounds_run,
                self.count(TaskState::Success),
                self.count(TaskState::Skipped),
                self.count(TaskState::Failed),
                self.count(TaskState::Error),
                self.not_attempted.len()
            ));
            for outcome in self.outcomes.iter().filter(|o| !o.state.is_ok()) {
                out.push_str(&format!(
                    "  FAILED {} [{}] {}\n",
                    outcome.task_id,
                    outcome
                        .category
                        .map_or_else(|| outcome.state.to_string(), |c| c.to_string()),
                    outcome.diagnostic.as_deref().unwrap_or("")
                ));
            }
        }
        for skipped in &self.not_attempted {
            let root = skipped
                .root_cause
                .as_ref()
                .map(|r| format!(" (root cause: {r})"))
                .unwrap_or_default();
            out.push_str(&format!(
                "  NOT ATTEMPTED {} [{}]{}\n",
                skipped.task_id, skipped.reason, root
            ));
        }
        out
    }
}
