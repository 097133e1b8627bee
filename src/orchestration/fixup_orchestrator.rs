//! # Fixup Orchestrator
//!
//! Executes remediation tasks against the target through a [`SqlClient`].
//!
//! ## Execution model
//!
//! ```text
//! round 1..=N ─┬─ plan: layers → waves → batches
//!              ├─ batch: bounded worker pool, drained before the next batch
//!              └─ reconcile: retryable failures go back to PENDING
//! ```
//!
//! Each task owns one [`TaskStateMachine`]; only this coordinator applies
//! transitions. Workers return a report per task (every client attempt in
//! order) and the coordinator replays it onto the machine after the batch
//! has drained. The summary is built from the machines' final states, so a
//! task that failed in round one and succeeded in round three counts as a
//! success only.

use super::error_classifier::{
    truncate_diagnostic, FailureCategory, FailureClassifier, StandardFailureClassifier,
};
use super::existence_cache::ExistenceCache;
use super::sql_client::{SqlClient, SqlClientError};
use super::summary::{NotAttempted, NotAttemptedReason, PlannedBatch, RunSummary, TaskOutcome};
use super::task_discovery::{archive_task_file, discover_tasks};
use crate::config::{FixupConfig, OrderingMode};
use crate::dependency::{ClassificationReport, DependencyGraph, SupportState};
use crate::error::{FixupError, FixupResult};
use crate::grants::{GrantPlanner, GrantRequirement};
use crate::logging::{log_error, log_task_operation};
use crate::models::{ObjectKey, RemediationTask, TaskScript};
use crate::sequencer::{chain, order, plan_layers, Layer, SequenceResult};
use crate::state_machine::{TaskEvent, TaskState, TaskStateMachine};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Catalog knowledge used for screening, ordering, and grant planning
#[derive(Debug, Clone)]
pub struct CatalogContext {
    pub graph: DependencyGraph,
    pub report: ClassificationReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Plan only; the client is never invoked
    pub dry_run: bool,
    /// Only view-family tasks, ordered by the full reference chain
    pub view_chain: bool,
}

/// Result of one client invocation of a task
#[derive(Debug, Clone, PartialEq, Eq)]
enum Attempt {
    /// Existence check or grant ledger says there is nothing to do
    AlreadyPresent,
    Succeeded,
    Duplicate(String),
    Failed {
        category: FailureCategory,
        diagnostic: String,
    },
    Errored(String),
}

impl Attempt {
    fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Errored(_))
    }
}

#[derive(Debug)]
struct WorkerReport {
    index: usize,
    attempts: Vec<Attempt>,
    grants_applied: Vec<String>,
    cancelled: bool,
}

impl WorkerReport {
    fn cancelled(index: usize) -> Self {
        Self {
            index,
            attempts: Vec::new(),
            grants_applied: Vec::new(),
            cancelled: true,
        }
    }
}

/// Everything a worker needs for one task
#[derive(Debug, Clone)]
struct Dispatch {
    index: usize,
    task: RemediationTask,
    subject: Option<ObjectKey>,
    grantee: String,
    planned_grant: Option<GrantRequirement>,
}

/// State shared by the workers of a run
struct WorkerShared {
    config: Arc<FixupConfig>,
    client: Arc<dyn SqlClient>,
    classifier: Arc<dyn FailureClassifier>,
    planner: Arc<GrantPlanner>,
    cache: Arc<ExistenceCache>,
    semaphore: Arc<Semaphore>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
struct Batch {
    layer: Layer,
    wave: usize,
    members: Vec<usize>,
}

#[derive(Debug, Default)]
struct RoundPlan {
    batches: Vec<Batch>,
    not_attempted: Vec<(usize, NotAttempted)>,
}

/// Per-task bookkeeping owned by the coordinator
#[derive(Debug)]
struct TaskTrack {
    task: RemediationTask,
    machine: TaskStateMachine,
    layer: Layer,
    planned_grant: Option<GrantRequirement>,
    last_category: Option<FailureCategory>,
    last_diagnostic: Option<String>,
    grants_applied: Vec<String>,
    final_round: u32,
    archived_to: Option<String>,
    excluded: bool,
}

impl TaskTrack {
    fn new(task: RemediationTask, planned_grant: Option<GrantRequirement>) -> Self {
        Self {
            machine: TaskStateMachine::new(task.id.clone()),
            layer: task.layer,
            task,
            planned_grant,
            last_category: None,
            last_diagnostic: None,
            grants_applied: Vec::new(),
            final_round: 0,
            archived_to: None,
            excluded: false,
        }
    }

    fn is_retryable(&self) -> bool {
        self.machine.current_state() == TaskState::Failed
            && self.last_category.is_some_and(|c| c.is_retryable())
    }
}

pub struct FixupOrchestrator {
    config: Arc<FixupConfig>,
    client: Arc<dyn SqlClient>,
    classifier: Arc<dyn FailureClassifier>,
    planner: Arc<GrantPlanner>,
    cache: Arc<ExistenceCache>,
    context: Option<Arc<CatalogContext>>,
}

impl FixupOrchestrator {
    pub fn new(config: FixupConfig, client: Arc<dyn SqlClient>) -> Self {
        Self {
            config: Arc::new(config),
            client,
            classifier: Arc::new(StandardFailureClassifier::new()),
            planner: Arc::new(GrantPlanner::default()),
            cache: Arc::new(ExistenceCache::new()),
            context: None,
        }
    }

    /// Screen, order, and plan grants from a classified catalog
    pub fn with_catalog(mut self, graph: DependencyGraph, report: ClassificationReport) -> Self {
        self.planner = Arc::new(GrantPlanner::from_graph(&graph));
        self.context = Some(Arc::new(CatalogContext { graph, report }));
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &FixupConfig {
        &self.config
    }

    pub fn existence_cache(&self) -> &ExistenceCache {
        &self.cache
    }

    pub fn grant_planner(&self) -> &GrantPlanner {
        &self.planner
    }

    /// Discover tasks under `task_dir` and run them
    pub async fn run(&self, task_dir: &Path, options: RunOptions) -> FixupResult<RunSummary> {
        let discovered = discover_tasks(task_dir, &self.config.execution.done_dir)?;
        self.run_tasks(discovered.tasks, Some(task_dir), options).await
    }

    /// Run an explicit task list. Successful file tasks are archived only
    /// when `task_root` is given.
    pub async fn run_tasks(
        &self,
        tasks: Vec<RemediationTask>,
        task_root: Option<&Path>,
        options: RunOptions,
    ) -> FixupResult<RunSummary> {
        let exec = &self.config.execution;
        let mut summary = RunSummary::new(exec.mode, options.dry_run);
        summary.grants_planned = self.planner.len();

        let mut tracks = self.build_tracks(tasks, options);
        for track in tracks.iter_mut() {
            if let Some(skip) = self.screen(&track.task) {
                debug!(task_id = %track.task.id, reason = %skip.reason, "Task screened out");
                track.excluded = true;
                summary.not_attempted.push(skip);
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(WorkerShared {
            config: Arc::clone(&self.config),
            client: Arc::clone(&self.client),
            classifier: Arc::clone(&self.classifier),
            planner: Arc::clone(&self.planner),
            cache: Arc::clone(&self.cache),
            semaphore: Arc::new(Semaphore::new(exec.max_workers)),
            cancelled: Arc::clone(&cancelled),
        });

        let max_rounds = exec.effective_rounds();
        info!(
            run_id = %summary.run_id,
            tasks = tracks.len(),
            mode = ?exec.mode,
            max_rounds,
            dry_run = options.dry_run,
            "Starting fixup run"
        );

        for round in 1..=max_rounds {
            let active: Vec<usize> = if round == 1 {
                (0..tracks.len()).filter(|i| !tracks[*i].excluded).collect()
            } else {
                let mut retry = Vec::new();
                for (index, track) in tracks.iter_mut().enumerate() {
                    if !track.excluded && track.is_retryable() {
                        track.machine.transition(TaskEvent::Retry)?;
                        retry.push(index);
                    }
                }
                retry
            };
            if active.is_empty() {
                break;
            }

            let plan = self.plan_round(&tracks, &active, options.view_chain);
            for (index, skip) in plan.not_attempted {
                tracks[index].excluded = true;
                summary.not_attempted.push(skip);
            }
            for batch in &plan.batches {
                for &index in &batch.members {
                    tracks[index].layer = batch.layer;
                }
            }
            if round == 1 {
                summary.planned_batches = plan
                    .batches
                    .iter()
                    .map(|b| PlannedBatch {
                        layer: b.layer,
                        wave: b.wave,
                        tasks: b.members.iter().map(|i| tracks[*i].task.id.clone()).collect(),
                    })
                    .collect();
            }
            if options.dry_run {
                break;
            }

            summary.rounds_run = round;
            info!(round, tasks = active.len(), batches = plan.batches.len(), "Round started");

            for batch in plan.batches {
                if cancelled.load(Ordering::SeqCst) {
                    for index in batch.members {
                        self.mark_cancelled(&mut tracks[index], &mut summary);
                    }
                    continue;
                }

                let dispatches: Vec<Dispatch> = batch
                    .members
                    .iter()
                    .map(|&index| self.dispatch_for(index, &tracks[index]))
                    .collect();
                debug!(layer = %batch.layer, wave = batch.wave, size = dispatches.len(), "Dispatching batch");

                for report in run_batch(&shared, dispatches).await? {
                    let track = &mut tracks[report.index];
                    if report.cancelled {
                        self.mark_cancelled(track, &mut summary);
                        continue;
                    }
                    self.apply_report(track, report, round)?;
                    if let Some(root) = task_root {
                        self.archive_if_done(root, track);
                    }
                }
            }

            let retryable = tracks.iter().filter(|t| !t.excluded && t.is_retryable()).count();
            info!(round, retryable, "Round finished");
        }

        summary.outcomes = tracks
            .iter()
            .filter(|t| !t.excluded && !t.machine.history().is_empty())
            .map(|t| self.outcome_for(t))
            .collect();
        summary.grants_applied = self.planner.applied_count();
        summary.finished_at = chrono::Utc::now();

        info!(
            run_id = %summary.run_id,
            rounds = summary.rounds_run,
            success = summary.count(TaskState::Success),
            skipped = summary.count(TaskState::Skipped),
            failed = summary.failure_count(),
            not_attempted = summary.not_attempted.len(),
            "Fixup run finished"
        );
        Ok(summary)
    }

    fn build_tracks(&self, tasks: Vec<RemediationTask>, options: RunOptions) -> Vec<TaskTrack> {
        if options.view_chain {
            return tasks
                .into_iter()
                .filter(|t| t.kind.object_type().is_some_and(|ty| ty.is_view_family()))
                .map(|t| TaskTrack::new(t, None))
                .collect();
        }

        let mut tracks: Vec<TaskTrack> = tasks.into_iter().map(|t| TaskTrack::new(t, None)).collect();
        let mut existing: BTreeSet<String> = tracks.iter().map(|t| t.task.id.clone()).collect();
        for requirement in self.planner.pending() {
            let source: Vec<ObjectKey> = self.planner.source_of(&requirement).cloned().into_iter().collect();
            let task = RemediationTask::inline_grant(
                requirement.label(),
                requirement.grantee.clone(),
                requirement.to_sql(),
            )
            .with_dependencies(source);
            if existing.insert(task.id.clone()) {
                tracks.push(TaskTrack::new(task, Some(requirement)));
            }
        }
        tracks
    }

    /// Keep unsupported, blocked, and conflicted objects out of dispatch
    fn screen(&self, task: &RemediationTask) -> Option<NotAttempted> {
        let context = self.context.as_ref()?;
        let key = task.subject_key()?;
        let result = context.report.get(&key)?;

        if result.requires_manual_resolution {
            return Some(NotAttempted::new(task.id.clone(), NotAttemptedReason::RemapConflict));
        }
        match result.state {
            SupportState::Unsupported => Some(
                NotAttempted::new(task.id.clone(), NotAttemptedReason::Unsupported)
                    .with_root_cause(Some(key)),
            ),
            SupportState::Blocked => Some(
                NotAttempted::new(task.id.clone(), NotAttemptedReason::Blocked)
                    .with_root_cause(result.root_cause.clone())
                    .with_related(context.report.chain_to_root(&key)),
            ),
            SupportState::Supported | SupportState::Missing => None,
        }
    }

    fn plan_round(&self, tracks: &[TaskTrack], active: &[usize], view_chain: bool) -> RoundPlan {
        let mut sorted: Vec<usize> = active.to_vec();
        sorted.sort_by(|a, b| tracks[*a].task.id.cmp(&tracks[*b].task.id));

        if view_chain {
            return self.plan_chain(tracks, sorted);
        }
        if self.config.execution.ordering == OrderingMode::Flat {
            let batches = sorted
                .into_iter()
                .enumerate()
                .map(|(wave, index)| Batch {
                    layer: tracks[index].task.layer,
                    wave,
                    members: vec![index],
                })
                .collect();
            return RoundPlan {
                batches,
                not_attempted: Vec::new(),
            };
        }
        self.plan_layered(tracks, sorted)
    }

    /// Layers, then within-layer waves from the catalog graph. Groups are
    /// keyed by a rank of twice the wave, so a planned grant can sit right
    /// after the object it is on and ahead of that object's dependents.
    fn plan_layered(&self, tracks: &[TaskTrack], sorted: Vec<usize>) -> RoundPlan {
        let Some(context) = self.context.as_ref() else {
            return plan_declared(tracks, sorted);
        };
        let mut plan = RoundPlan::default();
        let mut groups: BTreeMap<(Layer, usize), Vec<usize>> = BTreeMap::new();

        let subjects: BTreeSet<ObjectKey> = sorted
            .iter()
            .filter_map(|i| tracks[*i].task.subject_key())
            .filter(|k| context.graph.contains(k))
            .collect();
        let layer_plan = plan_layers(&context.graph, &subjects);
        let cycles = layer_plan.cycles();
        let unsequenced = layer_plan.unsequenced();

        let depth_of = |key: &ObjectKey, layer: Layer| {
            layer_plan
                .layers
                .iter()
                .find(|l| l.layer == layer)
                .and_then(|l| l.ordering.depth.get(key).copied())
                .unwrap_or(0)
        };

        for index in sorted {
            let task = &tracks[index].task;
            if tracks[index].planned_grant.is_some() {
                let source = task.dependencies.first().filter(|k| subjects.contains(*k));
                match source {
                    Some(key) if unsequenced.contains(key) => {
                        plan.not_attempted.push((
                            index,
                            NotAttempted::new(task.id.clone(), NotAttemptedReason::BlockedByCycle)
                                .with_related(vec![key.clone()]),
                        ));
                    }
                    Some(key) => match layer_plan.layer_of(key) {
                        Some(layer) if layer >= Layer::Grants => {
                            let rank = 2 * depth_of(key, layer) + 1;
                            groups.entry((layer, rank)).or_default().push(index);
                        }
                        _ => groups.entry((Layer::Grants, 0)).or_default().push(index),
                    },
                    None => groups.entry((Layer::Grants, 0)).or_default().push(index),
                }
                continue;
            }

            let subject = task.subject_key().filter(|k| subjects.contains(k));
            let Some(key) = subject else {
                groups.entry((task.layer, 0)).or_default().push(index);
                continue;
            };

            if unsequenced.contains(&key) {
                plan.not_attempted.push((index, cycle_skip(task, &key, &cycles)));
                continue;
            }

            let planned = layer_plan.layer_of(&key).unwrap_or(task.layer);
            let layer = planned.max(task.layer);
            let rank = if layer == planned { 2 * depth_of(&key, layer) } else { 0 };
            groups.entry((layer, rank)).or_default().push(index);
        }

        plan.batches = into_batches(groups);
        plan
    }

    /// View-family tasks ordered by the chain sequencer
    fn plan_chain(&self, tracks: &[TaskTrack], sorted: Vec<usize>) -> RoundPlan {
        let mut plan = RoundPlan::default();
        let Some(context) = self.context.as_ref() else {
            plan.batches = sorted
                .into_iter()
                .enumerate()
                .map(|(wave, index)| Batch {
                    layer: tracks[index].task.layer,
                    wave,
                    members: vec![index],
                })
                .collect();
            return plan;
        };

        let subjects: BTreeSet<ObjectKey> = sorted
            .iter()
            .filter_map(|i| tracks[*i].task.subject_key())
            .filter(|k| context.graph.contains(k))
            .collect();
        let ordering: SequenceResult<ObjectKey> = chain::order_view_chain(&context.graph, Some(&subjects));
        let unsequenced = ordering.unsequenced();
        let last_wave = ordering.waves().len();

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for index in sorted {
            let task = &tracks[index].task;
            match task.subject_key().filter(|k| subjects.contains(k)) {
                Some(key) if unsequenced.contains(&key) => {
                    plan.not_attempted
                        .push((index, cycle_skip(task, &key, &ordering.cycles)));
                }
                Some(key) => {
                    let wave = ordering.depth.get(&key).copied().unwrap_or(0);
                    groups.entry(wave).or_default().push(index);
                }
                None => groups.entry(last_wave).or_default().push(index),
            }
        }

        plan.batches = groups
            .into_iter()
            .map(|(wave, members)| Batch {
                layer: Layer::ViewsAndSynonyms,
                wave,
                members,
            })
            .collect();
        plan
    }

    fn dispatch_for(&self, index: usize, track: &TaskTrack) -> Dispatch {
        let subject = track.task.subject_key();
        let grantee = subject
            .as_ref()
            .and_then(|key| self.context.as_ref()?.graph.target_of(key))
            .map_or_else(|| track.task.schema.clone(), |target| target.schema.clone());
        Dispatch {
            index,
            task: track.task.clone(),
            subject,
            grantee,
            planned_grant: track.planned_grant.clone(),
        }
    }

    /// Replay a worker report onto the task's state machine
    fn apply_report(&self, track: &mut TaskTrack, report: WorkerReport, round: u32) -> FixupResult<()> {
        let max_len = self.config.execution.diagnostic_max_len;
        for (i, attempt) in report.attempts.iter().enumerate() {
            let machine = &mut track.machine;
            if i > 0 {
                machine.transition(TaskEvent::Retry)?;
            }
            match attempt {
                Attempt::AlreadyPresent => {
                    machine.transition(TaskEvent::Skip("already present on target".to_string()))?;
                }
                Attempt::Succeeded => {
                    machine.transition(TaskEvent::Start)?;
                    machine.transition(TaskEvent::Succeed)?;
                }
                Attempt::Duplicate(diagnostic) => {
                    machine.transition(TaskEvent::Start)?;
                    machine.transition(TaskEvent::Skip(diagnostic.clone()))?;
                    track.last_category = Some(FailureCategory::DuplicateObject);
                    track.last_diagnostic = Some(truncate_diagnostic(diagnostic, max_len));
                }
                Attempt::Failed {
                    category,
                    diagnostic,
                } => {
                    machine.transition(TaskEvent::Start)?;
                    machine.transition(TaskEvent::fail_with_error(diagnostic.clone()))?;
                    track.last_category = Some(*category);
                    track.last_diagnostic = Some(truncate_diagnostic(diagnostic, max_len));
                }
                Attempt::Errored(message) => {
                    machine.transition(TaskEvent::Start)?;
                    machine.transition(TaskEvent::Error(message.clone()))?;
                    track.last_category = None;
                    track.last_diagnostic = Some(truncate_diagnostic(message, max_len));
                }
            }
        }
        let finished_duplicate = matches!(report.attempts.last(), Some(Attempt::Duplicate(_)));
        if track.machine.current_state().is_ok() && !finished_duplicate {
            track.last_category = None;
            track.last_diagnostic = None;
        }
        track.grants_applied.extend(report.grants_applied);
        track.final_round = round;

        let state = track.machine.current_state();
        log_task_operation(
            "execute",
            &track.task.id,
            round,
            &state.to_string(),
            track.last_category.map(|c| c.to_string()).as_deref(),
        );
        if matches!(state, TaskState::Failed | TaskState::Error) {
            log_error(
                "fixup_orchestrator",
                "execute",
                track.last_diagnostic.as_deref().unwrap_or(""),
                Some(&track.task.id),
            );
        }
        Ok(())
    }

    fn archive_if_done(&self, root: &Path, track: &mut TaskTrack) {
        let exec = &self.config.execution;
        if !exec.archive_done || !track.machine.current_state().is_ok() {
            return;
        }
        let TaskScript::File(path) = &track.task.script else {
            return;
        };
        match archive_task_file(root, &exec.done_dir, &track.task, path) {
            Ok(dest) => track.archived_to = Some(dest.display().to_string()),
            Err(e) => warn!(task_id = %track.task.id, error = %e, "Failed to archive task file"),
        }
    }

    fn mark_cancelled(&self, track: &mut TaskTrack, summary: &mut RunSummary) {
        track.excluded = true;
        summary
            .not_attempted
            .push(NotAttempted::new(track.task.id.clone(), NotAttemptedReason::Cancelled));
    }

    fn outcome_for(&self, track: &TaskTrack) -> TaskOutcome {
        let state = track.machine.current_state();
        TaskOutcome {
            task_id: track.task.id.clone(),
            layer: track.layer,
            state,
            attempts: track.machine.attempts(),
            final_round: track.final_round,
            category: track.last_category,
            diagnostic: if state == TaskState::Success {
                None
            } else {
                track.last_diagnostic.clone()
            },
            grants_applied: track.grants_applied.clone(),
            archived_to: track.archived_to.clone(),
        }
    }
}

/// Without a catalog graph: layers from task kinds, waves from the
/// dependencies each task declares on other tasks of its layer
fn plan_declared(tracks: &[TaskTrack], sorted: Vec<usize>) -> RoundPlan {
    let mut plan = RoundPlan::default();
    let mut by_layer: BTreeMap<Layer, Vec<usize>> = BTreeMap::new();
    for index in sorted {
        by_layer.entry(tracks[index].task.layer).or_default().push(index);
    }

    let mut groups: BTreeMap<(Layer, usize), Vec<usize>> = BTreeMap::new();
    for (layer, members) in by_layer {
        let owners: BTreeMap<ObjectKey, usize> = members
            .iter()
            .filter_map(|&i| tracks[i].task.subject_key().map(|key| (key, i)))
            .collect();
        let edges: Vec<(usize, usize)> = members
            .iter()
            .flat_map(|&i| {
                tracks[i]
                    .task
                    .dependencies
                    .iter()
                    .filter_map(|dep| owners.get(dep).copied())
                    .filter(move |&j| j != i)
                    .map(move |j| (i, j))
            })
            .collect();

        let ordering = order(members.iter().copied(), edges);
        for index in &ordering.sequence {
            let wave = ordering.depth.get(index).copied().unwrap_or(0);
            groups.entry((layer, wave)).or_default().push(*index);
        }
        for index in ordering.unsequenced() {
            let task = &tracks[index].task;
            let skip = match ordering.cycles.iter().find(|c| c.contains(&index)) {
                Some(cycle) => NotAttempted::new(task.id.clone(), NotAttemptedReason::Cycle)
                    .with_related(cycle.iter().filter_map(|i| tracks[*i].task.subject_key()).collect()),
                None => NotAttempted::new(task.id.clone(), NotAttemptedReason::BlockedByCycle),
            };
            plan.not_attempted.push((index, skip));
        }
    }

    for members in groups.values_mut() {
        members.sort_by(|a, b| tracks[*a].task.id.cmp(&tracks[*b].task.id));
    }
    plan.batches = into_batches(groups);
    plan
}

/// Batches in group order, waves renumbered densely within each layer
fn into_batches(groups: BTreeMap<(Layer, usize), Vec<usize>>) -> Vec<Batch> {
    let mut next_wave: BTreeMap<Layer, usize> = BTreeMap::new();
    groups
        .into_iter()
        .map(|((layer, _), members)| {
            let wave = next_wave.entry(layer).or_insert(0);
            let batch = Batch {
                layer,
                wave: *wave,
                members,
            };
            *wave += 1;
            batch
        })
        .collect()
}

fn cycle_skip(task: &RemediationTask, key: &ObjectKey, cycles: &[Vec<ObjectKey>]) -> NotAttempted {
    match cycles.iter().find(|c| c.contains(key)) {
        Some(cycle) => NotAttempted::new(task.id.clone(), NotAttemptedReason::Cycle).with_related(cycle.clone()),
        None => NotAttempted::new(task.id.clone(), NotAttemptedReason::BlockedByCycle),
    }
}

/// Run one batch on the worker pool and wait for all of it
async fn run_batch(shared: &Arc<WorkerShared>, dispatches: Vec<Dispatch>) -> FixupResult<Vec<WorkerReport>> {
    let mut set = JoinSet::new();
    for dispatch in dispatches {
        let shared = Arc::clone(shared);
        set.spawn(async move { execute_task(shared, dispatch).await });
    }

    let mut reports = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => return Err(FixupError::Internal(format!("task worker failed: {e}"))),
        }
    }
    reports.sort_by_key(|r| r.index);
    Ok(reports)
}

async fn execute_task(shared: Arc<WorkerShared>, dispatch: Dispatch) -> WorkerReport {
    let Ok(_permit) = Arc::clone(&shared.semaphore).acquire_owned().await else {
        return WorkerReport::cancelled(dispatch.index);
    };
    let strict = !shared.config.execution.is_iterative();
    if strict && shared.cancelled.load(Ordering::SeqCst) {
        return WorkerReport::cancelled(dispatch.index);
    }

    let report = execute_claimed(&shared, &dispatch).await;
    if strict
        && report.attempts.last().is_some_and(Attempt::is_terminal_failure)
        && !shared.cancelled.swap(true, Ordering::SeqCst)
    {
        warn!(task_id = %dispatch.task.id, "Strict mode: stopping further dispatch");
    }
    report
}

async fn execute_claimed(shared: &WorkerShared, dispatch: &Dispatch) -> WorkerReport {
    let timeout = shared.config.execution.task_timeout();
    let task = &dispatch.task;
    let mut report = WorkerReport {
        index: dispatch.index,
        attempts: Vec::new(),
        grants_applied: Vec::new(),
        cancelled: false,
    };

    let own_object = task.object_key();
    if shared.config.execution.idempotent {
        if let Some(key) = &own_object {
            match shared.cache.exists(key, shared.client.as_ref(), timeout).await {
                Ok(true) => {
                    report.attempts.push(Attempt::AlreadyPresent);
                    return report;
                }
                Ok(false) => {}
                Err(e) => warn!(task_id = %task.id, error = %e, "Existence check failed; executing anyway"),
            }
        }
    }

    if let Some(grant) = &dispatch.planned_grant {
        if !shared.planner.try_claim(grant) {
            report.attempts.push(Attempt::AlreadyPresent);
            return report;
        }
    }

    let script = match load_script(task).await {
        Ok(script) => script,
        Err(e) => {
            if let Some(grant) = &dispatch.planned_grant {
                shared.planner.release(grant);
            }
            report.attempts.push(Attempt::Errored(e.to_string()));
            return report;
        }
    };

    let first = run_once(shared, &script, timeout).await;
    if let Some(key) = &own_object {
        shared.cache.invalidate(key);
    }
    if let Some(grant) = &dispatch.planned_grant {
        if first == Attempt::Succeeded {
            shared.planner.mark_applied(grant);
            report.grants_applied.push(grant.label());
        } else {
            shared.planner.release(grant);
        }
    }

    let needs_grant = matches!(
        &first,
        Attempt::Failed { category: FailureCategory::PermissionDenied, .. }
    ) && dispatch.planned_grant.is_none();
    let diagnostic = match &first {
        Attempt::Failed { diagnostic, .. } => diagnostic.clone(),
        _ => String::new(),
    };
    report.attempts.push(first);

    if needs_grant {
        let (applied, retry) = apply_on_demand_grants(shared, dispatch, &diagnostic, timeout).await;
        report.grants_applied.extend(applied);
        if retry {
            debug!(task_id = %task.id, "Retrying once after privilege repair");
            let second = run_once(shared, &script, timeout).await;
            if let Some(key) = &own_object {
                shared.cache.invalidate(key);
            }
            report.attempts.push(second);
        }
    }
    report
}

/// Apply the grants a permission failure calls for. Returns the labels
/// applied here and whether a retry is worthwhile.
async fn apply_on_demand_grants(
    shared: &WorkerShared,
    dispatch: &Dispatch,
    diagnostic: &str,
    timeout: Duration,
) -> (Vec<String>, bool) {
    let wanted = shared
        .planner
        .on_demand(dispatch.subject.as_ref(), &dispatch.grantee, diagnostic);
    if wanted.is_empty() {
        warn!(task_id = %dispatch.task.id, "Permission denied but no grant could be derived");
        return (Vec::new(), false);
    }

    let mut applied = Vec::new();
    let mut available = false;
    for requirement in wanted {
        if !shared.planner.try_claim(&requirement) {
            available |= shared.planner.is_applied(&requirement);
            continue;
        }
        match shared.client.execute(&requirement.to_sql(), timeout).await {
            Ok(outcome) if outcome.success => {
                shared.planner.mark_applied(&requirement);
                info!(
                    task_id = %dispatch.task.id,
                    grant = %requirement.to_sql(),
                    "Applied on-demand grant"
                );
                applied.push(requirement.label());
            }
            Ok(outcome) => {
                shared.planner.release(&requirement);
                warn!(grant = %requirement.label(), output = %outcome.output.trim(), "On-demand grant failed");
            }
            Err(e) => {
                shared.planner.release(&requirement);
                warn!(grant = %requirement.label(), error = %e, "On-demand grant failed");
            }
        }
    }
    let retry = available || !applied.is_empty();
    (applied, retry)
}

async fn run_once(shared: &WorkerShared, script: &str, timeout: Duration) -> Attempt {
    match shared.client.execute(script, timeout).await {
        Ok(outcome) if outcome.success => Attempt::Succeeded,
        Ok(outcome) => {
            let category = shared.classifier.classify(&outcome.output);
            if category.is_soft_success() {
                Attempt::Duplicate(outcome.output)
            } else {
                Attempt::Failed {
                    category,
                    diagnostic: outcome.output,
                }
            }
        }
        Err(SqlClientError::Timeout(after)) => Attempt::Failed {
            category: FailureCategory::Timeout,
            diagnostic: format!("client timed out after {}s", after.as_secs()),
        },
        Err(e) => Attempt::Errored(e.to_string()),
    }
}

async fn load_script(task: &RemediationTask) -> FixupResult<String> {
    match &task.script {
        TaskScript::Inline(sql) => Ok(sql.clone()),
        TaskScript::File(path) => Ok(tokio::fs::read_to_string(path).await?),
    }
}
