mod common;

use common::mock_client::{Reply, ScriptedClient};
use common::{graph, key, write_task};
use schema_fixup::config::{ExecutionMode, FixupConfig, OrderingMode};
use schema_fixup::dependency::{Classifier, TargetSnapshot};
use schema_fixup::models::{BlacklistCategory, BlacklistEntry, ObjectType, RemediationTask, TaskKind};
use schema_fixup::orchestration::error_classifier::CategoryRule;
use schema_fixup::orchestration::{
    FailureCategory, FixupOrchestrator, NotAttemptedReason, RunOptions, StandardFailureClassifier,
};
use schema_fixup::sequencer::Layer;
use schema_fixup::state_machine::TaskState;
use std::sync::Arc;
use std::time::Duration;

fn single() -> FixupConfig {
    FixupConfig::default()
}

fn iterative(max_rounds: u32) -> FixupConfig {
    let mut config = FixupConfig::default();
    config.execution.mode = ExecutionMode::Iterative;
    config.execution.max_rounds = max_rounds;
    config
}

const DRY_RUN: RunOptions = RunOptions {
    dry_run: true,
    view_chain: false,
};

#[tokio::test]
async fn test_task_failing_twice_then_succeeding_counts_as_success() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "view/APP.V_ORDERS.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(
        &script,
        vec![
            Reply::Fail("ORA-00942: table or view does not exist".into()),
            Reply::Fail("ORA-00942: table or view does not exist".into()),
        ],
    );

    let orchestrator = FixupOrchestrator::new(iterative(3), client.clone());
    let summary = orchestrator.run(dir.path(), RunOptions::default()).await.unwrap();

    let outcome = summary.outcome("view/APP.V_ORDERS").unwrap();
    assert_eq!(outcome.state, TaskState::Success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.final_round, 3);
    assert_eq!(outcome.category, None);
    assert_eq!(outcome.diagnostic, None);
    assert_eq!(summary.rounds_run, 3);
    assert_eq!(summary.failure_count(), 0);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(client.executions_of(&script), 3);

    // archived so a rerun does not attempt it again
    assert!(dir.path().join("done/view/APP.V_ORDERS.sql").exists());
    assert!(!dir.path().join("view/APP.V_ORDERS.sql").exists());
}

#[tokio::test]
async fn test_single_mode_does_not_retry_missing_object() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "view/APP.V.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(&script, vec![Reply::Fail("ORA-00942: table or view does not exist".into())]);

    let summary = FixupOrchestrator::new(single(), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    let outcome = summary.outcome("view/APP.V").unwrap();
    assert_eq!(outcome.state, TaskState::Failed);
    assert_eq!(outcome.category, Some(FailureCategory::MissingObject));
    assert_eq!(summary.rounds_run, 1);
    assert_eq!(summary.exit_code(), 1);
    assert!(dir.path().join("view/APP.V.sql").exists());
}

#[tokio::test]
async fn test_retry_rounds_are_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "view/APP.V.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(
        &script,
        vec![Reply::Fail("ORA-00942: table or view does not exist".into()); 5],
    );

    let summary = FixupOrchestrator::new(iterative(2), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.outcome("view/APP.V").unwrap().state, TaskState::Failed);
    assert_eq!(client.executions_of(&script), 2);
    assert_eq!(summary.failures_by_category()[&FailureCategory::MissingObject], 1);
}

#[tokio::test]
async fn test_permission_denied_applies_one_grant_then_retries_once() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "view/REPORTING.V_ORDERS.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(
        &script,
        vec![Reply::Fail(
            "ORA-01031: insufficient privileges on SALES.ORDERS".into(),
        )],
    );

    // Reference not in the catalog, so the grant comes from the diagnostic
    let orders = key("SALES", "ORDERS", ObjectType::Table);
    let view = key("REPORTING", "V_ORDERS", ObjectType::View);
    let g = graph(&[orders.clone(), view.clone()], &[]);
    let report = Classifier::default().classify(&g, &[], &TargetSnapshot::new([orders], []));

    let orchestrator = FixupOrchestrator::new(single(), client.clone()).with_catalog(g, report);
    let summary = orchestrator.run(dir.path(), RunOptions::default()).await.unwrap();

    assert_eq!(
        client.executed(),
        vec![
            script.clone(),
            "GRANT SELECT ON SALES.ORDERS TO REPORTING;".to_string(),
            script.clone()
        ]
    );
    let outcome = summary.outcome("view/REPORTING.V_ORDERS").unwrap();
    assert_eq!(outcome.state, TaskState::Success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.grants_applied, vec!["SALES.ORDERS.SELECT.REPORTING".to_string()]);
    assert_eq!(summary.grants_applied, 1);
}

#[tokio::test]
async fn test_permission_denied_without_derivable_grant_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "view/APP.V.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(&script, vec![Reply::Fail("ORA-01031: insufficient privileges".into())]);

    let summary = FixupOrchestrator::new(iterative(3), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    let outcome = summary.outcome("view/APP.V").unwrap();
    assert_eq!(outcome.state, TaskState::Failed);
    assert_eq!(outcome.category, Some(FailureCategory::PermissionDenied));
    assert_eq!(client.executions_of(&script), 1);
    assert!(client.grant_executions().is_empty());
}

#[tokio::test]
async fn test_planned_grants_run_in_grants_layer_before_views() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "view/REPORTING.V_ORDERS.sql");
    let client = Arc::new(ScriptedClient::new());

    let orders = key("SALES", "ORDERS", ObjectType::Table);
    let view = key("REPORTING", "V_ORDERS", ObjectType::View);
    let g = graph(&[orders.clone(), view.clone()], &[(&view, &orders)]);
    let report = Classifier::default().classify(&g, &[], &TargetSnapshot::new([orders], []));
    let orchestrator = FixupOrchestrator::new(single(), client.clone()).with_catalog(g, report);

    let plan = orchestrator
        .run(dir.path(), DRY_RUN)
        .await
        .unwrap();
    assert!(client.executed().is_empty());
    let layers: Vec<Layer> = plan.planned_batches.iter().map(|b| b.layer).collect();
    assert_eq!(layers, vec![Layer::Grants, Layer::ViewsAndSynonyms]);
    assert_eq!(
        plan.planned_batches[0].tasks,
        vec!["grants/SALES.ORDERS.SELECT.REPORTING".to_string()]
    );

    let summary = orchestrator.run(dir.path(), RunOptions::default()).await.unwrap();
    assert_eq!(
        client.executed(),
        vec!["GRANT SELECT ON SALES.ORDERS TO REPORTING;".to_string(), script]
    );
    assert_eq!(summary.grants_applied, 1);
    assert_eq!(summary.exit_code(), 0);
    assert!(orchestrator.grant_planner().pending().is_empty());
}

#[tokio::test]
async fn test_grant_on_missing_view_runs_after_the_view_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let view_script = write_task(dir.path(), "view/REPORTING.V1.sql");
    let proc_script = write_task(dir.path(), "procedure/PORTAL.SHOW.sql");
    let client = Arc::new(ScriptedClient::new());

    let orders = key("SALES", "ORDERS", ObjectType::Table);
    let v1 = key("REPORTING", "V1", ObjectType::View);
    let show = key("PORTAL", "SHOW", ObjectType::Procedure);
    let g = graph(
        &[orders.clone(), v1.clone(), show.clone()],
        &[(&v1, &orders), (&show, &v1)],
    );
    let report = Classifier::default().classify(&g, &[], &TargetSnapshot::new([orders], []));
    let orchestrator = FixupOrchestrator::new(single(), client.clone()).with_catalog(g, report);

    let plan = orchestrator.run(dir.path(), DRY_RUN).await.unwrap();
    let batches: Vec<(Layer, usize, Vec<String>)> = plan
        .planned_batches
        .iter()
        .map(|b| (b.layer, b.wave, b.tasks.clone()))
        .collect();
    assert_eq!(
        batches,
        vec![
            (Layer::Grants, 0, vec!["grants/SALES.ORDERS.SELECT.REPORTING".to_string()]),
            (Layer::ViewsAndSynonyms, 0, vec!["view/REPORTING.V1".to_string()]),
            (Layer::ViewsAndSynonyms, 1, vec!["grants/REPORTING.V1.SELECT.PORTAL".to_string()]),
            (Layer::Procedural, 0, vec!["procedure/PORTAL.SHOW".to_string()]),
        ]
    );

    let summary = orchestrator.run(dir.path(), RunOptions::default()).await.unwrap();
    assert_eq!(
        client.executed(),
        vec![
            "GRANT SELECT ON SALES.ORDERS TO REPORTING WITH GRANT OPTION;".to_string(),
            view_script,
            "GRANT SELECT ON REPORTING.V1 TO PORTAL;".to_string(),
            proc_script,
        ]
    );
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(
        summary.outcome("grants/REPORTING.V1.SELECT.PORTAL").unwrap().layer,
        Layer::ViewsAndSynonyms
    );
}

#[tokio::test]
async fn test_grant_needed_with_and_without_option_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    write_task(dir.path(), "view/REPORTING.V1.sql");
    write_task(dir.path(), "view/REPORTING.V2.sql");
    let client = Arc::new(ScriptedClient::new());

    let orders = key("SALES", "ORDERS", ObjectType::Table);
    let v1 = key("REPORTING", "V1", ObjectType::View);
    let v2 = key("REPORTING", "V2", ObjectType::View);
    let show = key("PORTAL", "SHOW", ObjectType::Procedure);
    let g = graph(
        &[orders.clone(), v1.clone(), v2.clone(), show.clone()],
        &[(&v1, &orders), (&v2, &orders), (&show, &v1)],
    );
    let report = Classifier::default().classify(&g, &[], &TargetSnapshot::new([orders, show], []));

    let summary = FixupOrchestrator::new(single(), client.clone())
        .with_catalog(g, report)
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    let ids: Vec<&str> = summary.outcomes.iter().map(|o| o.task_id.as_str()).collect();
    let unique: std::collections::BTreeSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(summary.grants_planned, 2);

    let on_orders: Vec<String> = client
        .grant_executions()
        .into_iter()
        .filter(|sql| sql.contains("SALES.ORDERS"))
        .collect();
    assert_eq!(
        on_orders,
        vec!["GRANT SELECT ON SALES.ORDERS TO REPORTING WITH GRANT OPTION;".to_string()]
    );
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn test_existence_cache_observes_object_after_its_task() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "table/APP.ORDERS.sql");
    let orders = key("APP", "ORDERS", ObjectType::Table);
    let client = Arc::new(ScriptedClient::new());
    client.creates(&script, orders.clone());

    let mut config = single();
    config.execution.idempotent = true;
    let orchestrator = FixupOrchestrator::new(config, client.clone());
    let cache = orchestrator.existence_cache();
    let timeout = Duration::from_secs(1);

    assert!(!cache.exists(&orders, client.as_ref(), timeout).await.unwrap());

    let summary = orchestrator.run(dir.path(), RunOptions::default()).await.unwrap();
    assert_eq!(summary.outcome("table/APP.ORDERS").unwrap().state, TaskState::Success);

    assert_eq!(cache.cached(&orders), None);
    assert!(cache.exists(&orders, client.as_ref(), timeout).await.unwrap());
}

#[tokio::test]
async fn test_idempotent_mode_skips_present_objects() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "sequence/APP.ORDER_SEQ.sql");
    let client = Arc::new(ScriptedClient::new());
    client.mark_present(key("APP", "ORDER_SEQ", ObjectType::Sequence));

    let mut config = single();
    config.execution.idempotent = true;
    let summary = FixupOrchestrator::new(config, client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    let outcome = summary.outcome("sequence/APP.ORDER_SEQ").unwrap();
    assert_eq!(outcome.state, TaskState::Skipped);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(client.executions_of(&script), 0);
    assert_eq!(client.probes(), 1);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn test_duplicate_object_is_soft_success() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "table/APP.T.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(
        &script,
        vec![Reply::Fail(
            "ORA-00955: name is already used by an existing object".into(),
        )],
    );

    let summary = FixupOrchestrator::new(single(), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    let outcome = summary.outcome("table/APP.T").unwrap();
    assert_eq!(outcome.state, TaskState::Skipped);
    assert_eq!(outcome.category, Some(FailureCategory::DuplicateObject));
    assert_eq!(summary.exit_code(), 0);
    assert!(outcome.archived_to.is_some());
}

#[tokio::test]
async fn test_timeout_is_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "table/APP.BIG.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(&script, vec![Reply::Timeout]);

    let summary = FixupOrchestrator::new(single(), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();
    let outcome = summary.outcome("table/APP.BIG").unwrap();
    assert_eq!(outcome.category, Some(FailureCategory::Timeout));
    assert!(outcome.diagnostic.as_deref().unwrap().contains("timed out"));

    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "table/APP.BIG.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(&script, vec![Reply::Timeout]);
    let summary = FixupOrchestrator::new(iterative(2), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.outcome("table/APP.BIG").unwrap().state, TaskState::Success);
}

#[tokio::test]
async fn test_strict_mode_stops_dispatch_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let table = write_task(dir.path(), "table/APP.A.sql");
    let view = write_task(dir.path(), "view/APP.V.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(&table, vec![Reply::Fail("ORA-00922: missing or invalid option".into())]);

    let summary = FixupOrchestrator::new(single(), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(
        summary.outcome("table/APP.A").unwrap().category,
        Some(FailureCategory::SyntaxError)
    );
    assert!(summary.outcome("view/APP.V").is_none());
    assert_eq!(summary.not_attempted.len(), 1);
    assert_eq!(summary.not_attempted[0].task_id, "view/APP.V");
    assert_eq!(summary.not_attempted[0].reason, NotAttemptedReason::Cancelled);
    assert_eq!(client.executions_of(&view), 0);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_iterative_mode_runs_everything_despite_failures() {
    let dir = tempfile::tempdir().unwrap();
    let table = write_task(dir.path(), "table/APP.A.sql");
    let view = write_task(dir.path(), "view/APP.V.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(&table, vec![Reply::Fail("ORA-00922: missing or invalid option".into())]);

    let summary = FixupOrchestrator::new(iterative(3), client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.outcome("table/APP.A").unwrap().state, TaskState::Failed);
    assert_eq!(summary.outcome("view/APP.V").unwrap().state, TaskState::Success);
    assert_eq!(client.executions_of(&view), 1);
    assert_eq!(client.executions_of(&table), 1);
    assert_eq!(summary.rounds_run, 1);
}

#[tokio::test]
async fn test_unknown_directory_runs_in_final_layer() {
    let dir = tempfile::tempdir().unwrap();
    write_task(dir.path(), "mystery/APP.X.sql");
    write_task(dir.path(), "trigger/APP.TRG.sql");
    write_task(dir.path(), "table/APP.T.sql");
    let client = Arc::new(ScriptedClient::new());

    let plan = FixupOrchestrator::new(single(), client.clone())
        .run(dir.path(), DRY_RUN)
        .await
        .unwrap();

    let last = plan.planned_batches.last().unwrap();
    assert_eq!(last.layer, Layer::Unordered);
    assert_eq!(last.tasks, vec!["mystery/APP.X".to_string()]);
    assert_eq!(plan.planned_batches[0].layer, Layer::Tables);
    assert_eq!(plan.exit_code(), 0);
}

#[tokio::test]
async fn test_catalog_orders_view_chain_in_waves() {
    let dir = tempfile::tempdir().unwrap();
    let t_script = write_task(dir.path(), "table/APP.T.sql");
    let v1_script = write_task(dir.path(), "view/APP.V1.sql");
    let v2_script = write_task(dir.path(), "view/APP.V2.sql");

    let t = key("APP", "T", ObjectType::Table);
    let v1 = key("APP", "V1", ObjectType::View);
    let v2 = key("APP", "V2", ObjectType::View);
    let g = graph(&[t.clone(), v1.clone(), v2.clone()], &[(&v1, &t), (&v2, &v1)]);
    let report = Classifier::default().classify(&g, &[], &TargetSnapshot::default());

    let client = Arc::new(ScriptedClient::new());
    let summary = FixupOrchestrator::new(single(), client.clone())
        .with_catalog(g, report)
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    let batches: Vec<(Layer, usize, Vec<String>)> = summary
        .planned_batches
        .iter()
        .map(|b| (b.layer, b.wave, b.tasks.clone()))
        .collect();
    assert_eq!(
        batches,
        vec![
            (Layer::Tables, 0, vec!["table/APP.T".to_string()]),
            (Layer::ViewsAndSynonyms, 0, vec!["view/APP.V1".to_string()]),
            (Layer::ViewsAndSynonyms, 1, vec!["view/APP.V2".to_string()]),
        ]
    );
    assert_eq!(client.executed(), vec![t_script, v1_script, v2_script]);
}

#[tokio::test]
async fn test_blocked_and_unsupported_tasks_are_not_attempted() {
    let dir = tempfile::tempdir().unwrap();
    write_task(dir.path(), "table/APP.T.sql");
    write_task(dir.path(), "view/APP.V.sql");
    let n_script = write_task(dir.path(), "table/APP.N.sql");

    let t = key("APP", "T", ObjectType::Table);
    let v = key("APP", "V", ObjectType::View);
    let n = key("APP", "N", ObjectType::Table);
    let g = graph(&[t.clone(), v.clone(), n.clone()], &[(&v, &t)]);
    let blacklist = vec![BlacklistEntry::new(t.clone(), BlacklistCategory::UnsupportedDataType)];
    let report = Classifier::default().classify(&g, &blacklist, &TargetSnapshot::default());

    let client = Arc::new(ScriptedClient::new());
    let summary = FixupOrchestrator::new(single(), client.clone())
        .with_catalog(g, report)
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(client.executed(), vec![n_script]);
    assert_eq!(summary.outcome("table/APP.N").unwrap().state, TaskState::Success);

    let skipped: Vec<(&str, NotAttemptedReason)> = summary
        .not_attempted
        .iter()
        .map(|s| (s.task_id.as_str(), s.reason))
        .collect();
    assert_eq!(
        skipped,
        vec![
            ("table/APP.T", NotAttemptedReason::Unsupported),
            ("view/APP.V", NotAttemptedReason::Blocked)
        ]
    );
    assert_eq!(summary.not_attempted[1].root_cause, Some(t));
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_cycle_members_are_reported_not_executed() {
    let dir = tempfile::tempdir().unwrap();
    write_task(dir.path(), "procedure/APP.P1.sql");
    write_task(dir.path(), "procedure/APP.P2.sql");
    write_task(dir.path(), "function/APP.F.sql");

    let p1 = key("APP", "P1", ObjectType::Procedure);
    let p2 = key("APP", "P2", ObjectType::Procedure);
    let f = key("APP", "F", ObjectType::Function);
    let g = graph(
        &[p1.clone(), p2.clone(), f.clone()],
        &[(&p1, &p2), (&p2, &p1), (&f, &p1)],
    );
    let report = Classifier::default().classify(&g, &[], &TargetSnapshot::default());

    let client = Arc::new(ScriptedClient::new());
    let summary = FixupOrchestrator::new(single(), client.clone())
        .with_catalog(g, report)
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    assert!(client.executed().is_empty());
    let reasons: Vec<(&str, NotAttemptedReason)> = summary
        .not_attempted
        .iter()
        .map(|s| (s.task_id.as_str(), s.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("function/APP.F", NotAttemptedReason::BlockedByCycle),
            ("procedure/APP.P1", NotAttemptedReason::Cycle),
            ("procedure/APP.P2", NotAttemptedReason::Cycle),
        ]
    );
    assert_eq!(summary.not_attempted[1].related, vec![p1, p2]);
}

#[tokio::test]
async fn test_flat_ordering_runs_alphabetically_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let view = write_task(dir.path(), "view/APP.A.sql");
    let table = write_task(dir.path(), "table/APP.Z.sql");
    let client = Arc::new(ScriptedClient::new());

    let mut config = single();
    config.execution.ordering = OrderingMode::Flat;
    let summary = FixupOrchestrator::new(config, client.clone())
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.planned_batches.len(), 2);
    assert!(summary.planned_batches.iter().all(|b| b.tasks.len() == 1));
    assert_eq!(client.executed(), vec![table, view]);
}

#[tokio::test]
async fn test_view_chain_mode_only_runs_views() {
    let dir = tempfile::tempdir().unwrap();
    write_task(dir.path(), "table/APP.T.sql");
    write_task(dir.path(), "view/APP.A.sql");
    write_task(dir.path(), "view/APP.B.sql");

    let a = key("APP", "A", ObjectType::View);
    let b = key("APP", "B", ObjectType::View);
    let s = key("APP", "A_SYN", ObjectType::Synonym);
    let t = key("APP", "T", ObjectType::Table);
    let g = graph(
        &[a.clone(), b.clone(), s.clone(), t.clone()],
        &[(&b, &s), (&s, &a), (&a, &t)],
    );
    let report = Classifier::default().classify(&g, &[], &TargetSnapshot::default());

    let client = Arc::new(ScriptedClient::new());
    let plan = FixupOrchestrator::new(single(), client.clone())
        .with_catalog(g, report)
        .run(
            dir.path(),
            RunOptions {
                dry_run: true,
                view_chain: true,
            },
        )
        .await
        .unwrap();

    let waves: Vec<(usize, Vec<String>)> = plan
        .planned_batches
        .iter()
        .map(|b| (b.wave, b.tasks.clone()))
        .collect();
    assert_eq!(
        waves,
        vec![
            (0, vec!["view/APP.A".to_string()]),
            (1, vec!["view/APP.B".to_string()]),
        ]
    );
}

#[tokio::test]
async fn test_declared_dependencies_order_tasks_without_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let task = |name: &str, deps: &[&str]| {
        let rel = format!("table/APP.{name}.sql");
        write_task(dir.path(), &rel);
        RemediationTask::from_file(
            TaskKind::Object(ObjectType::Table),
            "APP",
            name,
            None,
            dir.path().join(&rel),
        )
        .with_dependencies(deps.iter().map(|d| key("APP", d, ObjectType::Table)).collect())
    };
    let tasks = vec![
        task("A_CHILD", &["Z_PARENT"]),
        task("Z_PARENT", &[]),
        task("LOOP_1", &["LOOP_2"]),
        task("LOOP_2", &["LOOP_1"]),
    ];

    let client = Arc::new(ScriptedClient::new());
    let summary = FixupOrchestrator::new(single(), client.clone())
        .run_tasks(tasks, None, RunOptions::default())
        .await
        .unwrap();

    let waves: Vec<(usize, Vec<String>)> = summary
        .planned_batches
        .iter()
        .map(|b| (b.wave, b.tasks.clone()))
        .collect();
    assert_eq!(
        waves,
        vec![
            (0, vec!["table/APP.Z_PARENT".to_string()]),
            (1, vec!["table/APP.A_CHILD".to_string()]),
        ]
    );
    let cycle: Vec<NotAttemptedReason> = summary.not_attempted.iter().map(|s| s.reason).collect();
    assert_eq!(cycle, vec![NotAttemptedReason::Cycle, NotAttemptedReason::Cycle]);
    assert_eq!(summary.not_attempted[0].related.len(), 2);
    assert_eq!(summary.count(TaskState::Success), 2);
    // nothing archived without a task root
    assert!(dir.path().join("table/APP.Z_PARENT.sql").exists());
}

#[tokio::test]
async fn test_custom_failure_rules_control_retry() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_task(dir.path(), "table/APP.LOCKED.sql");
    let client = Arc::new(ScriptedClient::new());
    client.reply(
        &script,
        vec![Reply::Fail("ORA-00054: resource busy and acquire with NOWAIT specified".into())],
    );

    let busy_is_transient = StandardFailureClassifier::with_rules(vec![CategoryRule {
        category: Some(FailureCategory::Timeout),
        ora_codes: vec![54],
        ..CategoryRule::default()
    }]);
    let summary = FixupOrchestrator::new(iterative(2), client.clone())
        .with_classifier(Arc::new(busy_is_transient))
        .run(dir.path(), RunOptions::default())
        .await
        .unwrap();

    let outcome = summary.outcome("table/APP.LOCKED").unwrap();
    assert_eq!(outcome.state, TaskState::Success);
    assert_eq!(outcome.attempts, 2);
}
