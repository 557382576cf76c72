//! Integration tests for task queries, status transitions, and
//! plan materialization against a real (temp-file) store.

use taskboard_db::models::TaskStatus;
use taskboard_db::queries::tasks::{self, NewTaskSpec};
use taskboard_db::queries::workspaces::create_workspace;
use taskboard_test_utils::TestDb;

#[tokio::test]
async fn ready_tasks_are_ordered_by_priority_then_age() {
    let db = TestDb::new().await;
    let ws = create_workspace(&db.pool, "ws", "goal", "", 3, "/work").await.unwrap();

    let low = tasks::create_task(&db.pool, ws.id, "low", "", "p", 3, &[], &[], 0, TaskStatus::Ready)
        .await
        .unwrap();
    let critical = tasks::create_task(&db.pool, ws.id, "critical", "", "p", 0, &[], &[], 0, TaskStatus::Ready)
        .await
        .unwrap();
    let normal = tasks::create_task(&db.pool, ws.id, "normal", "", "p", 2, &[], &[], 0, TaskStatus::Ready)
        .await
        .unwrap();

    let ready = tasks::get_ready_tasks(&db.pool, ws.id, 10).await.unwrap();
    let ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec![critical.id.as_str(), normal.id.as_str(), low.id.as_str()]);
}

#[tokio::test]
async fn full_lifecycle_ready_running_done() {
    let db = TestDb::new().await;
    let ws = create_workspace(&db.pool, "ws", "goal", "", 3, "/work").await.unwrap();
    let task = tasks::create_task(&db.pool, ws.id, "t1", "", "p", 2, &[], &[], 1, TaskStatus::Ready)
        .await
        .unwrap();

    assert!(tasks::mark_running(&db.pool, &task.id, "session-1").await.unwrap());
    let running = tasks::get_task(&db.pool, &task.id).await.unwrap().unwrap();
    assert_eq!(running.status, TaskStatus::Running);
    assert!(running.started_at.is_some());
    assert_eq!(running.assigned_session.as_deref(), Some("session-1"));

    assert!(tasks::mark_done(&db.pool, &task.id, "finished").await.unwrap());
    let done = tasks::get_task(&db.pool, &task.id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    assert_eq!(done.result.as_deref(), Some("finished"));
    assert!(done.assigned_session.is_none());
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn retry_from_running_increments_count_and_goes_back_to_ready() {
    let db = TestDb::new().await;
    let ws = create_workspace(&db.pool, "ws", "goal", "", 3, "/work").await.unwrap();
    let task = tasks::create_task(&db.pool, ws.id, "t1", "", "p", 2, &[], &[], 2, TaskStatus::Ready)
        .await
        .unwrap();

    tasks::mark_running(&db.pool, &task.id, "s1").await.unwrap();
    assert!(tasks::retry_from_running(&db.pool, &task.id, "transient failure").await.unwrap());

    let retried = tasks::get_task(&db.pool, &task.id).await.unwrap().unwrap();
    assert_eq!(retried.status, TaskStatus::Ready);
    assert_eq!(retried.retry_count, 1);
    assert_eq!(retried.error.as_deref(), Some("transient failure"));
    assert!(retried.started_at.is_none());
}

#[tokio::test]
async fn mark_failed_is_terminal_after_retry_budget_exhausted() {
    let db = TestDb::new().await;
    let ws = create_workspace(&db.pool, "ws", "goal", "", 3, "/work").await.unwrap();
    let task = tasks::create_task(&db.pool, ws.id, "t1", "", "p", 2, &[], &[], 0, TaskStatus::Ready)
        .await
        .unwrap();

    tasks::mark_running(&db.pool, &task.id, "s1").await.unwrap();
    assert!(tasks::mark_failed(&db.pool, &task.id, "out of retries").await.unwrap());

    let failed = tasks::get_task(&db.pool, &task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.status.is_terminal() == false, "failed is retryable, not terminal");
    assert!(tasks::cancel_task(&db.pool, &task.id).await.unwrap());
    let cancelled = tasks::get_task(&db.pool, &task.id).await.unwrap().unwrap();
    assert!(cancelled.status.is_terminal());
}

#[tokio::test]
async fn promote_to_ready_only_affects_backlog_tasks() {
    let db = TestDb::new().await;
    let ws = create_workspace(&db.pool, "ws", "goal", "", 3, "/work").await.unwrap();
    let task = tasks::create_task(&db.pool, ws.id, "t1", "", "p", 2, &[], &[], 0, TaskStatus::Backlog)
        .await
        .unwrap();

    assert!(tasks::promote_to_ready(&db.pool, &task.id).await.unwrap());
    assert!(!tasks::promote_to_ready(&db.pool, &task.id).await.unwrap(), "second promotion is a no-op");
}

#[tokio::test]
async fn create_from_plan_materializes_dag_and_dependents_query_works() {
    let db = TestDb::new().await;
    let specs = vec![
        NewTaskSpec {
            title: "design".into(),
            description: "".into(),
            prompt: "design the api".into(),
            priority: 1,
            depends_on_indices: vec![],
            tags: vec!["design".into()],
            max_retries: 1,
        },
        NewTaskSpec {
            title: "implement".into(),
            description: "".into(),
            prompt: "implement the api".into(),
            priority: 2,
            depends_on_indices: vec![0],
            tags: vec![],
            max_retries: 1,
        },
        NewTaskSpec {
            title: "document".into(),
            description: "".into(),
            prompt: "write docs".into(),
            priority: 3,
            depends_on_indices: vec![0],
            tags: vec![],
            max_retries: 0,
        },
    ];

    let (workspace_id, created) = tasks::create_from_plan(
        &db.pool,
        "api project",
        "ship a rest api",
        "",
        2,
        "/work",
        &specs,
    )
    .await
    .unwrap();

    assert_eq!(created.len(), 3);
    assert_eq!(created[0].status, TaskStatus::Ready);
    assert_eq!(created[1].status, TaskStatus::Backlog);
    assert_eq!(created[2].status, TaskStatus::Backlog);

    let dependents = tasks::get_dependents(&db.pool, workspace_id, &created[0].id).await.unwrap();
    let dependent_ids: std::collections::HashSet<&str> =
        dependents.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(dependent_ids.len(), 2);
    assert!(dependent_ids.contains(created[1].id.as_str()));
    assert!(dependent_ids.contains(created[2].id.as_str()));
}

#[tokio::test]
async fn count_by_status_reflects_live_transitions() {
    let db = TestDb::new().await;
    let ws = create_workspace(&db.pool, "ws", "goal", "", 3, "/work").await.unwrap();
    tasks::create_task(&db.pool, ws.id, "a", "", "p", 2, &[], &[], 0, TaskStatus::Ready)
        .await
        .unwrap();
    tasks::create_task(&db.pool, ws.id, "b", "", "p", 2, &[], &[], 0, TaskStatus::Backlog)
        .await
        .unwrap();

    let counts = tasks::count_by_status(&db.pool, ws.id).await.unwrap();
    assert_eq!(counts.ready, 1);
    assert_eq!(counts.backlog, 1);
    assert_eq!(counts.total(), 2);
}

#[tokio::test]
async fn recover_running_tasks_is_global_crash_recovery() {
    let db = TestDb::new().await;
    let ws = create_workspace(&db.pool, "ws", "goal", "", 3, "/work").await.unwrap();
    let a = tasks::create_task(&db.pool, ws.id, "a", "", "p", 2, &[], &[], 0, TaskStatus::Ready)
        .await
        .unwrap();
    let b = tasks::create_task(&db.pool, ws.id, "b", "", "p", 2, &[], &[], 0, TaskStatus::Ready)
        .await
        .unwrap();
    tasks::mark_running(&db.pool, &a.id, "s1").await.unwrap();
    tasks::mark_running(&db.pool, &b.id, "s2").await.unwrap();

    let recovered = tasks::recover_running_tasks(&db.pool).await.unwrap();
    assert_eq!(recovered, 2);

    let global = tasks::global_count_by_status(&db.pool).await.unwrap();
    assert_eq!(global.ready, 2);
    assert_eq!(global.running, 0);
}
