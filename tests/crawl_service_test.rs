//! Crawl coordination service behavior over the SQLite store
//!
//! Covers the terminal-state, progress, ownership and metadata rules, the
//! two end-to-end task scenarios, and concurrent transitions on one task.

mod common;

use std::time::Duration;

use blogd::crawl::{
    CompleteTaskRequest, CrawlError, FailTaskRequest, ListTasksRequest, TransitionError,
    UpdateTaskStatusRequest,
};
use blogd::models::CrawlTaskStatus;
use blogd::storage::CrawlTaskRepository;
use common::{crawl_service, metadata, register, register_with_metadata, TOKEN_A, TOKEN_B};
use serde_json::json;

fn update(status: &str, progress: i64, message: &str) -> UpdateTaskStatusRequest {
    UpdateTaskStatusRequest {
        status: status.to_string(),
        progress,
        message: message.to_string(),
    }
}

fn complete(message: &str) -> CompleteTaskRequest {
    CompleteTaskRequest {
        message: message.to_string(),
        metadata: None,
    }
}

fn fail(error: &str) -> FailTaskRequest {
    FailTaskRequest {
        message: "crawl failed".to_string(),
        error: error.to_string(),
        metadata: None,
    }
}

// ============================================================================
// Terminal states
// ============================================================================

#[tokio::test]
async fn test_terminal_task_rejects_every_transition() {
    let (service, store, _hub) = crawl_service();

    register(&service, "done", TOKEN_A).await;
    service.complete_task("done", complete("ok"), TOKEN_A).await.unwrap();
    register(&service, "broken", TOKEN_A).await;
    service.fail_task("broken", fail("boom"), TOKEN_A).await.unwrap();

    for (task_id, expected) in [
        ("done", TransitionError::AlreadyCompleted),
        ("broken", TransitionError::AlreadyFailed),
    ] {
        let before = store.get_task(task_id).await.unwrap().unwrap();

        let results = [
            service.update_task_status(task_id, update("running", 10, "again"), TOKEN_A).await,
            service.complete_task(task_id, complete("again"), TOKEN_A).await,
            service.fail_task(task_id, fail("again"), TOKEN_A).await,
        ];
        for result in results {
            match result {
                Err(CrawlError::Transition(e)) => assert_eq!(e, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
        }

        let after = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(before, after, "terminal task {task_id} must be unchanged");
    }
}

#[tokio::test]
async fn test_duration_is_stable_once_written() {
    let (service, store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;

    let completed = service.complete_task("t", complete("done"), TOKEN_A).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let _ = service.fail_task("t", fail("late"), TOKEN_A).await;

    let stored = store.get_task("t").await.unwrap().unwrap();
    assert_eq!(stored.end_time, completed.end_time);
    assert_eq!(stored.duration_seconds, completed.duration_seconds);
}

// ============================================================================
// Progress range
// ============================================================================

#[tokio::test]
async fn test_out_of_range_progress_is_rejected_without_mutation() {
    let (service, store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;
    service.update_task_status("t", update("running", 40, "working"), TOKEN_A).await.unwrap();
    let before = store.get_task("t").await.unwrap().unwrap();

    for progress in [-1, 101] {
        let err = service
            .update_task_status("t", update("running", progress, "bad"), TOKEN_A)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CrawlError::Transition(TransitionError::InvalidProgress(p)) if p == progress
        ));
    }

    let after = store.get_task("t").await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(after.progress, 40);
}

#[tokio::test]
async fn test_boundary_progress_is_accepted() {
    let (service, _store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;

    let task = service.update_task_status("t", update("running", 0, ""), TOKEN_A).await.unwrap();
    assert_eq!(task.progress, 0);
    let task = service.update_task_status("t", update("running", 100, ""), TOKEN_A).await.unwrap();
    assert_eq!(task.progress, 100);
    assert_eq!(task.status, CrawlTaskStatus::Running);
}

// ============================================================================
// Ownership
// ============================================================================

#[tokio::test]
async fn test_only_creating_token_may_mutate() {
    let (service, store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;
    let before = store.get_task("t").await.unwrap().unwrap();

    let results = [
        service.update_task_status("t", update("running", 50, "hijack"), TOKEN_B).await,
        service.complete_task("t", complete("hijack"), TOKEN_B).await,
        service.fail_task("t", fail("hijack"), TOKEN_B).await,
    ];
    for result in results {
        assert!(matches!(
            result,
            Err(CrawlError::Transition(TransitionError::Unauthorized))
        ));
    }

    assert_eq!(store.get_task("t").await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_unauthorized_is_reported_before_terminal_state() {
    let (service, _store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;
    service.complete_task("t", complete("done"), TOKEN_A).await.unwrap();

    let err = service.fail_task("t", fail("x"), TOKEN_B).await.unwrap_err();
    assert!(matches!(err, CrawlError::Transition(TransitionError::Unauthorized)));
}

// ============================================================================
// Completion and metadata
// ============================================================================

#[tokio::test]
async fn test_complete_forces_full_progress() {
    let (service, _store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;
    service.update_task_status("t", update("running", 37, "partway"), TOKEN_A).await.unwrap();

    let task = service.complete_task("t", complete(""), TOKEN_A).await.unwrap();
    assert_eq!(task.progress, 100);
    assert_eq!(task.status, CrawlTaskStatus::Completed);
}

#[tokio::test]
async fn test_fail_merges_but_complete_replaces_metadata() {
    let (service, _store, _hub) = crawl_service();
    let prior = json!({"source": "rss", "pages": 4});

    register_with_metadata(&service, "merged", TOKEN_A, Some(metadata(prior.clone()))).await;
    let failed = service
        .fail_task(
            "merged",
            FailTaskRequest {
                message: String::new(),
                error: "timeout".to_string(),
                metadata: Some(metadata(json!({"pages": 5}))),
            },
            TOKEN_A,
        )
        .await
        .unwrap();
    assert_eq!(
        serde_json::Value::Object(failed.metadata.unwrap()),
        json!({"source": "rss", "pages": 5, "error": "timeout"})
    );

    register_with_metadata(&service, "replaced", TOKEN_A, Some(metadata(prior))).await;
    let completed = service
        .complete_task(
            "replaced",
            CompleteTaskRequest {
                message: "done".to_string(),
                metadata: Some(metadata(json!({"articles": 12}))),
            },
            TOKEN_A,
        )
        .await
        .unwrap();
    assert_eq!(
        serde_json::Value::Object(completed.metadata.unwrap()),
        json!({"articles": 12})
    );
}

#[tokio::test]
async fn test_complete_without_metadata_keeps_existing() {
    let (service, _store, _hub) = crawl_service();
    register_with_metadata(&service, "t", TOKEN_A, Some(metadata(json!({"source": "x"})))).await;

    let task = service.complete_task("t", complete("done"), TOKEN_A).await.unwrap();
    assert_eq!(serde_json::Value::Object(task.metadata.unwrap()), json!({"source": "x"}));
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn test_register_complete_then_fail_scenario() {
    let (service, store, _hub) = crawl_service();

    let task = register(&service, "t1", TOKEN_A).await;
    assert_eq!(task.status, CrawlTaskStatus::Running);
    assert_eq!(task.progress, 0);
    assert!(task.end_time.is_none());
    assert!(task.duration_seconds.is_none());

    let task = service.complete_task("t1", complete("done"), TOKEN_A).await.unwrap();
    assert_eq!(task.status, CrawlTaskStatus::Completed);
    assert_eq!(task.progress, 100);
    assert_eq!(task.message, "done");
    let end_time = task.end_time.expect("end_time set");
    let duration = task.duration_seconds.expect("duration set");
    assert!(duration >= 0);
    assert_eq!(duration, (end_time - task.start_time).num_seconds());

    let err = service.fail_task("t1", fail("late"), TOKEN_A).await.unwrap_err();
    assert!(matches!(err, CrawlError::Transition(TransitionError::AlreadyCompleted)));
    assert_eq!(
        store.get_task("t1").await.unwrap().unwrap().status,
        CrawlTaskStatus::Completed
    );
}

#[tokio::test]
async fn test_fail_metadata_scenario() {
    let (service, _store, _hub) = crawl_service();
    register_with_metadata(&service, "t2", TOKEN_A, Some(metadata(json!({"source": "x"})))).await;

    let task = service
        .fail_task(
            "t2",
            FailTaskRequest {
                message: String::new(),
                error: "timeout".to_string(),
                metadata: Some(metadata(json!({"retries": 3}))),
            },
            TOKEN_A,
        )
        .await
        .unwrap();

    assert_eq!(task.status, CrawlTaskStatus::Failed);
    assert!(task.end_time.is_some());
    assert_eq!(
        serde_json::Value::Object(task.metadata.unwrap()),
        json!({"source": "x", "error": "timeout", "retries": 3})
    );
}

#[tokio::test]
async fn test_duplicate_and_unknown_identifiers() {
    let (service, _store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;

    let err = service
        .register_task(
            blogd::crawl::RegisterTaskRequest {
                task_id: "t".to_string(),
                task_name: "again".to_string(),
                metadata: None,
            },
            TOKEN_B,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::AlreadyExists(_)));

    let err = service.complete_task("missing", complete(""), TOKEN_A).await.unwrap_err();
    assert!(matches!(err, CrawlError::NotFound(_)));
    assert!(err.is_caller_error());
}

#[tokio::test]
async fn test_listing_and_lookup() {
    let (service, _store, _hub) = crawl_service();
    for i in 0..5 {
        register(&service, &format!("task-{i}"), TOKEN_A).await;
    }
    service.complete_task("task-1", complete(""), TOKEN_A).await.unwrap();

    let page = service
        .list_tasks(&ListTasksRequest {
            page: Some(1),
            page_size: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items[0].task_id, "task-4", "newest first");

    let completed = service
        .list_tasks(&ListTasksRequest {
            status: Some("completed".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(completed.total, 1);
    assert_eq!(completed.page_size, 20);

    let err = service
        .list_tasks(&ListTasksRequest {
            status: Some("paused".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::InvalidRequest(_)));

    let by_key = service.get_task("task-3").await.unwrap();
    let by_id = service.get_task(&by_key.id.to_string()).await.unwrap();
    assert_eq!(by_key, by_id);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_update_and_complete_never_interleave() {
    let (service, store, _hub) = crawl_service();

    for round in 0..25 {
        let task_id = format!("race-{round}");
        register(&service, &task_id, TOKEN_A).await;

        let updater = {
            let service = service.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move {
                service
                    .update_task_status(&task_id, update("running", 50, "halfway"), TOKEN_A)
                    .await
            })
        };
        let completer = {
            let service = service.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move { service.complete_task(&task_id, complete("done"), TOKEN_A).await })
        };

        let updated = updater.await.unwrap();
        let completed = completer.await.unwrap();
        assert!(completed.is_ok(), "complete must win or follow the update: {completed:?}");

        let stored = store.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(stored.status, CrawlTaskStatus::Completed);
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.message, "done");
        assert!(stored.end_time.is_some() && stored.duration_seconds.is_some());

        // The update either landed first or observed the terminal state
        match updated {
            Ok(task) => {
                assert_eq!(task.status, CrawlTaskStatus::Running);
                assert_eq!(task.progress, 50);
            }
            Err(CrawlError::Transition(TransitionError::AlreadyCompleted)) => {}
            Err(other) => panic!("unexpected update error: {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_terminal_transitions_have_one_winner() {
    let (service, store, _hub) = crawl_service();
    register(&service, "t", TOKEN_A).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service.complete_task("t", complete("done"), TOKEN_A).await
            } else {
                service.fail_task("t", fail("boom"), TOKEN_A).await
            }
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CrawlError::Transition(
                TransitionError::AlreadyCompleted | TransitionError::AlreadyFailed,
            )) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);

    let stored = store.get_task("t").await.unwrap().unwrap();
    assert!(stored.status.is_terminal());
}
