//! End-to-end control-loop scenarios over a real SQLite store.

mod common;

use common::{ambiguous_verdict, Harness};
use homr::domain::models::{
    ActivityKind, ActivityQuery, AutoResolveMode, EscalationStatus, FailurePattern, InjectionTarget,
    PatternRecommendation, Task, TaskPriority, TaskStatus, Worker, SKIPPED_MARKER,
};
use homr::services::EscalationCategory;
use homr::DomainError;

#[tokio::test]
async fn test_multiple_approaches_pauses_only_the_trigger() {
    let h = Harness::new().await;
    let outcome = h.outcome("Orders", "Expose order management to partners").await;
    let a = h
        .tasks
        .create_task(
            Task::new(outcome.id, "Build orders endpoints", "Expose orders over an HTTP interface")
                .with_priority(TaskPriority::High),
        )
        .await
        .unwrap();
    let b = h.task(&outcome, "Write deployment docs", "Document the release process").await;
    let c = h.task(&outcome, "Configure logging levels", "Tune verbosity per module").await;

    let claimed = h.tasks.claim_next(outcome.id, "worker-1").await.unwrap().unwrap();
    assert_eq!(claimed.id, a.id);
    h.tasks.finish_task(a.id, true).await.unwrap();

    h.observer_says(&ambiguous_verdict(
        "multiple_approaches",
        "Should the orders interface use REST or GraphQL?",
        &[("rest", "REST"), ("graphql", "GraphQL")],
    ))
    .await;
    let report = h.supervisor.on_task_completed(a.id, "Implemented a draft.", true).await.unwrap();

    assert!(report.errors.is_empty(), "unexpected stage errors: {:?}", report.errors);
    let escalation = report.escalation.expect("an escalation should be created");
    assert_eq!(escalation.affected_tasks, vec![a.id]);
    assert_eq!(escalation.question.options.len(), 2);
    assert!(report.auto_resolve.is_none(), "manual outcomes are never auto-resolved");

    let a = h.reload(&a).await;
    assert_eq!(a.status, TaskStatus::Pending);
    assert!(a.is_paused());
    assert!(!h.reload(&b).await.is_paused());
    assert!(!h.reload(&c).await.is_paused());

    let next = h.tasks.claim_next(outcome.id, "worker-1").await.unwrap().unwrap();
    assert_ne!(next.id, a.id, "paused tasks are never claimed");
}

#[tokio::test]
async fn test_answering_resumes_with_must_know_context() {
    let h = Harness::new().await;
    let outcome = h.outcome("Orders", "Expose order management to partners").await;
    let a = h.task(&outcome, "Build orders endpoints", "Expose orders over an HTTP interface").await;

    h.observer_says(&ambiguous_verdict(
        "multiple_approaches",
        "Should the orders interface use REST or GraphQL?",
        &[("rest", "REST"), ("graphql", "GraphQL")],
    ))
    .await;
    let escalation = h
        .supervisor
        .on_task_completed(a.id, "Draft ready.", true)
        .await
        .unwrap()
        .escalation
        .unwrap();

    let resolution = h
        .supervisor
        .answer_escalation(escalation.id, "rest", Some("Partners already speak REST".to_string()))
        .await
        .unwrap();
    assert_eq!(resolution.resumed_tasks, vec![a.id]);
    assert!(!h.reload(&a).await.is_paused());

    let stored = h.supervisor.get_escalation(escalation.id).await.unwrap();
    assert_eq!(stored.status, EscalationStatus::Answered);

    let store = h.supervisor.context().load_or_create(outcome.id).await.unwrap();
    assert_eq!(store.decisions.len(), 1);
    assert!(store
        .injections
        .iter()
        .any(|i| i.target == InjectionTarget::Task(a.id) && i.content.contains("REST")));

    let err = h.supervisor.answer_escalation(escalation.id, "graphql", None).await.unwrap_err();
    assert!(matches!(err, DomainError::EscalationNotPending { .. }), "got: {err}");
}

#[tokio::test]
async fn test_skip_option_fails_the_task_without_injection() {
    let h = Harness::new().await;
    let outcome = h.outcome("Orders", "Expose order management to partners").await;
    let a = h.task(&outcome, "Build orders endpoints", "Expose orders over an HTTP interface").await;

    h.observer_says(&ambiguous_verdict(
        "unclear_requirement",
        "Is pagination required for the orders listing?",
        &[("add_pagination", "Add pagination"), ("skip", "Skip this task")],
    ))
    .await;
    let escalation = h
        .supervisor
        .on_task_completed(a.id, "Listing done.", true)
        .await
        .unwrap()
        .escalation
        .unwrap();

    let resolution = h.supervisor.answer_escalation(escalation.id, "skip", None).await.unwrap();
    assert_eq!(resolution.skipped_tasks, vec![a.id]);
    assert!(resolution.resumed_tasks.is_empty());

    let a = h.reload(&a).await;
    assert_eq!(a.status, TaskStatus::Failed);
    assert!(a.description.starts_with(SKIPPED_MARKER));

    let store = h.supervisor.context().load_or_create(outcome.id).await.unwrap();
    assert!(store.injections.iter().all(|i| i.target != InjectionTarget::Task(a.id)));
}

#[tokio::test]
async fn test_three_failures_escalate_and_pause_workers() {
    let h = Harness::new().await;
    let outcome = h.outcome("Importer", "Import legacy invoices").await;
    let other = h.outcome("Unrelated", "Something else entirely").await;
    h.workers.add_worker(Worker::new("w1", outcome.id)).await;
    h.workers.add_worker(Worker::new("w2", other.id)).await;

    let mut last = None;
    for i in 0..3 {
        let task = h.task(&outcome, &format!("Import batch {i}"), "Load one batch").await;
        last = Some(h.supervisor.on_task_completed(task.id, "", false).await.unwrap());
    }

    let report = last.unwrap();
    let pattern = report.failure_pattern.expect("failure patterns are checked");
    assert_eq!(pattern.pattern, Some(FailurePattern::ConsecutiveFailures));
    assert_eq!(pattern.recommendation, PatternRecommendation::Escalate);
    assert_eq!(pattern.consecutive_failures, 3);
    assert_eq!(pattern.paused_workers, vec!["w1".to_string()]);
    assert_eq!(h.workers.paused().await, vec!["w1".to_string()]);

    let of_kind = |kind| ActivityQuery {
        outcome_id: Some(outcome.id),
        kind: Some(kind),
        ..Default::default()
    };
    let observations = h.supervisor.activity(&of_kind(ActivityKind::Observation)).await.unwrap();
    assert_eq!(observations.len(), 3);
    let patterns = h.supervisor.activity(&of_kind(ActivityKind::Escalation)).await.unwrap();
    assert_eq!(patterns.len(), 1, "only the escalating pattern is logged");
}

#[tokio::test]
async fn test_disabled_outcome_is_skipped() {
    let h = Harness::new().await;
    let outcome = h.outcome("Quiet", "Nothing to supervise").await;
    let task = h.task(&outcome, "Do a thing", "").await;
    h.supervisor.set_enabled(outcome.id, false).await.unwrap();

    let report = h.supervisor.on_task_completed(task.id, "I'm not sure which approach", true).await.unwrap();
    assert!(report.skipped);
    assert!(report.observation.is_none());
    assert!(report.escalation.is_none());
    assert!(h.completion.requests().await.is_empty());
}

#[tokio::test]
async fn test_unavailable_model_still_detects_ambiguity() {
    let h = Harness::new().await;
    let outcome = h.outcome("Search", "Add product search").await;
    let task = h.task(&outcome, "Index products", "Build the search index").await;

    // No scripted responses: observer and question generation both fail.
    let report = h
        .supervisor
        .on_task_completed(task.id, "Indexed.\nI cannot proceed until someone picks an engine.", true)
        .await
        .unwrap();

    assert!(report.observation.is_none());
    let escalation = report.escalation.expect("regex fallback should escalate");
    assert_eq!(escalation.question.options.len(), 2, "default question has two options");
    assert!(escalation.affected_tasks.contains(&task.id));
    assert!(h.reload(&task).await.is_paused());
}

#[tokio::test]
async fn test_full_auto_never_resolves_security() {
    let h = Harness::new().await;
    let outcome = h
        .outcome_with_mode("Payments", "Accept card payments", AutoResolveMode::FullAuto)
        .await;
    let task = h.task(&outcome, "Wire payment provider", "Call the provider SDK").await;

    h.observer_says(&ambiguous_verdict(
        "blocking_decision",
        "Where should the provider API token be stored?",
        &[("vault", "Secret vault"), ("env", "Environment variable")],
    ))
    .await;
    h.auto_resolver_says(r#"{"should_auto_resolve": true, "selected_option": "vault", "reasoning": "obvious", "confidence": 0.99}"#)
        .await;

    let report = h.supervisor.on_task_completed(task.id, "SDK wired.", true).await.unwrap();
    let attempt = report.auto_resolve.expect("full-auto attempts immediately");
    assert!(!attempt.resolved);
    assert_eq!(attempt.category, EscalationCategory::Security);
    assert_eq!(report.escalation.unwrap().status, EscalationStatus::Pending);
    assert!(h.completion.requests_for("auto_resolver").await.is_empty());
}

#[tokio::test]
async fn test_full_auto_decomposes_complex_task() {
    let h = Harness::new().await;
    let outcome = h
        .outcome_with_mode("Reports", "Monthly sales reports", AutoResolveMode::FullAuto)
        .await;
    let task = h.task(&outcome, "Generate reports", "Produce every report format").await;

    h.observer_says(&ambiguous_verdict(
        "blocking_decision",
        "This task is too complex to finish in one pass. How should we continue?",
        &[("decompose", "Break into subtasks"), ("keep_going", "Keep going")],
    ))
    .await;

    let report = h.supervisor.on_task_completed(task.id, "Partial output.", true).await.unwrap();
    let attempt = report.auto_resolve.expect("full-auto attempts immediately");
    assert!(attempt.resolved);
    assert_eq!(attempt.category, EscalationCategory::Complexity);
    assert_eq!(attempt.selected_option.as_deref(), Some("decompose"));
    assert_eq!(report.escalation.unwrap().status, EscalationStatus::Answered);
    assert_eq!(h.decomposer.calls().await, vec![task.id]);
    assert!(h.reload(&task).await.is_paused(), "decomposed tasks stay paused");
}

#[tokio::test]
async fn test_semi_auto_resolves_on_explicit_run() {
    let h = Harness::new().await;
    let outcome = h
        .outcome_with_mode("Export", "CSV export for reports", AutoResolveMode::SemiAuto)
        .await;
    let task = h.task(&outcome, "Add export button", "Button on the report page").await;

    h.observer_says(&ambiguous_verdict(
        "multiple_approaches",
        "Should the button say Download or Save?",
        &[("download", "Download"), ("save", "Save")],
    ))
    .await;
    let report = h.supervisor.on_task_completed(task.id, "Button added.", true).await.unwrap();
    assert!(report.auto_resolve.is_none(), "semi-auto waits for an explicit run");

    h.auto_resolver_says(
        r#"{"should_auto_resolve": true, "selected_option": "download", "reasoning": "matches existing copy", "confidence": 0.92}"#,
    )
    .await;
    let summary = h.supervisor.auto_resolve_all_pending(outcome.id).await.unwrap();
    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.deferred, 0);
    assert!(!h.reload(&task).await.is_paused());

    let store = h.supervisor.context().load_or_create(outcome.id).await.unwrap();
    assert!(store.decisions[0].content.starts_with("Auto-resolved"));
}

#[tokio::test]
async fn test_status_summarizes_outcome() {
    let h = Harness::new().await;
    let outcome = h.outcome("Docs", "Write user documentation").await;
    let task = h.task(&outcome, "Write install guide", "Cover every platform").await;
    h.observer_says(
        r#"{"on_track": true, "alignment_score": 88, "quality": "good", "summary": "solid",
            "discoveries": [{"type": "constraint", "content": "Windows needs admin rights", "relevant_to": ["all"]}]}"#,
    )
    .await;
    h.supervisor.on_task_completed(task.id, "Guide written.", true).await.unwrap();

    let status = h.supervisor.status(outcome.id).await.unwrap();
    assert!(status.enabled);
    assert_eq!(status.discoveries, 1);
    assert_eq!(status.stats.tasks_observed, 1);
    assert_eq!(status.stats.discoveries_extracted, 1);
    assert_eq!(status.pending_escalations, 0);
    assert!(!status.recent_activity.is_empty());
}

#[tokio::test]
async fn test_high_drift_on_finished_task_gates_its_dependents() {
    let h = Harness::new().await;
    let outcome = h.outcome("Parser", "Parse CSV exports into the ledger").await;
    let parse = h.task(&outcome, "Parse CSV", "Read the export format").await;
    let load = h
        .tasks
        .create_task(Task::new(outcome.id, "Load ledger", "Insert parsed rows").with_dependency(parse.id))
        .await
        .unwrap();
    h.tasks.finish_task(parse.id, true).await.unwrap();

    h.observer_says(
        r#"{"on_track": false, "alignment_score": 40, "quality": "needs_work", "summary": "parser plus an unasked-for GUI",
            "drift": [{"type": "scope_creep", "severity": "high", "description": "Built a web GUI nobody asked for", "evidence": ["src/gui.rs"]}]}"#,
    )
    .await;
    let report = h.supervisor.on_task_completed(parse.id, "Parser done, also added a GUI.", true).await.unwrap();
    assert!(report.errors.is_empty(), "unexpected stage errors: {:?}", report.errors);
    assert!(report.escalation.is_none());

    let steering = report.steering.expect("steering runs after every observation");
    assert!(steering.failures.is_empty());
    assert_eq!(steering.executed, 1);
    assert_eq!(steering.corrective_tasks.len(), 1);
    let fix = h.tasks.get_task(steering.corrective_tasks[0]).await.unwrap();
    assert_eq!(fix.status, TaskStatus::Pending);
    assert!(fix.title.starts_with("Fix: "));

    let load = h.reload(&load).await;
    assert!(load.depends_on.contains(&fix.id), "pending dependents wait for the fix");
    assert_eq!(h.reload(&parse).await.status, TaskStatus::Completed);

    let status = h.supervisor.status(outcome.id).await.unwrap();
    assert_eq!(status.stats.steering_actions, 1);
    let steered = h
        .supervisor
        .activity(&ActivityQuery {
            outcome_id: Some(outcome.id),
            kind: Some(ActivityKind::Steering),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(steered.len(), 1);
}

#[tokio::test]
async fn test_repeated_drift_is_logged_for_review() {
    let h = Harness::new().await;
    let outcome = h.outcome("Docs", "Write user documentation").await;
    h.workers.add_worker(Worker::new("w1", outcome.id)).await;
    let drifting = r#"{"on_track": true, "alignment_score": 70, "quality": "good", "summary": "ok with extras",
        "drift": [{"type": "scope_creep", "severity": "low", "description": "Added a FAQ section"}]}"#;

    let mut last = None;
    for title in ["Write install guide", "Write upgrade guide"] {
        let task = h.task(&outcome, title, "One page").await;
        h.observer_says(drifting).await;
        last = Some(h.supervisor.on_task_completed(task.id, "Guide written.", true).await.unwrap());
    }

    let pattern = last.unwrap().failure_pattern.expect("failure patterns are checked");
    assert_eq!(pattern.pattern, Some(FailurePattern::RepeatedDrift));
    assert_eq!(pattern.recommendation, PatternRecommendation::PauseForReview);
    assert!(pattern.paused_workers.is_empty());
    assert!(h.workers.paused().await.is_empty(), "review recommendations pause nobody");

    let logged = h
        .supervisor
        .activity(&ActivityQuery {
            outcome_id: Some(outcome.id),
            kind: Some(ActivityKind::Escalation),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].summary.contains("repeated_drift"));
}
