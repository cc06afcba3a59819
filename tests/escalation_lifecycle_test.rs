//! Escalation state transitions and resolution actions.

mod common;

use common::{ambiguous_verdict, Harness};
use homr::domain::models::{Escalation, EscalationStatus, Outcome, ResolutionAction, Task, TaskStatus};
use homr::domain::ports::TaskFilter;
use homr::DomainError;

async fn escalate(h: &Harness, outcome: &Outcome, task: &Task, options: &[(&str, &str)]) -> Escalation {
    h.observer_says(&ambiguous_verdict(
        "unclear_requirement",
        "Should archived invoices be imported too?",
        options,
    ))
    .await;
    h.supervisor
        .on_task_completed(task.id, "Imported current invoices.", true)
        .await
        .unwrap()
        .escalation
        .unwrap_or_else(|| panic!("expected an escalation for outcome {}", outcome.id))
}

#[tokio::test]
async fn test_dismiss_resumes_without_decision() {
    let h = Harness::new().await;
    let outcome = h.outcome("Importer", "Import invoices").await;
    let task = h.task(&outcome, "Import invoices", "Load the invoice table").await;
    let escalation = escalate(&h, &outcome, &task, &[("yes", "Import them"), ("no", "Leave them")]).await;
    assert!(h.reload(&task).await.is_paused());

    let resumed = h
        .supervisor
        .dismiss_escalation(escalation.id, Some("Not relevant any more".to_string()))
        .await
        .unwrap();
    assert_eq!(resumed, vec![task.id]);
    assert!(!h.reload(&task).await.is_paused());

    let stored = h.supervisor.get_escalation(escalation.id).await.unwrap();
    assert_eq!(stored.status, EscalationStatus::Dismissed);
    assert_eq!(stored.dismiss_reason.as_deref(), Some("Not relevant any more"));

    let store = h.supervisor.context().load_or_create(outcome.id).await.unwrap();
    assert!(store.decisions.is_empty(), "dismissals record no decision");
}

#[tokio::test]
async fn test_terminal_escalations_reject_changes() {
    let h = Harness::new().await;
    let outcome = h.outcome("Importer", "Import invoices").await;
    let task = h.task(&outcome, "Import invoices", "Load the invoice table").await;
    let escalation = escalate(&h, &outcome, &task, &[("yes", "Import them"), ("no", "Leave them")]).await;

    h.supervisor.answer_escalation(escalation.id, "no", None).await.unwrap();

    assert!(matches!(
        h.supervisor.dismiss_escalation(escalation.id, None).await,
        Err(DomainError::EscalationNotPending { .. })
    ));
    assert!(matches!(
        h.supervisor.answer_escalation(escalation.id, "yes", None).await,
        Err(DomainError::EscalationNotPending { .. })
    ));
    assert!(matches!(
        h.supervisor.try_auto_resolve(escalation.id).await,
        Err(DomainError::EscalationNotPending { .. })
    ));
}

#[tokio::test]
async fn test_unknown_option_leaves_escalation_pending() {
    let h = Harness::new().await;
    let outcome = h.outcome("Importer", "Import invoices").await;
    let task = h.task(&outcome, "Import invoices", "Load the invoice table").await;
    let escalation = escalate(&h, &outcome, &task, &[("yes", "Import them"), ("no", "Leave them")]).await;

    let err = h.supervisor.answer_escalation(escalation.id, "maybe", None).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidOption { ref option, .. } if option == "maybe"));

    let stored = h.supervisor.get_escalation(escalation.id).await.unwrap();
    assert_eq!(stored.status, EscalationStatus::Pending);
    assert!(h.reload(&task).await.is_paused());
}

#[tokio::test]
async fn test_retry_option_extends_budget() {
    let h = Harness::new().await;
    let outcome = h.outcome("Importer", "Import invoices").await;
    let task = h.task(&outcome, "Import invoices", "Load the invoice table").await;
    let escalation = escalate(&h, &outcome, &task, &[("retry", "Try again"), ("skip", "Give up")]).await;

    let resolution = h
        .supervisor
        .answer_escalation(escalation.id, "retry", Some("give it 4x the turns".to_string()))
        .await
        .unwrap();
    assert_eq!(resolution.resumed_tasks, vec![task.id]);
    assert!(resolution.action_results.iter().all(|r| r.success));

    let task = h.reload(&task).await;
    assert_eq!(task.max_attempts, 12);
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(!task.is_paused());
}

#[tokio::test]
async fn test_decompose_keeps_original_paused() {
    let h = Harness::new().await;
    let outcome = h.outcome("Reports", "Monthly reports").await;
    let task = h.task(&outcome, "Generate reports", "Every format").await;
    let escalation = escalate(&h, &outcome, &task, &[("decompose", "Split it up"), ("keep", "Keep going")]).await;

    let resolution = h.supervisor.answer_escalation(escalation.id, "decompose", None).await.unwrap();
    assert_eq!(resolution.decomposed_tasks, vec![task.id]);
    assert!(resolution.resumed_tasks.is_empty());
    assert_eq!(h.decomposer.calls().await, vec![task.id]);
    assert!(h.reload(&task).await.is_paused());

    let parts = h
        .tasks
        .list_tasks(TaskFilter::outcome(outcome.id))
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.title.starts_with("Generate reports (part"))
        .count();
    assert_eq!(parts, 2);
}

#[tokio::test]
async fn test_failed_decomposition_resumes_task() {
    let h = Harness::new().await;
    let outcome = h.outcome("Reports", "Monthly reports").await;
    let task = h.task(&outcome, "Generate reports", "Every format").await;
    h.decomposer.fail_for(task.id).await;
    let escalation = escalate(&h, &outcome, &task, &[("decompose", "Split it up"), ("keep", "Keep going")]).await;

    let resolution = h.supervisor.answer_escalation(escalation.id, "decompose", None).await.unwrap();
    assert!(resolution.decomposed_tasks.is_empty());
    assert!(!resolution.action_results[0].success);
    assert_eq!(resolution.resumed_tasks, vec![task.id]);
    assert!(!h.reload(&task).await.is_paused());
}

#[tokio::test]
async fn test_option_with_two_actions_applies_both() {
    let h = Harness::new().await;
    let outcome = h.outcome("Reports", "Monthly reports").await;
    let task = h.task(&outcome, "Generate reports", "Every format").await;
    let escalation = escalate(
        &h,
        &outcome,
        &task,
        &[("retry_and_decompose", "Retry in smaller pieces"), ("keep", "Keep going")],
    )
    .await;

    let option = &escalation.question.options[0];
    assert_eq!(
        option.actions,
        vec![ResolutionAction::IncreaseTurnLimit, ResolutionAction::BreakIntoSubtasks]
    );

    let resolution = h
        .supervisor
        .answer_escalation(escalation.id, "retry_and_decompose", None)
        .await
        .unwrap();
    assert_eq!(resolution.actions, option.actions);
    assert_eq!(resolution.action_results.len(), 2);
    assert!(resolution.action_results.iter().all(|r| r.success));
    assert_eq!(resolution.decomposed_tasks, vec![task.id]);
    assert!(resolution.resumed_tasks.is_empty());

    let reloaded = h.reload(&task).await;
    assert_eq!(reloaded.max_attempts, 8);
    assert_eq!(h.decomposer.calls().await, vec![task.id]);
}
