//! Background improvement analysis over recorded escalations.

mod common;

use std::time::Duration;

use common::{ambiguous_verdict, Harness};
use homr::domain::models::{AnalysisJob, AnalysisOptions, JobStatus, Outcome, ProposalKind};
use uuid::Uuid;

async fn escalate(h: &Harness, outcome: &Outcome, title: &str, question: &str) -> Uuid {
    let task = h.task(outcome, title, "").await;
    h.observer_says(&ambiguous_verdict(
        "multiple_approaches",
        question,
        &[("a", "Option A"), ("b", "Option B")],
    ))
    .await;
    h.supervisor
        .on_task_completed(task.id, "done", true)
        .await
        .unwrap()
        .escalation
        .unwrap()
        .id
}

async fn wait_for(h: &Harness, job_id: Uuid) -> AnalysisJob {
    for _ in 0..200 {
        let job = h.supervisor.analysis_job(job_id).await.unwrap();
        if !job.status.is_active() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis job {job_id} did not finish");
}

#[tokio::test]
async fn test_analysis_clusters_recurring_questions() {
    let h = Harness::new().await;
    let outcome = h.outcome("Storage", "Persist user data").await;
    let first = escalate(&h, &outcome, "Users table", "Which database engine for users?").await;
    let second = escalate(&h, &outcome, "Orders table", "Which database engine for orders?").await;

    let job_id = h
        .supervisor
        .start_analysis(AnalysisOptions {
            outcome_id: Some(outcome.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let job = wait_for(&h, job_id).await;

    assert_eq!(job.status, JobStatus::Completed, "job error: {:?}", job.error);
    let result = job.result.unwrap();
    assert_eq!(result.escalations_analyzed, 2);
    let cluster = &result.clusters[0];
    assert_eq!(cluster.key, "multiple_approaches:database");
    assert_eq!(cluster.escalation_ids.len(), 2);
    assert!(cluster.escalation_ids.contains(&first) && cluster.escalation_ids.contains(&second));
    assert_eq!(result.proposals[0].kind, ProposalKind::Skill);

    assert!(h.supervisor.active_analysis_jobs().await.unwrap().is_empty());
    assert_eq!(h.supervisor.recent_analysis_jobs(5).await.unwrap()[0].id, job_id);
}

#[tokio::test]
async fn test_incorporated_escalations_leave_later_runs() {
    let h = Harness::new().await;
    let outcome = h.outcome("Storage", "Persist user data").await;
    let target = h.outcome("Storage skills", "Teach workers the storage conventions").await;
    let id = escalate(&h, &outcome, "Users table", "Which database engine for users?").await;

    assert_eq!(h.supervisor.mark_incorporated(&[id], target.id).await.unwrap(), 1);
    let stored = h.supervisor.get_escalation(id).await.unwrap();
    assert_eq!(stored.incorporated_into, Some(target.id));

    let job_id = h.supervisor.start_analysis(AnalysisOptions::default()).await.unwrap();
    let job = wait_for(&h, job_id).await;
    let result = job.result.unwrap();
    assert_eq!(result.escalations_analyzed, 0);
    assert!(result.clusters.is_empty());
}

#[tokio::test]
async fn test_analysis_rejects_unknown_outcome() {
    let h = Harness::new().await;
    let result = h
        .supervisor
        .start_analysis(AnalysisOptions {
            outcome_id: Some(Uuid::new_v4()),
            ..Default::default()
        })
        .await;
    assert!(result.is_err());
}
