//! Default improvement analyzer.
//!
//! Groups escalations by trigger type and the dominant keyword of their
//! questions, then turns the largest clusters into proposals.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    extract_keywords, AmbiguityType, Escalation, EscalationCluster, ImprovementProposal,
    ProposalKind,
};
use crate::domain::ports::ImprovementAnalyzer;

const MAX_SAMPLE_QUESTIONS: usize = 3;

/// Clusters by `(trigger type, dominant keyword)`.
#[derive(Debug, Clone, Default)]
pub struct TriggerClusterAnalyzer;

impl TriggerClusterAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

/// Keyword shared by most escalations of a group, if any repeats.
fn dominant_keyword(escalations: &[&Escalation]) -> Option<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for escalation in escalations {
        let mut seen: Vec<String> = Vec::new();
        for word in extract_keywords(&escalation.question.text) {
            if !seen.contains(&word) {
                seen.push(word);
            }
        }
        for word in seen {
            *counts.entry(word).or_default() += 1;
        }
    }
    // BTreeMap iteration keeps ties deterministic (alphabetical).
    counts
        .into_iter()
        .filter(|(_, n)| *n >= 2 || escalations.len() == 1)
        .max_by(|(wa, na), (wb, nb)| na.cmp(nb).then_with(|| wb.cmp(wa)))
        .map(|(w, _)| w)
}

fn root_cause(trigger_type: AmbiguityType, keyword: Option<&str>) -> String {
    let subject = keyword.map_or_else(String::new, |k| format!(" around '{k}'"));
    match trigger_type {
        AmbiguityType::MultipleApproaches => {
            format!("Workers repeatedly cannot choose between approaches{subject}")
        }
        AmbiguityType::UnclearRequirement => format!("Requirements are underspecified{subject}"),
        AmbiguityType::BlockingDecision => format!("Work stalls on decisions only humans make{subject}"),
        AmbiguityType::ConflictingRequirements => format!("Stated requirements conflict{subject}"),
        AmbiguityType::Other => format!("Recurring escalations{subject}"),
    }
}

fn proposal_kind(trigger_type: AmbiguityType) -> ProposalKind {
    match trigger_type {
        AmbiguityType::MultipleApproaches => ProposalKind::Skill,
        AmbiguityType::UnclearRequirement | AmbiguityType::ConflictingRequirements => ProposalKind::Context,
        AmbiguityType::BlockingDecision | AmbiguityType::Other => ProposalKind::Process,
    }
}

#[async_trait]
impl ImprovementAnalyzer for TriggerClusterAnalyzer {
    async fn cluster(&self, escalations: &[Escalation]) -> DomainResult<Vec<EscalationCluster>> {
        let mut by_trigger: HashMap<AmbiguityType, Vec<&Escalation>> = HashMap::new();
        for escalation in escalations {
            by_trigger
                .entry(escalation.trigger.trigger_type)
                .or_default()
                .push(escalation);
        }

        let mut clusters = Vec::new();
        for (trigger_type, group) in by_trigger {
            let keyword = dominant_keyword(&group);

            // Members mentioning the keyword form the cluster; the rest stay
            // together under the bare trigger type.
            let (with_kw, without_kw): (Vec<&Escalation>, Vec<&Escalation>) = match &keyword {
                Some(k) => group
                    .iter()
                    .partition(|e| extract_keywords(&e.question.text).contains(k)),
                None => (Vec::new(), group.clone()),
            };

            for (members, kw) in [(with_kw, keyword.clone()), (without_kw, None)] {
                if members.is_empty() {
                    continue;
                }
                let key = match &kw {
                    Some(k) => format!("{}:{k}", trigger_type.as_str()),
                    None => trigger_type.as_str().to_string(),
                };
                let mut outcome_ids: Vec<Uuid> = Vec::new();
                for e in &members {
                    if !outcome_ids.contains(&e.outcome_id) {
                        outcome_ids.push(e.outcome_id);
                    }
                }
                clusters.push(EscalationCluster {
                    key,
                    trigger_type: trigger_type.as_str().to_string(),
                    root_cause: root_cause(trigger_type, kw.as_deref()),
                    keyword: kw,
                    escalation_ids: members.iter().map(|e| e.id).collect(),
                    outcome_ids,
                    sample_questions: members
                        .iter()
                        .take(MAX_SAMPLE_QUESTIONS)
                        .map(|e| e.question.text.clone())
                        .collect(),
                });
            }
        }

        clusters.sort_by(|a, b| {
            b.escalation_ids
                .len()
                .cmp(&a.escalation_ids.len())
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(clusters)
    }

    async fn propose(
        &self,
        clusters: &[EscalationCluster],
        max_proposals: usize,
    ) -> DomainResult<Vec<ImprovementProposal>> {
        let proposals = clusters
            .iter()
            .take(max_proposals)
            .map(|cluster| {
                let trigger_type = AmbiguityType::parse_lenient(&cluster.trigger_type);
                let kind = proposal_kind(trigger_type);
                let topic = cluster.keyword.as_deref().unwrap_or(&cluster.trigger_type);
                let title = match kind {
                    ProposalKind::Skill => format!("Add a skill for choosing {topic} approaches"),
                    ProposalKind::Context => format!("Document {topic} requirements up front"),
                    ProposalKind::Process => format!("Add a planning checkpoint for {topic} decisions"),
                };
                let description = format!(
                    "{}. {} escalation(s) across {} outcome(s).",
                    cluster.root_cause,
                    cluster.escalation_ids.len(),
                    cluster.outcome_ids.len()
                );
                ImprovementProposal {
                    kind,
                    title,
                    description,
                    cluster_key: cluster.key.clone(),
                    escalation_count: cluster.escalation_ids.len(),
                }
            })
            .collect();
        Ok(proposals)
    }
}
