//! Task affinity strategies used to widen an escalation's blast radius.

use std::collections::HashSet;

use crate::domain::models::{extract_keywords, Task};

/// Decides whether `candidate` is related closely enough to `trigger` to be
/// paused alongside it.
pub trait TaskAffinity: Send + Sync {
    fn is_related(&self, trigger: &Task, candidate: &Task) -> bool;
}

/// Related when title+description share at least `min_shared` keywords.
#[derive(Debug, Clone)]
pub struct KeywordAffinity {
    pub min_shared: usize,
}

impl Default for KeywordAffinity {
    fn default() -> Self {
        Self { min_shared: 2 }
    }
}

impl KeywordAffinity {
    pub fn new(min_shared: usize) -> Self {
        Self { min_shared }
    }

    fn keywords(task: &Task) -> HashSet<String> {
        extract_keywords(&format!("{} {}", task.title, task.working_description()))
            .into_iter()
            .collect()
    }

    pub fn shared_keywords(&self, a: &Task, b: &Task) -> usize {
        Self::keywords(a).intersection(&Self::keywords(b)).count()
    }
}

impl TaskAffinity for KeywordAffinity {
    fn is_related(&self, trigger: &Task, candidate: &Task) -> bool {
        self.shared_keywords(trigger, candidate) >= self.min_shared
    }
}
