//! Activity log repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ActivityEntry, ActivityQuery};

/// Append-only activity feed.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Append an entry.
    async fn append(&self, entry: &ActivityEntry) -> DomainResult<()>;

    /// One page of entries, newest first.
    async fn list(&self, query: &ActivityQuery) -> DomainResult<Vec<ActivityEntry>>;
}
