//! Repository traits describing the read-only persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::query::QueryDescriptor;
use crate::domain::entities::RewardRecord;
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("database timeout")]
    Timeout,
    #[error("stored data is invalid: {0}")]
    Corrupt(#[from] DomainError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// One window of a collection plus the total row count for the same filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[async_trait]
pub trait ResourceRepo<R>: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<R>, RepoError>;

    async fn list(&self, query: &QueryDescriptor) -> Result<ListPage<R>, RepoError>;
}

#[async_trait]
pub trait RewardsRepo: Send + Sync {
    async fn find_for_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Option<RewardRecord>, RepoError>;
}
