use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::time::timeout;
use tracing::instrument;

use crate::application::aggregate::{self, AggregateError};
use crate::application::repos::{CatalogRepo, ProjectSelection, RepoError, SolutionSelection};
use crate::domain::assets::AssetUrlResolver;
use crate::domain::entities::{ProjectRecord, SolutionRecord};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("catalog query exceeded {limit_ms}ms")]
    Deadline { limit_ms: u128 },
}

impl From<RepoError> for CatalogError {
    fn from(err: RepoError) -> Self {
        Self::Aggregate(AggregateError::Repo(err))
    }
}

/// Read side of the catalog: store query plus aggregation under a deadline.
#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn CatalogRepo>,
    resolver: AssetUrlResolver,
    query_timeout: Duration,
}

impl CatalogService {
    pub fn new(
        repo: Arc<dyn CatalogRepo>,
        resolver: AssetUrlResolver,
        query_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            resolver,
            query_timeout,
        }
    }

    #[instrument(skip(self))]
    pub async fn projects(
        &self,
        selection: &ProjectSelection,
    ) -> Result<Vec<ProjectRecord>, CatalogError> {
        let rows = self.repo.project_rows(selection);
        self.bounded(aggregate::collect_projects(rows)).await
    }

    #[instrument(skip(self))]
    pub async fn solutions(
        &self,
        selection: &SolutionSelection,
    ) -> Result<Vec<SolutionRecord>, CatalogError> {
        let rows = self.repo.solution_rows(selection);
        self.bounded(aggregate::collect_solutions(rows, &self.resolver))
            .await
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        self.repo.health_check().await
    }

    async fn bounded<T>(
        &self,
        work: impl Future<Output = Result<T, AggregateError>>,
    ) -> Result<T, CatalogError> {
        match timeout(self.query_timeout, work).await {
            Ok(result) => result.map_err(CatalogError::from),
            Err(_) => Err(CatalogError::Deadline {
                limit_ms: self.query_timeout.as_millis(),
            }),
        }
    }
}
