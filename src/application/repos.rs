//! Repository traits describing persistence adapters.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub const PROJECT_KEY: &str = "project";
pub const SOLUTION_KEY: &str = "solution";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("malformed row: {message}")]
    MalformedRow { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which projects a fetch should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSelection {
    All,
    Named(String),
}

impl ProjectSelection {
    /// Build a selection from route parameters. A missing key broadens the fetch.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        match params.get(PROJECT_KEY) {
            Some(project) => Self::Named(project.clone()),
            None => Self::All,
        }
    }
}

/// Which solutions a fetch should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolutionSelection {
    All,
    Project(String),
    One { project: String, solution: String },
}

impl SolutionSelection {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        match (params.get(PROJECT_KEY), params.get(SOLUTION_KEY)) {
            (Some(project), Some(solution)) => Self::One {
                project: project.clone(),
                solution: solution.clone(),
            },
            (Some(project), None) => Self::Project(project.clone()),
            (None, _) => Self::All,
        }
    }
}

/// One row of the project/metadata join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    pub creation_date: String,
    pub project_name: String,
    pub variable_metadata: Option<String>,
    pub output_metadata: Option<String>,
    pub assets: Option<String>,
    pub deleted: bool,
    pub captions: Option<String>,
    pub slug: String,
    pub markdown: String,
    pub human_name: String,
}

/// One row of the solution/asset join; a solution appears once per asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionAssetRow {
    pub solution_id: String,
    pub scoped_id: String,
    pub parameters: Option<String>,
    pub output_parameters: Option<String>,
    pub tag: String,
    pub file: String,
}

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    fn project_rows<'a>(
        &'a self,
        selection: &'a ProjectSelection,
    ) -> BoxStream<'a, Result<ProjectRow, RepoError>>;

    fn solution_rows<'a>(
        &'a self,
        selection: &'a SolutionSelection,
    ) -> BoxStream<'a, Result<SolutionAssetRow, RepoError>>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Stored password hash (PHC string) for `username`, if the user exists.
    async fn password_hash(&self, username: &str) -> Result<Option<String>, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_project_key_selects_all_projects() {
        assert_eq!(
            ProjectSelection::from_params(&HashMap::new()),
            ProjectSelection::All
        );
        assert_eq!(
            ProjectSelection::from_params(&params(&[("solution", "7")])),
            ProjectSelection::All
        );
    }

    #[test]
    fn project_key_narrows_to_one_project() {
        assert_eq!(
            ProjectSelection::from_params(&params(&[("project", "bridge")])),
            ProjectSelection::Named("bridge".to_string())
        );
    }

    #[test]
    fn solution_selection_broadens_with_missing_keys() {
        assert_eq!(
            SolutionSelection::from_params(&params(&[("project", "bridge"), ("solution", "7")])),
            SolutionSelection::One {
                project: "bridge".to_string(),
                solution: "7".to_string(),
            }
        );
        assert_eq!(
            SolutionSelection::from_params(&params(&[("project", "bridge")])),
            SolutionSelection::Project("bridge".to_string())
        );
        assert_eq!(
            SolutionSelection::from_params(&params(&[("solution", "7")])),
            SolutionSelection::All
        );
    }
}
