//! Folding of flat join rows into nested catalog entities.
//!
//! Solutions arrive once per attached asset. The fold keeps records in a vector
//! indexed by solution id so that output order is the order in which each
//! solution was first seen, and each record's assets keep row arrival order.

use std::collections::HashMap;

use futures::{Stream, TryStreamExt};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::application::repos::{ProjectRow, RepoError, SolutionAssetRow};
use crate::domain::assets::AssetUrlResolver;
use crate::domain::entities::{
    AssetRecord, Description, MetadataRecord, ProjectRecord, SolutionRecord,
};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("column `{column}` does not hold a JSON document")]
    MalformedFragment {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn raw_fragment(
    column: &'static str,
    value: Option<String>,
) -> Result<Box<RawValue>, AggregateError> {
    let text = value.unwrap_or_else(|| "null".to_string());
    RawValue::from_string(text)
        .map_err(|source| AggregateError::MalformedFragment { column, source })
}

impl TryFrom<ProjectRow> for ProjectRecord {
    type Error = AggregateError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            creation_date: row.creation_date,
            project_name: row.project_name,
            variable_metadata: raw_fragment("variable_metadata", row.variable_metadata)?,
            output_metadata: raw_fragment("output_metadata", row.output_metadata)?,
            assets: raw_fragment("assets", row.assets)?,
            deleted: row.deleted,
            metadata: MetadataRecord {
                captions: raw_fragment("captions", row.captions)?,
                description: Description {
                    slug: row.slug,
                    text: row.markdown,
                },
                human_name: row.human_name,
            },
        })
    }
}

/// Collect project rows one-to-one. The first failing row aborts the fold.
pub async fn collect_projects<S>(rows: S) -> Result<Vec<ProjectRecord>, AggregateError>
where
    S: Stream<Item = Result<ProjectRow, RepoError>>,
{
    rows.map_err(AggregateError::from)
        .and_then(|row| futures::future::ready(ProjectRecord::try_from(row)))
        .try_collect()
        .await
}

/// Incremental grouping of solution/asset rows.
pub struct SolutionAggregator<'r> {
    resolver: &'r AssetUrlResolver,
    index: HashMap<String, usize>,
    solutions: Vec<SolutionRecord>,
}

impl<'r> SolutionAggregator<'r> {
    pub fn new(resolver: &'r AssetUrlResolver) -> Self {
        Self {
            resolver,
            index: HashMap::new(),
            solutions: Vec::new(),
        }
    }

    pub fn push(&mut self, row: SolutionAssetRow) -> Result<(), AggregateError> {
        let asset = AssetRecord {
            tag: row.tag,
            file: self.resolver.resolve(&row.file),
        };

        if let Some(&position) = self.index.get(&row.solution_id) {
            self.solutions[position].files.push(asset);
            return Ok(());
        }

        let record = SolutionRecord {
            parameters: raw_fragment("parameters", row.parameters)?,
            output_parameters: raw_fragment("output_parameters", row.output_parameters)?,
            id: row.solution_id.clone(),
            scoped_id: row.scoped_id,
            files: vec![asset],
        };
        self.index.insert(row.solution_id, self.solutions.len());
        self.solutions.push(record);
        Ok(())
    }

    pub fn finish(self) -> Vec<SolutionRecord> {
        self.solutions
    }
}

/// Fold a solution/asset row stream into solutions in first-seen order.
pub async fn collect_solutions<S>(
    rows: S,
    resolver: &AssetUrlResolver,
) -> Result<Vec<SolutionRecord>, AggregateError>
where
    S: Stream<Item = Result<SolutionAssetRow, RepoError>>,
{
    let aggregator = rows
        .map_err(AggregateError::from)
        .try_fold(SolutionAggregator::new(resolver), |mut aggregator, row| {
            futures::future::ready(aggregator.push(row).map(|()| aggregator))
        })
        .await?;
    Ok(aggregator.finish())
}
