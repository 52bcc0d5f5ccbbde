use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};

use crate::application::repos::{
    CatalogRepo, ProjectRow, ProjectSelection, RepoError, SolutionAssetRow, SolutionSelection,
};

use super::{PostgresRepositories, map_sqlx_error};

// Blob columns are read as text and validated as JSON during aggregation.
const ALL_PROJECTS: &str = r#"
    SELECT p.creation_date::text AS creation_date, p.project_name,
           p.variable_metadata::text AS variable_metadata,
           p.output_metadata::text AS output_metadata,
           p.assets::text AS assets, p.deleted,
           m.captions::text AS captions, m.slug, m.markdown, m.human_name
    FROM project p
    INNER JOIN metadata m ON m.project_name = p.project_name
    WHERE NOT p.deleted
    ORDER BY p.creation_date, p.project_name
"#;

const ONE_PROJECT: &str = r#"
    SELECT p.creation_date::text AS creation_date, p.project_name,
           p.variable_metadata::text AS variable_metadata,
           p.output_metadata::text AS output_metadata,
           p.assets::text AS assets, p.deleted,
           m.captions::text AS captions, m.slug, m.markdown, m.human_name
    FROM project p
    INNER JOIN metadata m ON m.project_name = p.project_name
    WHERE NOT p.deleted AND p.project_name = $1
"#;

const ALL_SOLUTIONS: &str = r#"
    SELECT s.id::text AS solution_id, s.scoped_id::text AS scoped_id,
           s.parameters::text AS parameters,
           s.output_parameters::text AS output_parameters,
           a.tag, a.file
    FROM solution s
    INNER JOIN asset a ON a.solution_id = s.id
    ORDER BY s.project_name, s.id, a.tag, a.file
"#;

const PROJECT_SOLUTIONS: &str = r#"
    SELECT s.id::text AS solution_id, s.scoped_id::text AS scoped_id,
           s.parameters::text AS parameters,
           s.output_parameters::text AS output_parameters,
           a.tag, a.file
    FROM solution s
    INNER JOIN asset a ON a.solution_id = s.id
    WHERE s.project_name = $1
    ORDER BY s.id, a.tag, a.file
"#;

const ONE_SOLUTION: &str = r#"
    SELECT s.id::text AS solution_id, s.scoped_id::text AS scoped_id,
           s.parameters::text AS parameters,
           s.output_parameters::text AS output_parameters,
           a.tag, a.file
    FROM solution s
    INNER JOIN asset a ON a.solution_id = s.id
    WHERE s.project_name = $1 AND s.id::text = $2
    ORDER BY a.tag, a.file
"#;

#[derive(sqlx::FromRow)]
struct DbProjectRow {
    creation_date: String,
    project_name: String,
    variable_metadata: Option<String>,
    output_metadata: Option<String>,
    assets: Option<String>,
    deleted: bool,
    captions: Option<String>,
    slug: String,
    markdown: String,
    human_name: String,
}

impl From<DbProjectRow> for ProjectRow {
    fn from(row: DbProjectRow) -> Self {
        Self {
            creation_date: row.creation_date,
            project_name: row.project_name,
            variable_metadata: row.variable_metadata,
            output_metadata: row.output_metadata,
            assets: row.assets,
            deleted: row.deleted,
            captions: row.captions,
            slug: row.slug,
            markdown: row.markdown,
            human_name: row.human_name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DbSolutionAssetRow {
    solution_id: String,
    scoped_id: String,
    parameters: Option<String>,
    output_parameters: Option<String>,
    tag: String,
    file: String,
}

impl From<DbSolutionAssetRow> for SolutionAssetRow {
    fn from(row: DbSolutionAssetRow) -> Self {
        Self {
            solution_id: row.solution_id,
            scoped_id: row.scoped_id,
            parameters: row.parameters,
            output_parameters: row.output_parameters,
            tag: row.tag,
            file: row.file,
        }
    }
}

#[async_trait]
impl CatalogRepo for PostgresRepositories {
    fn project_rows<'a>(
        &'a self,
        selection: &'a ProjectSelection,
    ) -> BoxStream<'a, Result<ProjectRow, RepoError>> {
        let rows = match selection {
            ProjectSelection::All => {
                sqlx::query_as::<_, DbProjectRow>(ALL_PROJECTS).fetch(self.pool())
            }
            ProjectSelection::Named(name) => sqlx::query_as::<_, DbProjectRow>(ONE_PROJECT)
                .bind(name.as_str())
                .fetch(self.pool()),
        };

        rows.map_ok(ProjectRow::from)
            .map_err(map_sqlx_error)
            .boxed()
    }

    fn solution_rows<'a>(
        &'a self,
        selection: &'a SolutionSelection,
    ) -> BoxStream<'a, Result<SolutionAssetRow, RepoError>> {
        let rows = match selection {
            SolutionSelection::All => {
                sqlx::query_as::<_, DbSolutionAssetRow>(ALL_SOLUTIONS).fetch(self.pool())
            }
            SolutionSelection::Project(project) => {
                sqlx::query_as::<_, DbSolutionAssetRow>(PROJECT_SOLUTIONS)
                    .bind(project.as_str())
                    .fetch(self.pool())
            }
            SolutionSelection::One { project, solution } => {
                sqlx::query_as::<_, DbSolutionAssetRow>(ONE_SOLUTION)
                    .bind(project.as_str())
                    .bind(solution.as_str())
                    .fetch(self.pool())
            }
        };

        rows.map_ok(SolutionAssetRow::from)
            .map_err(map_sqlx_error)
            .boxed()
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}
