use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db)
            if db.message().contains("canceling statement due to statement timeout") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::ColumnDecode { index, source } => RepoError::MalformedRow {
            message: format!("column {index}: {source}"),
        },
        sqlx::Error::ColumnNotFound(column) => RepoError::MalformedRow {
            message: format!("column `{column}` missing from result"),
        },
        sqlx::Error::Decode(source) => RepoError::MalformedRow {
            message: source.to_string(),
        },
        other => RepoError::from_persistence(other),
    }
}
