use async_trait::async_trait;

use crate::application::repos::{RepoError, UsersRepo};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn password_hash(&self, username: &str) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
