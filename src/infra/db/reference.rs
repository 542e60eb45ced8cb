use async_trait::async_trait;

use crate::application::repos::{ReferenceRepo, RepoError};
use crate::domain::entities::{CategoryRecord, TypeRecord};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct ReferenceRow {
    id: String,
    name: String,
}

#[async_trait]
impl ReferenceRepo for PostgresRepositories {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, ReferenceRow>(
                r#"
                SELECT id, name
                FROM categories
                ORDER BY name, id
                "#,
            )
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

            Ok(rows
                .into_iter()
                .map(|row| CategoryRecord {
                    id: row.id,
                    name: row.name,
                })
                .collect())
        })
        .await
    }

    async fn list_types(&self) -> Result<Vec<TypeRecord>, RepoError> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, ReferenceRow>(
                r#"
                SELECT id, name
                FROM types
                ORDER BY name, id
                "#,
            )
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

            Ok(rows
                .into_iter()
                .map(|row| TypeRecord {
                    id: row.id,
                    name: row.name,
                })
                .collect())
        })
        .await
    }
}
