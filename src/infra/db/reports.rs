use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::{
        query::QueryDescriptor,
        repos::{ListPage, RepoError, ResourceRepo},
        resources::REPORTS,
    },
    domain::entities::ReportRecord,
};

use super::{PostgresRepositories, map_sqlx_error, query::fetch_page};

const COLUMNS: &str = "id, message, news_type, published_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: i64,
    message: String,
    news_type: i32,
    published_at: OffsetDateTime,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ReportRow> for ReportRecord {
    fn from(row: ReportRow) -> Self {
        Self {
            id: row.id,
            message: row.message,
            news_type: row.news_type,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<ReportRecord> for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<ReportRecord>, RepoError> {
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT id, message, news_type, published_at, created_at, updated_at
            FROM news
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ReportRecord::from))
    }

    async fn list(&self, query: &QueryDescriptor) -> Result<ListPage<ReportRecord>, RepoError> {
        let page = fetch_page::<ReportRow>(self.pool(), &REPORTS, COLUMNS, query).await?;
        Ok(ListPage {
            items: page.items.into_iter().map(ReportRecord::from).collect(),
            total: page.total,
        })
    }
}
