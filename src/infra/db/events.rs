use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::{
        query::QueryDescriptor,
        repos::{ListPage, RepoError, ResourceRepo},
        resources::EVENTS,
    },
    domain::entities::EventRecord,
};

use super::{PostgresRepositories, map_sqlx_error, query::fetch_page};

const COLUMNS: &str = "id, event_id, title, message, race, flag, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    event_id: i64,
    title: Option<String>,
    message: Option<String>,
    race: Option<String>,
    flag: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            title: row.title,
            message: row.message,
            race: row.race,
            flag: row.flag,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<EventRecord> for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<EventRecord>, RepoError> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_id, title, message, race, flag, created_at, updated_at
            FROM global_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(EventRecord::from))
    }

    async fn list(&self, query: &QueryDescriptor) -> Result<ListPage<EventRecord>, RepoError> {
        let page = fetch_page::<EventRow>(self.pool(), &EVENTS, COLUMNS, query).await?;
        Ok(ListPage {
            items: page.items.into_iter().map(EventRecord::from).collect(),
            total: page.total,
        })
    }
}
