use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::{
        query::QueryDescriptor,
        repos::{ListPage, RepoError, ResourceRepo},
        resources::ORDERS,
    },
    domain::entities::OrderRecord,
};

use super::{PostgresRepositories, map_sqlx_error, query::fetch_page};

const COLUMNS: &str =
    "id, message, reward_type, reward_amount, expires_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    message: Option<String>,
    reward_type: Option<i32>,
    reward_amount: Option<i64>,
    expires_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            message: row.message,
            reward_type: row.reward_type,
            reward_amount: row.reward_amount,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<OrderRecord> for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<OrderRecord>, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, message, reward_type, reward_amount, expires_at, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(OrderRecord::from))
    }

    async fn list(&self, query: &QueryDescriptor) -> Result<ListPage<OrderRecord>, RepoError> {
        let page = fetch_page::<OrderRow>(self.pool(), &ORDERS, COLUMNS, query).await?;
        Ok(ListPage {
            items: page.items.into_iter().map(OrderRecord::from).collect(),
            total: page.total,
        })
    }
}
