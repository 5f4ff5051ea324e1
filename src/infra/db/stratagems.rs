use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::{
        query::QueryDescriptor,
        repos::{ListPage, RepoError, ResourceRepo},
        resources::STRATAGEMS,
    },
    domain::{decode, entities::StratagemRecord},
};

use super::{PostgresRepositories, map_sqlx_error, query::fetch_page};

const COLUMNS: &str = "id, codename, name, keys, uses, cooldown, activation, image_url, \
                       group_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct StratagemRow {
    id: i64,
    codename: Option<String>,
    name: String,
    keys: String,
    uses: String,
    cooldown: Option<i32>,
    activation: Option<i32>,
    image_url: String,
    group_id: Option<i64>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<StratagemRow> for StratagemRecord {
    fn from(row: StratagemRow) -> Self {
        Self {
            id: row.id,
            codename: row.codename,
            name: row.name,
            keys: decode::string_list(&row.keys),
            uses: row.uses,
            cooldown: row.cooldown,
            activation: row.activation,
            image_url: row.image_url,
            group_id: row.group_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<StratagemRecord> for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<StratagemRecord>, RepoError> {
        let row = sqlx::query_as::<_, StratagemRow>(
            r#"
            SELECT id, codename, name, keys, uses, cooldown, activation, image_url,
                   group_id, created_at, updated_at
            FROM stratagems
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(StratagemRecord::from))
    }

    async fn list(
        &self,
        query: &QueryDescriptor,
    ) -> Result<ListPage<StratagemRecord>, RepoError> {
        let page = fetch_page::<StratagemRow>(self.pool(), &STRATAGEMS, COLUMNS, query).await?;
        Ok(ListPage {
            items: page.items.into_iter().map(StratagemRecord::from).collect(),
            total: page.total,
        })
    }
}
