use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::{
        query::QueryDescriptor,
        repos::{ListPage, RepoError, ResourceRepo, RewardsRepo},
        resources::ASSIGNMENTS,
    },
    domain::{
        decode,
        entities::{AssignmentRecord, AssignmentTaskRecord, RewardRecord},
    },
};

use super::{PostgresRepositories, map_sqlx_error, query::fetch_page};

const COLUMNS: &str =
    "id, title, briefing, description, expiration, progress, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: i64,
    title: Option<String>,
    briefing: Option<String>,
    description: Option<String>,
    expiration: OffsetDateTime,
    progress: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    assignment_id: i64,
    task_type: i32,
    value_types: String,
    values: String,
}

#[derive(sqlx::FromRow)]
struct RewardRow {
    id: i64,
    assignment_id: i64,
    reward_type: i32,
    amount: i64,
}

impl TryFrom<TaskRow> for AssignmentTaskRecord {
    type Error = RepoError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            task_type: row.task_type,
            value_types: decode::number_list("valueTypes", &row.value_types)?,
            values: decode::number_list("values", &row.values)?,
        })
    }
}

impl From<RewardRow> for RewardRecord {
    fn from(row: RewardRow) -> Self {
        Self {
            id: row.id,
            assignment_id: row.assignment_id,
            reward_type: row.reward_type,
            amount: row.amount,
        }
    }
}

fn assemble(
    row: AssignmentRow,
    tasks: Vec<AssignmentTaskRecord>,
) -> Result<AssignmentRecord, RepoError> {
    let progress = row
        .progress
        .as_deref()
        .map(|raw| decode::number_list("progress", raw))
        .transpose()?;

    Ok(AssignmentRecord {
        id: row.id,
        title: row.title,
        briefing: row.briefing,
        description: row.description,
        expiration: row.expiration,
        progress,
        tasks,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

impl PostgresRepositories {
    /// Load and decode the tasks of every listed assignment in one query.
    async fn load_tasks(
        &self,
        assignment_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<AssignmentTaskRecord>>, RepoError> {
        if assignment_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, assignment_id, "type" AS task_type, value_types, "values"
            FROM assignment_tasks
            WHERE assignment_id = ANY($1)
            ORDER BY assignment_id, id
            "#,
        )
        .bind(assignment_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<i64, Vec<AssignmentTaskRecord>> = HashMap::new();
        for row in rows {
            let assignment_id = row.assignment_id;
            grouped
                .entry(assignment_id)
                .or_default()
                .push(AssignmentTaskRecord::try_from(row)?);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl ResourceRepo<AssignmentRecord> for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<AssignmentRecord>, RepoError> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT id, title, briefing, description, expiration, progress, created_at, updated_at
            FROM assignments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut tasks = self.load_tasks(&[row.id]).await?;
        let tasks = tasks.remove(&row.id).unwrap_or_default();
        assemble(row, tasks).map(Some)
    }

    async fn list(
        &self,
        query: &QueryDescriptor,
    ) -> Result<ListPage<AssignmentRecord>, RepoError> {
        let page = fetch_page::<AssignmentRow>(self.pool(), &ASSIGNMENTS, COLUMNS, query).await?;

        let ids: Vec<i64> = page.items.iter().map(|row| row.id).collect();
        let mut tasks = self.load_tasks(&ids).await?;

        let items = page
            .items
            .into_iter()
            .map(|row| {
                let owned = tasks.remove(&row.id).unwrap_or_default();
                assemble(row, owned)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListPage {
            items,
            total: page.total,
        })
    }
}

#[async_trait]
impl RewardsRepo for PostgresRepositories {
    async fn find_for_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Option<RewardRecord>, RepoError> {
        let row = sqlx::query_as::<_, RewardRow>(
            r#"
            SELECT id, assignment_id, "type" AS reward_type, amount
            FROM rewards
            WHERE assignment_id = $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(assignment_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RewardRecord::from))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn row(progress: Option<&str>) -> AssignmentRow {
        AssignmentRow {
            id: 5,
            title: Some("Major Order".to_string()),
            briefing: None,
            description: None,
            expiration: datetime!(2024-05-01 0:00 UTC),
            progress: progress.map(str::to_string),
            created_at: datetime!(2024-04-01 0:00 UTC),
            updated_at: datetime!(2024-04-02 0:00 UTC),
        }
    }

    #[test]
    fn progress_is_decoded() {
        let record = assemble(row(Some("1,0,1")), Vec::new()).expect("valid row");
        assert_eq!(record.progress, Some(vec![1, 0, 1]));
    }

    #[test]
    fn missing_progress_stays_null() {
        let record = assemble(row(None), Vec::new()).expect("valid row");
        assert_eq!(record.progress, None);
    }

    #[test]
    fn corrupt_progress_is_reported() {
        let err = assemble(row(Some("1,x")), Vec::new()).expect_err("corrupt");
        assert!(matches!(err, RepoError::Corrupt(_)));
    }

    #[test]
    fn task_lists_are_decoded() {
        let task = AssignmentTaskRecord::try_from(TaskRow {
            id: 1,
            assignment_id: 5,
            task_type: 11,
            value_types: "1,2,3".to_string(),
            values: "4,5,6".to_string(),
        })
        .expect("valid task");
        assert_eq!(task.value_types, vec![1, 2, 3]);
        assert_eq!(task.values, vec![4, 5, 6]);
    }
}
