//! SQL rendering of a [`QueryDescriptor`].
//!
//! Column names come from the static resource schemas; every client-supplied
//! value is bound as a parameter.

use std::num::NonZeroU32;

use sqlx::{
    FromRow, PgPool, Postgres, QueryBuilder,
    postgres::PgRow,
};

use crate::application::{
    query::{Direction, FilterValue, Operator, Predicate, QueryDescriptor, Scalar, SortKey},
    repos::{ListPage, RepoError},
    resources::ResourceSchema,
};

use super::util::{convert_count, map_sqlx_error};

/// Run the count and the windowed select for one collection request.
pub(super) async fn fetch_page<R>(
    pool: &PgPool,
    schema: &ResourceSchema,
    columns: &str,
    query: &QueryDescriptor,
) -> Result<ListPage<R>, RepoError>
where
    R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut count_qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT COUNT(*) FROM {} WHERE 1=1",
        schema.table
    ));
    push_filters(&mut count_qb, &query.filter);

    let mut rows_qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {columns} FROM {} WHERE 1=1",
        schema.table
    ));
    push_filters(&mut rows_qb, &query.filter);
    push_order_by(&mut rows_qb, schema, &query.order_by);
    push_window(&mut rows_qb, query.skip, query.take);

    let (total, items) = tokio::try_join!(
        count_qb.build_query_scalar::<i64>().fetch_one(pool),
        rows_qb.build_query_as::<R>().fetch_all(pool),
    )
    .map_err(map_sqlx_error)?;

    Ok(ListPage {
        items,
        total: convert_count(total)?,
    })
}

pub(super) fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &[Predicate]) {
    for predicate in filter {
        let column = predicate.field.column;
        qb.push(" AND ");

        match (&predicate.operator, &predicate.value) {
            (Operator::In, FilterValue::Many(values)) => {
                qb.push(column).push(" IN (");
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        qb.push(", ");
                    }
                    push_scalar(qb, value);
                }
                qb.push(")");
            }
            (Operator::Contains, FilterValue::One(Scalar::Text(text))) => {
                qb.push(column).push(" ILIKE ");
                qb.push_bind(format!("%{}%", escape_like(text)));
            }
            (operator, FilterValue::One(value)) => {
                qb.push(column).push(comparison(*operator));
                push_scalar(qb, value);
            }
            // Lists only come from `in`.
            (_, FilterValue::Many(_)) => {
                qb.push("FALSE");
            }
        }
    }
}

pub(super) fn push_order_by(
    qb: &mut QueryBuilder<'_, Postgres>,
    schema: &ResourceSchema,
    order_by: &[SortKey],
) {
    qb.push(" ORDER BY ");
    for (index, key) in order_by.iter().enumerate() {
        if index > 0 {
            qb.push(", ");
        }
        qb.push(key.field.column).push(match key.direction {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        });
    }

    // Windows stay stable across pages only with a unique final key.
    if !order_by
        .iter()
        .any(|key| key.field.column == schema.primary_key)
    {
        if !order_by.is_empty() {
            qb.push(", ");
        }
        qb.push(schema.primary_key).push(" ASC");
    }
}

pub(super) fn push_window(qb: &mut QueryBuilder<'_, Postgres>, skip: u32, take: NonZeroU32) {
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(take.get()));
    qb.push(" OFFSET ");
    qb.push_bind(i64::from(skip));
}

fn push_scalar(qb: &mut QueryBuilder<'_, Postgres>, value: &Scalar) {
    match value.clone() {
        Scalar::Int(value) => {
            qb.push_bind(value);
        }
        Scalar::Text(value) => {
            qb.push_bind(value);
        }
        Scalar::Timestamp(value) => {
            qb.push_bind(value);
        }
        Scalar::Bool(value) => {
            qb.push_bind(value);
        }
    }
}

fn comparison(operator: Operator) -> &'static str {
    match operator {
        Operator::Equals | Operator::In | Operator::Contains => " = ",
        Operator::Not => " <> ",
        Operator::Lt => " < ",
        Operator::Lte => " <= ",
        Operator::Gt => " > ",
        Operator::Gte => " >= ",
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
