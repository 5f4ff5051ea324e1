//! Query-string translation.
//!
//! Turns untrusted `where[...]`, `orderBy`, `skip` and `take` parameters into a
//! validated [`QueryDescriptor`]. Field names are resolved against the
//! resource's allow-list, values are coerced to the field's declared type, and
//! the pagination window is checked against the configured limits.
//!
//! Recognised parameters:
//!
//! ```text
//! where[title]=Liberate            equals
//! where[flag][gte]=2               comparison
//! where[id][in]=1,2,3              membership
//! orderBy=createdAt:desc,id        sort keys, ascending by default
//! skip=20&take=10                  pagination window
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::num::NonZeroU32;

use thiserror::Error;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use tracing::trace;
use url::form_urlencoded;

use super::resources::{FieldSpec, FieldType, ResourceSchema};

const WHERE_PREFIX: &str = "where[";
const ORDER_BY: &str = "orderBy";
const SKIP: &str = "skip";
const TAKE: &str = "take";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Malformed filter parameter `{param}`; expected where[field] or where[field][operator]")]
    MalformedFilter { param: String },
    #[error("Unknown filter field `{field}`")]
    UnknownFilterField { field: String },
    #[error("Unsupported operator `{operator}` for field `{field}`")]
    UnsupportedOperator { field: String, operator: String },
    #[error("Filter `{field}` with operator `{operator}` was given more than once")]
    DuplicateFilter { field: String, operator: String },
    #[error("Value `{value}` for field `{field}` is not a valid {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },
    #[error("Unknown sort field `{field}`")]
    UnknownSortField { field: String },
    #[error("Invalid sort direction `{direction}` for field `{field}`; expected asc or desc")]
    InvalidDirection { field: String, direction: String },
    #[error("Sort field `{field}` was given more than once")]
    DuplicateSort { field: String },
    #[error("Query parameter `{param}` must be a non-negative integer, got `{value}`")]
    InvalidInteger { param: &'static str, value: String },
    #[error("Query parameter `{param}` was given more than once")]
    DuplicateParameter { param: &'static str },
    #[error("Query parameter `take` must be between 1 and {max}, got {value}")]
    TakeOutOfRange { value: u64, max: u32 },
}

/// Comparison applied by a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Equals,
    Not,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Not => "not",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Contains => "contains",
            Operator::In => "in",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "equals" => Operator::Equals,
            "not" => Operator::Not,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "contains" => Operator::Contains,
            "in" => Operator::In,
            _ => return None,
        })
    }

    fn supports(&self, kind: FieldType) -> bool {
        match self {
            Operator::Equals | Operator::Not | Operator::In => true,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                matches!(kind, FieldType::Int | FieldType::Timestamp)
            }
            Operator::Contains => kind == FieldType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scalar {
    Int(i64),
    Text(String),
    Timestamp(OffsetDateTime),
    Bool(bool),
}

impl Scalar {
    fn coerce(field: &FieldSpec, raw: &str) -> Result<Self, QueryError> {
        let invalid = || QueryError::InvalidValue {
            field: field.name.to_string(),
            value: raw.to_string(),
            expected: field.kind.as_str(),
        };

        match field.kind {
            FieldType::Int => raw.trim().parse().map(Scalar::Int).map_err(|_| invalid()),
            FieldType::Text => Ok(Scalar::Text(raw.to_string())),
            FieldType::Timestamp => OffsetDateTime::parse(raw.trim(), &Rfc3339)
                .map(|ts| Scalar::Timestamp(ts.to_offset(UtcOffset::UTC)))
                .map_err(|_| invalid()),
            FieldType::Bool => match raw.trim() {
                "true" => Ok(Scalar::Bool(true)),
                "false" => Ok(Scalar::Bool(false)),
                _ => Err(invalid()),
            },
        }
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Scalar::Int(value) => {
                let _ = write!(out, "{value}");
            }
            Scalar::Text(value) => out.extend(form_urlencoded::byte_serialize(value.as_bytes())),
            Scalar::Timestamp(value) => match value.format(&Rfc3339) {
                Ok(formatted) => out.push_str(&formatted),
                Err(_) => {
                    let _ = write!(out, "{}", value.unix_timestamp_nanos());
                }
            },
            Scalar::Bool(value) => {
                let _ = write!(out, "{value}");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: &'static FieldSpec,
    pub operator: Operator,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static FieldSpec,
    pub direction: Direction,
}

/// Validated filter, sort and pagination intent for a collection request.
///
/// Predicates are kept ordered by `(field, operator)` so two descriptors built
/// from differently ordered query strings compare equal and canonicalize to
/// the same text. Sort keys keep the order the client gave, since that order
/// changes the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub filter: Vec<Predicate>,
    pub order_by: Vec<SortKey>,
    pub skip: u32,
    pub take: NonZeroU32,
}

impl QueryDescriptor {
    /// Deterministic text form used in cache keys.
    pub fn canonical(&self) -> String {
        let mut out = String::from("where=");
        for (index, predicate) in self.filter.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            let _ = write!(
                out,
                "{}.{}=",
                predicate.field.name,
                predicate.operator.as_str()
            );
            match &predicate.value {
                FilterValue::One(scalar) => scalar.write_canonical(&mut out),
                FilterValue::Many(scalars) => {
                    for (position, scalar) in scalars.iter().enumerate() {
                        if position > 0 {
                            out.push('|');
                        }
                        scalar.write_canonical(&mut out);
                    }
                }
            }
        }

        out.push_str(";orderBy=");
        for (index, key) in self.order_by.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}:{}", key.field.name, key.direction.as_str());
        }

        let _ = write!(out, ";skip={};take={}", self.skip, self.take);
        out
    }
}

/// Page-size limits shared by every collection route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Window size used when the client sends no `take`.
    pub default_take: NonZeroU32,
    pub max_take: NonZeroU32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_take: NonZeroU32::new(25).unwrap_or(NonZeroU32::MIN),
            max_take: NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateMode {
    /// List endpoints: every recognised parameter is parsed and validated.
    Collection,
    /// Per-id endpoints: filter, sort and pagination parameters are discarded.
    SingleRecord,
}

pub struct QueryTranslator {
    schema: &'static ResourceSchema,
    limits: QueryLimits,
}

impl QueryTranslator {
    pub fn new(schema: &'static ResourceSchema, limits: QueryLimits) -> Self {
        Self { schema, limits }
    }

    /// Translate decoded query pairs.
    ///
    /// Returns `None` in [`TranslateMode::SingleRecord`], where the record is
    /// addressed by its identifier alone.
    pub fn translate(
        &self,
        params: &[(String, String)],
        mode: TranslateMode,
    ) -> Result<Option<QueryDescriptor>, QueryError> {
        match mode {
            TranslateMode::SingleRecord => {
                trace!(
                    resource = self.schema.path,
                    discarded = params.len(),
                    "single-record lookup ignores query parameters"
                );
                Ok(None)
            }
            TranslateMode::Collection => self.collection(params).map(Some),
        }
    }

    /// Translate decoded query pairs for a list endpoint.
    pub fn collection(&self, params: &[(String, String)]) -> Result<QueryDescriptor, QueryError> {
        let mut filters: BTreeMap<(&'static str, Operator), Predicate> = BTreeMap::new();
        let mut order_by: Vec<SortKey> = Vec::new();
        let mut skip = None;
        let mut take = None;

        for (name, value) in params {
            if let Some(rest) = name.strip_prefix(WHERE_PREFIX) {
                let predicate = self.parse_filter(name, rest, value)?;
                let slot = (predicate.field.name, predicate.operator);
                if filters.insert(slot, predicate).is_some() {
                    return Err(QueryError::DuplicateFilter {
                        field: slot.0.to_string(),
                        operator: slot.1.as_str().to_string(),
                    });
                }
                continue;
            }

            match name.as_str() {
                ORDER_BY => self.parse_order_by(value, &mut order_by)?,
                SKIP => set_once(&mut skip, SKIP, parse_u64(SKIP, value)?)?,
                TAKE => set_once(&mut take, TAKE, parse_u64(TAKE, value)?)?,
                _ => {}
            }
        }

        let skip = match skip {
            Some(value) => u32::try_from(value).map_err(|_| QueryError::InvalidInteger {
                param: SKIP,
                value: value.to_string(),
            })?,
            None => 0,
        };

        let take = match take {
            Some(value) => self.check_take(value)?,
            None => self.limits.default_take,
        };

        Ok(QueryDescriptor {
            filter: filters.into_values().collect(),
            order_by,
            skip,
            take,
        })
    }

    fn parse_filter(&self, param: &str, rest: &str, raw: &str) -> Result<Predicate, QueryError> {
        let malformed = || QueryError::MalformedFilter {
            param: param.to_string(),
        };

        let (field_name, tail) = rest.split_once(']').ok_or_else(malformed)?;
        let operator_name = if tail.is_empty() {
            None
        } else {
            let inner = tail
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .ok_or_else(malformed)?;
            Some(inner)
        };
        if field_name.is_empty() {
            return Err(malformed());
        }

        let field = self
            .schema
            .field(field_name)
            .filter(|field| field.filterable)
            .ok_or_else(|| QueryError::UnknownFilterField {
                field: field_name.to_string(),
            })?;

        let operator = match operator_name {
            None => Operator::Equals,
            Some(name) => Operator::parse(name).ok_or_else(|| QueryError::UnsupportedOperator {
                field: field.name.to_string(),
                operator: name.to_string(),
            })?,
        };
        if !operator.supports(field.kind) {
            return Err(QueryError::UnsupportedOperator {
                field: field.name.to_string(),
                operator: operator.as_str().to_string(),
            });
        }

        let value = match operator {
            Operator::In => {
                let mut items = raw
                    .split(',')
                    .map(|item| Scalar::coerce(field, item))
                    .collect::<Result<Vec<_>, _>>()?;
                // Membership ignores order and repeats.
                items.sort();
                items.dedup();
                FilterValue::Many(items)
            }
            _ => FilterValue::One(Scalar::coerce(field, raw)?),
        };

        Ok(Predicate {
            field,
            operator,
            value,
        })
    }

    fn parse_order_by(&self, raw: &str, keys: &mut Vec<SortKey>) -> Result<(), QueryError> {
        for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (name, direction) = match item.split_once(':') {
                Some((name, direction)) => (name, Some(direction)),
                None => (item, None),
            };

            let field = self
                .schema
                .field(name)
                .filter(|field| field.sortable)
                .ok_or_else(|| QueryError::UnknownSortField {
                    field: name.to_string(),
                })?;

            let direction = match direction.map(str::to_ascii_lowercase).as_deref() {
                None | Some("asc") => Direction::Asc,
                Some("desc") => Direction::Desc,
                Some(other) => {
                    return Err(QueryError::InvalidDirection {
                        field: field.name.to_string(),
                        direction: other.to_string(),
                    });
                }
            };

            if keys.iter().any(|key| key.field.name == field.name) {
                return Err(QueryError::DuplicateSort {
                    field: field.name.to_string(),
                });
            }
            keys.push(SortKey { field, direction });
        }
        Ok(())
    }

    fn check_take(&self, value: u64) -> Result<NonZeroU32, QueryError> {
        let max = self.limits.max_take;
        u32::try_from(value)
            .ok()
            .filter(|take| *take <= max.get())
            .and_then(NonZeroU32::new)
            .ok_or(QueryError::TakeOutOfRange {
                value,
                max: max.get(),
            })
    }
}

fn set_once(slot: &mut Option<u64>, param: &'static str, value: u64) -> Result<(), QueryError> {
    if slot.replace(value).is_some() {
        return Err(QueryError::DuplicateParameter { param });
    }
    Ok(())
}

fn parse_u64(param: &'static str, raw: &str) -> Result<u64, QueryError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| QueryError::InvalidInteger {
            param,
            value: raw.to_string(),
        })
}

/// Decode a raw query string into ordered name/value pairs.
pub fn decode_query(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|query| {
        form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    })
    .unwrap_or_default()
}
