//! Resource schemas: the per-entity allow-lists consumed by the query translator.
//!
//! Wire names are what clients put in `where[...]` and `orderBy`; columns are
//! what the Postgres layer writes into SQL. Only columns listed here can ever
//! reach a query string, every value is bound as a parameter.

use serde::Serialize;

use crate::domain::entities::{
    AssignmentRecord, EventRecord, OrderRecord, ReportRecord, StratagemRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Text,
    Timestamp,
    Bool,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Int => "integer",
            FieldType::Text => "text",
            FieldType::Timestamp => "timestamp",
            FieldType::Bool => "boolean",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldType,
    pub filterable: bool,
    pub sortable: bool,
}

impl FieldSpec {
    const fn both(name: &'static str, column: &'static str, kind: FieldType) -> Self {
        Self {
            name,
            column,
            kind,
            filterable: true,
            sortable: true,
        }
    }

    const fn filter_only(name: &'static str, column: &'static str, kind: FieldType) -> Self {
        Self {
            name,
            column,
            kind,
            filterable: true,
            sortable: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ResourceSchema {
    /// Collection path, e.g. `/events`.
    pub path: &'static str,
    /// Human label used in not-found details.
    pub label: &'static str,
    pub table: &'static str,
    /// Column used as the final sort tie-breaker.
    pub primary_key: &'static str,
    pub fields: &'static [FieldSpec],
}

impl ResourceSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn not_found_detail(&self, id: i64) -> String {
        format!("{} with id ({id}) not found", self.label)
    }
}

pub static ASSIGNMENTS: ResourceSchema = ResourceSchema {
    path: "/assignments",
    label: "Assignment",
    table: "assignments",
    primary_key: "id",
    fields: &[
        FieldSpec::both("id", "id", FieldType::Int),
        FieldSpec::both("title", "title", FieldType::Text),
        FieldSpec::filter_only("briefing", "briefing", FieldType::Text),
        FieldSpec::filter_only("description", "description", FieldType::Text),
        FieldSpec::both("expiration", "expiration", FieldType::Timestamp),
        FieldSpec::both("createdAt", "created_at", FieldType::Timestamp),
        FieldSpec::both("updatedAt", "updated_at", FieldType::Timestamp),
    ],
};

pub static EVENTS: ResourceSchema = ResourceSchema {
    path: "/events",
    label: "Event",
    table: "global_events",
    primary_key: "id",
    fields: &[
        FieldSpec::both("id", "id", FieldType::Int),
        FieldSpec::both("eventId", "event_id", FieldType::Int),
        FieldSpec::both("title", "title", FieldType::Text),
        FieldSpec::filter_only("message", "message", FieldType::Text),
        FieldSpec::both("race", "race", FieldType::Text),
        FieldSpec::both("flag", "flag", FieldType::Int),
        FieldSpec::both("createdAt", "created_at", FieldType::Timestamp),
        FieldSpec::both("updatedAt", "updated_at", FieldType::Timestamp),
    ],
};

pub static ORDERS: ResourceSchema = ResourceSchema {
    path: "/orders",
    label: "Order",
    table: "orders",
    primary_key: "id",
    fields: &[
        FieldSpec::both("id", "id", FieldType::Int),
        FieldSpec::filter_only("message", "message", FieldType::Text),
        FieldSpec::both("rewardType", "reward_type", FieldType::Int),
        FieldSpec::both("rewardAmount", "reward_amount", FieldType::Int),
        FieldSpec::both("expiresAt", "expires_at", FieldType::Timestamp),
        FieldSpec::both("createdAt", "created_at", FieldType::Timestamp),
        FieldSpec::both("updatedAt", "updated_at", FieldType::Timestamp),
    ],
};

pub static REPORTS: ResourceSchema = ResourceSchema {
    path: "/reports",
    label: "Report",
    table: "news",
    primary_key: "id",
    fields: &[
        FieldSpec::both("id", "id", FieldType::Int),
        FieldSpec::filter_only("message", "message", FieldType::Text),
        FieldSpec::both("type", "news_type", FieldType::Int),
        FieldSpec::both("publishedAt", "published_at", FieldType::Timestamp),
        FieldSpec::both("createdAt", "created_at", FieldType::Timestamp),
        FieldSpec::both("updatedAt", "updated_at", FieldType::Timestamp),
    ],
};

pub static STRATAGEMS: ResourceSchema = ResourceSchema {
    path: "/stratagems",
    label: "Stratagem",
    table: "stratagems",
    primary_key: "id",
    fields: &[
        FieldSpec::both("id", "id", FieldType::Int),
        FieldSpec::both("codename", "codename", FieldType::Text),
        FieldSpec::both("name", "name", FieldType::Text),
        FieldSpec::filter_only("uses", "uses", FieldType::Text),
        FieldSpec::both("cooldown", "cooldown", FieldType::Int),
        FieldSpec::both("activation", "activation", FieldType::Int),
        FieldSpec::both("groupId", "group_id", FieldType::Int),
        FieldSpec::both("createdAt", "created_at", FieldType::Timestamp),
        FieldSpec::both("updatedAt", "updated_at", FieldType::Timestamp),
    ],
};

/// Response-time settings applied to records before they are serialized.
#[derive(Debug, Clone, Default)]
pub struct Presentation {
    /// Base URL of the asset storage, without a trailing slash.
    pub storage_url: Option<String>,
}

impl Presentation {
    pub fn new(storage_url: Option<String>) -> Self {
        Self {
            storage_url: storage_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    fn asset_base(&self, collection: &str) -> String {
        match self.storage_url.as_deref() {
            Some(base) => format!("{base}/{collection}"),
            None => String::new(),
        }
    }
}

/// A record type served by a collection route.
pub trait Resource: Serialize + Send + Sync + 'static {
    fn schema() -> &'static ResourceSchema;

    fn present(&mut self, _presentation: &Presentation) {}
}

impl Resource for AssignmentRecord {
    fn schema() -> &'static ResourceSchema {
        &ASSIGNMENTS
    }
}

impl Resource for EventRecord {
    fn schema() -> &'static ResourceSchema {
        &EVENTS
    }
}

impl Resource for OrderRecord {
    fn schema() -> &'static ResourceSchema {
        &ORDERS
    }
}

impl Resource for ReportRecord {
    fn schema() -> &'static ResourceSchema {
        &REPORTS
    }
}

impl Resource for StratagemRecord {
    fn schema() -> &'static ResourceSchema {
        &STRATAGEMS
    }

    fn present(&mut self, presentation: &Presentation) {
        self.image_url = format!("{}{}", presentation.asset_base("stratagems"), self.image_url);
    }
}
