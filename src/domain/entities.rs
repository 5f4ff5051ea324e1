//! Domain records mirrored from persistent storage.
//!
//! Records serialize with camelCase keys and RFC 3339 timestamps; this is the
//! JSON shape clients see inside the `data` member of every envelope.

use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: i64,
    pub title: Option<String>,
    pub briefing: Option<String>,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expiration: OffsetDateTime,
    pub progress: Option<Vec<i64>>,
    pub tasks: Vec<AssignmentTaskRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentTaskRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub task_type: i32,
    pub value_types: Vec<i64>,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecord {
    pub id: i64,
    pub assignment_id: i64,
    #[serde(rename = "type")]
    pub reward_type: i32,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: i64,
    pub event_id: i64,
    pub title: Option<String>,
    pub message: Option<String>,
    pub race: Option<String>,
    pub flag: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: i64,
    pub message: Option<String>,
    pub reward_type: Option<i32>,
    pub reward_amount: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: i64,
    pub message: String,
    #[serde(rename = "type")]
    pub news_type: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StratagemRecord {
    pub id: i64,
    pub codename: Option<String>,
    pub name: String,
    pub keys: Vec<String>,
    pub uses: String,
    pub cooldown: Option<i32>,
    pub activation: Option<i32>,
    pub image_url: String,
    pub group_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
