//! The `{data, error, pagination}` response envelope shared by every route.

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    error::{ApiError, ErrorReport},
    pagination::Pagination,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Value,
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl Envelope {
    pub fn record(data: Value) -> Self {
        Self {
            data,
            error: None,
            pagination: None,
        }
    }

    pub fn collection(items: Vec<Value>, pagination: Pagination) -> Self {
        Self {
            data: Value::Array(items),
            error: None,
            pagination: Some(pagination),
        }
    }

    pub fn failure(details: Vec<String>) -> Self {
        Self {
            data: Value::Null,
            error: Some(ErrorBody { details }),
            pagination: None,
        }
    }
}

/// An immutable response: status plus envelope.
///
/// Cloning is cheap; this is the value held by the response cache.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    envelope: Arc<Envelope>,
    report: Option<ErrorReport>,
}

impl ApiResponse {
    pub fn ok(envelope: Envelope) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Arc::new(envelope),
            report: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// True when both responses share the same stored envelope.
    pub fn shares_envelope(&self, other: &ApiResponse) -> bool {
        Arc::ptr_eq(&self.envelope, &other.envelope)
    }
}

impl From<ApiError> for ApiResponse {
    fn from(error: ApiError) -> Self {
        let status = error.status_code();
        let report = ErrorReport::from_message(error.source_label(), status, error.to_string());
        Self {
            status,
            envelope: Arc::new(Envelope::failure(vec![error.to_string()])),
            report: Some(report),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.envelope.as_ref())).into_response();
        if let Some(report) = self.report {
            report.attach(&mut response);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use serde_json::json;

    use super::*;

    #[test]
    fn record_envelope_omits_pagination() {
        let envelope = Envelope::record(json!({"id": 1}));
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json, json!({"data": {"id": 1}, "error": null}));
    }

    #[test]
    fn collection_envelope_carries_pagination() {
        let take = NonZeroU32::new(5).expect("non-zero");
        let envelope = Envelope::collection(vec![json!(1)], Pagination::new(0, take, 12));
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            json["pagination"],
            json!({"page": 1, "pageSize": 5, "pageCount": 3, "total": 12})
        );
    }

    #[test]
    fn errors_become_null_data_envelopes() {
        let response = ApiResponse::from(ApiError::not_found("Event with id (42) not found"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::to_value(response.envelope()).expect("serialize"),
            json!({"data": null, "error": {"details": ["Event with id (42) not found"]}})
        );
    }

    #[test]
    fn clones_share_the_envelope() {
        let response = ApiResponse::ok(Envelope::record(Value::Null));
        assert!(response.shares_envelope(&response.clone()));
    }
}
