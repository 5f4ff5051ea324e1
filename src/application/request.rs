//! Inbound read requests before and after translation.

use super::{
    error::ApiError,
    query::{QueryDescriptor, QueryLimits, QueryTranslator, TranslateMode, decode_query},
    resources::ResourceSchema,
};

/// A read request as it arrives: route identity, raw path id, decoded query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    route: &'static str,
    id: Option<String>,
    params: Vec<(String, String)>,
}

impl ResourceRequest {
    pub fn collection(route: &'static str, raw_query: Option<&str>) -> Self {
        Self {
            route,
            id: None,
            params: decode_query(raw_query),
        }
    }

    pub fn record(route: &'static str, id: impl Into<String>, raw_query: Option<&str>) -> Self {
        Self {
            route,
            id: Some(id.into()),
            params: decode_query(raw_query),
        }
    }

    pub fn route(&self) -> &'static str {
        self.route
    }

    /// Validate the request against `schema`.
    ///
    /// Requests carrying a path id resolve to a single-record lookup and ignore
    /// their query string; the rest go through the collection translator.
    pub fn resolve(
        &self,
        schema: &'static ResourceSchema,
        limits: QueryLimits,
    ) -> Result<ResolvedRequest, ApiError> {
        let translator = QueryTranslator::new(schema, limits);

        let target = match self.id.as_deref() {
            Some(raw) => {
                let id = parse_id(raw)?;
                translator.translate(&self.params, TranslateMode::SingleRecord)?;
                Target::Record(id)
            }
            None => Target::Collection(translator.collection(&self.params)?),
        };

        Ok(ResolvedRequest {
            route: self.route,
            target,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Record(i64),
    Collection(QueryDescriptor),
}

/// A request whose parameters passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub route: &'static str,
    pub target: Target,
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| {
        ApiError::validation(format!(
            "Path parameter \"id\" must be an integer, got \"{raw}\""
        ))
    })
}
