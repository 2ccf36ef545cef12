//! Query-string handling for list endpoints.
//!
//! Every list endpoint declares the keys it understands; anything else is
//! refused. `page` and `limit` are always accepted.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::dto::parse_date;
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use crate::infrastructure::{Filter, PaginatedResult, Pagination};

/// Default page size for list operations.
pub const DEFAULT_LIMIT: u32 = 10;

/// Maximum page size for list operations.
pub const MAX_LIMIT: u32 = 100;

// =============================================================================
// List Parameters
// =============================================================================

/// Validated query parameters of a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    params: HashMap<String, String>,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl ListParams {
    /// Checks the keys against `allowed` and reads `page` and `limit`.
    ///
    /// # Errors
    ///
    /// Returns 400 for an unknown key or a malformed page or limit.
    pub fn parse(params: HashMap<String, String>, allowed: &[&str]) -> ApiResult<Self> {
        if let Some(key) = params
            .keys()
            .find(|key| !matches!(key.as_str(), "page" | "limit") && !allowed.contains(&key.as_str()))
        {
            return Err(ApiErrorResponse::bad_request(format!("Key {key} is not allowed")));
        }

        let page = read_bounded(&params, "page", 1, u32::MAX)?;
        let limit = read_bounded(&params, "limit", DEFAULT_LIMIT, MAX_LIMIT)?;
        Ok(Self {
            params,
            page,
            limit,
        })
    }

    /// Paging taken from a request body instead of the query string.
    ///
    /// # Errors
    ///
    /// Returns 400 for an out-of-range page or limit.
    pub fn from_body(page: Option<u32>, limit: Option<u32>) -> ApiResult<Self> {
        let params = [("page", page), ("limit", limit)]
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key.to_string(), value.to_string())))
            .collect();
        Self::parse(params, &[])
    }

    /// Page request for the store (0-indexed).
    #[must_use]
    pub const fn pagination(&self) -> Pagination {
        Pagination::new(self.page - 1, self.limit)
    }

    /// Trimmed value of `key`, if present and non-empty.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Parses `key` as one of the wire names of `T`.
    ///
    /// # Errors
    ///
    /// Returns 400 when the value is not a variant of `T`.
    pub fn choice<T: DeserializeOwned>(&self, key: &str) -> ApiResult<Option<T>> {
        self.text(key)
            .map(|value| {
                serde_json::from_value(serde_json::Value::String(value.to_string()))
                    .map_err(|_| invalid(key))
            })
            .transpose()
    }

    /// Parses `key` with [`FromStr`], e.g. an id or a boolean.
    ///
    /// # Errors
    ///
    /// Returns 400 when the value does not parse.
    pub fn parsed<T: FromStr>(&self, key: &str) -> ApiResult<Option<T>> {
        self.text(key)
            .map(|value| value.parse().map_err(|_| invalid(key)))
            .transpose()
    }

    /// Parses `key` as a date.
    ///
    /// # Errors
    ///
    /// Returns 400 when the value is not a date.
    pub fn date(&self, key: &str) -> ApiResult<Option<DateTime<Utc>>> {
        self.text(key)
            .map(|value| parse_date(key, value).map_err(ApiErrorResponse::from))
            .transpose()
    }

    /// Bounds on a timestamp `field` from the `{prefix}_after` and
    /// `{prefix}_before` keys.
    ///
    /// # Errors
    ///
    /// Returns 400 when a bound is not a date.
    pub fn date_range(&self, field: &str, prefix: &str) -> ApiResult<Filter> {
        let after = self.date(&format!("{prefix}_after"))?;
        let before = self.date(&format!("{prefix}_before"))?;
        Ok(Filter::all_of(
            after
                .map(|instant| Filter::after(field, instant))
                .into_iter()
                .chain(before.map(|instant| Filter::before(field, instant))),
        ))
    }

    /// Case-insensitive substring search of `search` over `fields`.
    #[must_use]
    pub fn search(&self, fields: &[&str]) -> Filter {
        self.text("search")
            .map_or(Filter::All, |term| Filter::search(fields, term))
    }
}

fn invalid(key: &str) -> ApiErrorResponse {
    ValidationError::single(key, format!("Invalid value for {key}")).into()
}

fn read_bounded(
    params: &HashMap<String, String>,
    key: &str,
    default: u32,
    max: u32,
) -> ApiResult<u32> {
    let Some(value) = params.get(key).map(|value| value.trim()).filter(|value| !value.is_empty())
    else {
        return Ok(default);
    };
    match value.parse::<u32>() {
        Ok(number) if (1..=max).contains(&number) => Ok(number),
        _ => Err(ValidationError::single(key, format!("{key} must be between 1 and {max}")).into()),
    }
}

// =============================================================================
// List Response
// =============================================================================

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    /// Total number of matches across all pages.
    pub count: u64,
    pub total_pages: u64,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl<T> ListResponse<T> {
    /// Builds the response, converting each stored item.
    pub fn from_page<U>(result: PaginatedResult<U>, convert: impl FnMut(U) -> T) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items.into_iter().map(convert).collect(),
            count: result.total,
            total_pages,
            page: result.page + 1,
            limit: result.page_size,
        }
    }
}

impl<T> From<PaginatedResult<T>> for ListResponse<T> {
    fn from(result: PaginatedResult<T>) -> Self {
        Self::from_page(result, std::convert::identity)
    }
}
