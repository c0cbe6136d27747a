//! Page-based pagination for list endpoints.
//!
//! Requests carry `page` (1-indexed, default 1) and `limit` (default 20, clamped to
//! 1..=100). Responses carry a `pagination` object of `{ total, page, limit, pages }`.
//!
//! This is classic offset pagination: rows inserted between two page requests can
//! shift page boundaries, so a client walking pages may see a row twice or miss one.

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Query strings arrive as text. Empty or non-numeric values fall back to the
/// defaults instead of rejecting the request.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse::<i64>().ok()))
}

/// PageRequest
///
/// The `page` / `limit` query parameters accepted by every list endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageRequest {
    /// 1-indexed page number (default 1).
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page: Option<i64>,
    /// Page size (default 20, max 100).
    #[serde(default, deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Number of rows skipped before this page: `(page - 1) * limit`.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

/// Pagination
///
/// The metadata object embedded in every paginated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

/// `ceil(total / limit)`, and 0 for an empty collection.
pub fn page_count(total: i64, limit: i64) -> i64 {
    if total <= 0 || limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

/// PageResult
///
/// One slice of a collection plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            limit: request.limit(),
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }

    pub fn page_count(&self) -> i64 {
        page_count(self.total, self.limit)
    }

    pub fn pagination(&self) -> Pagination {
        Pagination {
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.page_count(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }

    /// Splits into the item list and its metadata for an envelope.
    pub fn into_parts(self) -> (Vec<T>, Pagination) {
        let pagination = self.pagination();
        (self.items, pagination)
    }
}
