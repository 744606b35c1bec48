//! Shared request and response shapes.

use rto_core::db::{PaginatedResult, Pagination};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// A page of results in the envelope every list endpoint returns.
#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl<T> From<PaginatedResult<T>> for Paginated<T> {
    fn from(result: PaginatedResult<T>) -> Self {
        Self {
            data: result.items,
            page: result.page,
            per_page: result.per_page,
            total: result.total,
            total_pages: result.total_pages,
        }
    }
}

/// Query for lists with no resource-specific filters.
///
/// Resource queries repeat these fields: `serde(flatten)` breaks number
/// parsing in query strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

impl ListParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page, self.per_page)
    }

    pub fn search(&self) -> Option<String> {
        clean_search(self.search.as_deref())
    }
}

/// The trimmed search term, or `None` when blank.
pub fn clean_search(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Deserializes a field that distinguishes "absent" from "null".
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: absent gives `None`, `null` gives `Some(None)`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Message-only response for actions without a resource to return.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
