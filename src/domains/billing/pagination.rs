//! Page / search parameters for invoice listings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 12;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_LATEST_LIMIT: i64 = 5;
pub const MAX_LATEST_LIMIT: i64 = 100;

/// Raw query string of `GET /facturas`. Values stay strings so that
/// malformed numbers fall back to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFacturasQuery {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<String>,
}

impl LatestQuery {
    pub fn limit(&self) -> i64 {
        parse_positive(self.limit.as_deref())
            .unwrap_or(DEFAULT_LATEST_LIMIT)
            .min(MAX_LATEST_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacturaFilter {
    pub page: i64,
    pub page_size: i64,
    /// Trimmed search text; `None` when absent or blank.
    pub query: Option<String>,
}

impl Default for FacturaFilter {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            query: None,
        }
    }
}

impl FacturaFilter {
    pub fn from_query(raw: &ListFacturasQuery) -> Self {
        Self {
            page: parse_positive(raw.page.as_deref()).unwrap_or(DEFAULT_PAGE),
            page_size: parse_positive(raw.page_size.as_deref())
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .min(MAX_PAGE_SIZE),
            query: raw
                .query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// `%query%` with LIKE metacharacters escaped, for `ILIKE ... ESCAPE '\'`.
    pub fn like_pattern(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(|q| format!("%{}%", escape_like(q)))
    }

    pub fn query_lowercase(&self) -> Option<String> {
        self.query.as_deref().map(str::to_lowercase)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
}

pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    (total + page_size - 1) / page_size
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub total_pages: i64,
    pub current_page: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, filter: &FacturaFilter) -> Self {
        Self {
            data,
            total,
            total_pages: total_pages(total, filter.page_size),
            current_page: filter.page,
        }
    }
}
