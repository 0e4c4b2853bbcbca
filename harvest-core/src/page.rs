//! Offset pagination request/response types.

use crate::error::{HarvestError, HarvestResult};
use crate::query::{Filter, OrderBy, Record};
use serde::{Deserialize, Serialize};

/// A page request against one category.
///
/// `limit: None` means "use the configured default". An empty `order_by`
/// means "newest first" on the category's creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub page: u32,
    pub limit: Option<u32>,
    /// Projection; `None` returns every column.
    pub select: Option<Vec<String>>,
    /// Relations to embed in each returned record.
    pub include: Vec<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            filter: Filter::all(),
            order_by: Vec::new(),
            page: 1,
            limit: None,
            select: None,
            include: Vec::new(),
        }
    }
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }

    /// Resolve the effective limit and check page/limit bounds.
    pub fn resolve_limit(&self, default_limit: u32, max_limit: u32) -> HarvestResult<u32> {
        if self.page == 0 {
            return Err(HarvestError::invalid_value("page", "page numbers start at 1"));
        }
        let limit = self.limit.unwrap_or(default_limit);
        if limit == 0 {
            return Err(HarvestError::invalid_value("limit", "limit must be greater than 0"));
        }
        if limit > max_limit {
            return Err(HarvestError::invalid_value(
                "limit",
                format!("limit {} exceeds the maximum of {}", limit, max_limit),
            ));
        }
        Ok(limit)
    }
}

/// Page metadata returned alongside the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// Derive page metadata. `limit` must be non-zero.
    pub fn compute(page: u32, limit: u32, total: u64) -> Self {
        let limit_wide = u64::from(limit.max(1));
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit_wide),
            has_next: u64::from(page) * limit_wide < total,
            has_prev: page > 1,
        }
    }

    /// Rows to skip for this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// A page of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub data: Vec<Record>,
    pub pagination: Pagination,
}
