//! Offset pagination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use harvest_core::{HarvestResult, OrderBy, PageRequest, PageResult, Pagination, PerfConfig};
use tracing::{debug, warn};

use crate::context::OpContext;
use crate::registry::CategoryRegistry;
use crate::store::{DataStore, FindQuery};

/// Serves [`PageRequest`]s with a data query and a count query issued
/// concurrently.
pub struct Paginator {
    store: Arc<dyn DataStore>,
    registry: Arc<CategoryRegistry>,
    default_limit: u32,
    max_limit: u32,
    large_page_threshold: u32,
    deep_page_warnings: AtomicU64,
}

impl Paginator {
    pub fn new(
        store: Arc<dyn DataStore>,
        registry: Arc<CategoryRegistry>,
        config: &PerfConfig,
    ) -> Self {
        Self {
            store,
            registry,
            default_limit: config.page_default_limit,
            max_limit: config.page_max_limit,
            large_page_threshold: config.large_page_threshold,
            deep_page_warnings: AtomicU64::new(0),
        }
    }

    /// Requests that asked for a page above the large-page threshold.
    pub fn deep_page_warnings(&self) -> u64 {
        self.deep_page_warnings.load(Ordering::Relaxed)
    }

    /// Fetch one page of `category`.
    ///
    /// A page past the last one returns empty `data` with the real `total`.
    /// Without an explicit order the newest records come first.
    pub async fn paginate(
        &self,
        category: &str,
        request: PageRequest,
        ctx: &OpContext,
    ) -> HarvestResult<PageResult> {
        let limit = request.resolve_limit(self.default_limit, self.max_limit)?;
        let table = self.registry.resolve(category)?;
        let page = request.page;

        if page > self.large_page_threshold {
            self.deep_page_warnings.fetch_add(1, Ordering::Relaxed);
            warn!(
                category = %category,
                page,
                limit,
                threshold = self.large_page_threshold,
                "Deep offset pagination, consider a narrower filter"
            );
        }

        let order_by = if request.order_by.is_empty() {
            vec![OrderBy::desc(table.created_at.clone())]
        } else {
            request.order_by
        };

        let skip = u64::from(page - 1) * u64::from(limit);
        let query = FindQuery {
            filter: request.filter,
            order_by,
            skip,
            limit: Some(u64::from(limit)),
            select: request.select,
            include: request.include,
        };
        table.validate_find(&query)?;

        let (data, total) = ctx
            .run("paginate", async {
                tokio::try_join!(
                    self.store.find_many(&table, &query),
                    self.store.count(&table, &query.filter),
                )
            })
            .await?;

        let pagination = Pagination::compute(page, limit, total);
        debug!(
            category = %category,
            page,
            limit,
            returned = data.len(),
            total,
            "Page served"
        );
        Ok(PageResult { data, pagination })
    }
}
