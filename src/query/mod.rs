//! Query engine - the read operations over the index
//!
//! Pagination rules shared by every listing: a negative offset counts as 0,
//! an offset past the end yields an empty page, `limit <= 0` means the
//! operation's default page size, and any limit is clamped to the hard cap.

pub mod plan;

pub use plan::SearchPlan;

use log::debug;
use std::sync::Arc;

use crate::error::Result;
use crate::store::types::{Declaration, Page};
use crate::store::IndexStore;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 500;

/// Normalized offset/limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn resolve(offset: i64, limit: i64, default_limit: usize, cap: usize) -> Self {
        let cap = cap.max(1);
        let limit = if limit <= 0 {
            default_limit
        } else {
            usize::try_from(limit).unwrap_or(cap)
        };
        Self {
            offset: usize::try_from(offset).unwrap_or(0),
            limit: limit.clamp(1, cap),
        }
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<IndexStore>,
    max_page_size: usize,
}

impl QueryEngine {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self {
            store,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Ranked declaration lookup by name
    pub fn search_declarations(&self, name: &str, offset: i64, limit: i64) -> Result<Page<Declaration>> {
        let page = PageRequest::resolve(offset, limit, DEFAULT_SEARCH_LIMIT, self.max_page_size);
        let Some(plan) = SearchPlan::new(name) else {
            return Ok(Page::empty(page.offset, page.limit));
        };

        let result = self.store.search(&plan, page.offset, page.limit)?;
        debug!(
            "search '{}' -> {} of {} (offset {}, limit {})",
            name,
            result.items.len(),
            result.total,
            page.offset,
            page.limit
        );
        Ok(result)
    }

    /// Names of all indexed groups, sorted
    pub fn list_indexed_apis(&self) -> Result<Vec<String>> {
        self.store.get_groups()
    }

    /// Files of one group; an unknown group is an empty page
    pub fn list_api_files(&self, api_name: &str, offset: i64, limit: i64) -> Result<Page<String>> {
        let page = PageRequest::resolve(offset, limit, DEFAULT_LIST_LIMIT, self.max_page_size);
        self.store.get_files(api_name, page.offset, page.limit)
    }

    /// Declarations in one file across all groups, ordered by (group, line)
    pub fn list_functions_by_file(
        &self,
        file_path: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Page<Declaration>> {
        let page = PageRequest::resolve(offset, limit, DEFAULT_LIST_LIMIT, self.max_page_size);
        let file_path = file_path.trim().replace('\\', "/");
        let file_path = file_path.trim_start_matches("./");
        self.store
            .get_declarations_by_file(file_path, page.offset, page.limit)
    }
}
