//! Offset and cursor pagination over a [`QuerySource`].
//!
//! Offset mode counts, clamps the requested page, and fetches with
//! OFFSET/LIMIT. Cursor mode seeks past the last-seen sort-key tuple and
//! peeks one row ahead instead of re-counting. There is no transactional
//! consistency between the count and the page fetch: under concurrent
//! writes, `total` and the returned rows may reflect slightly different
//! snapshots.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cursor::KeyCodec;
use super::error::PageResult;
use super::query::{FetchPlan, QuerySource, Range, SeekPredicate};
use super::sort::{FieldRegistry, SortSpec};

/// Offset-mode request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetParams {
    pub page: u64,
    pub page_size: u64,
    pub sort: SortSpec,
}

/// Cursor-mode request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorParams {
    pub cursor: Option<String>,
    pub limit: u64,
    pub sort: SortSpec,
}

/// One page of results plus paging metadata.
///
/// `total` and `pages` are omitted in cursor mode past the first page, where
/// re-counting on every scroll tick would cost a full-table COUNT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<u64>,
    pub page: Option<u64>,
    pub page_size: u64,
    pub pages: Option<u64>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Transform each row, keeping the paging metadata.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            pages: self.pages,
            next_cursor: self.next_cursor,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// Skip-count pagination.
pub struct OffsetPaginator {
    max_page_size: u64,
}

impl OffsetPaginator {
    pub fn new(max_page_size: u64) -> Self {
        Self {
            max_page_size: max_page_size.max(1),
        }
    }

    pub async fn paginate<T, S>(
        &self,
        source: &S,
        registry: &FieldRegistry<T>,
        params: &OffsetParams,
    ) -> PageResult<Page<T>>
    where
        S: QuerySource<T> + ?Sized,
    {
        registry.validate(&params.sort)?;

        let page_size = params.page_size.clamp(1, self.max_page_size);
        let total = source.count().await?;
        let pages = total.div_ceil(page_size);

        // An out-of-range page is served as the nearest valid one, never an
        // error: offset pagination is routinely driven by stale UI state
        // (deleted last page, shrunken result set).
        let mut page = params.page.max(1);
        if pages > 0 {
            page = page.min(pages);
        }

        debug!(
            "OFFSET paginate page={}, page_size={}, total={}, pages={}",
            page, page_size, total, pages
        );

        let items = if total == 0 {
            Vec::new()
        } else {
            let plan = FetchPlan {
                order: params.sort.clone(),
                range: Range::Offset {
                    offset: (page - 1) * page_size,
                    limit: page_size,
                },
            };
            source.fetch(&plan).await?
        };

        Ok(Page {
            items,
            total: Some(total),
            page: Some(page),
            page_size,
            pages: Some(pages),
            next_cursor: None,
            has_next: page < pages,
            has_prev: page > 1,
        })
    }
}

/// Seek (keyset) pagination.
pub struct CursorPaginator {
    max_limit: u64,
}

impl CursorPaginator {
    pub fn new(max_limit: u64) -> Self {
        Self {
            max_limit: max_limit.max(1),
        }
    }

    pub async fn paginate<T, S>(
        &self,
        source: &S,
        registry: &FieldRegistry<T>,
        params: &CursorParams,
    ) -> PageResult<Page<T>>
    where
        S: QuerySource<T> + ?Sized,
    {
        registry.validate(&params.sort)?;

        let limit = params.limit.clamp(1, self.max_limit);
        let schema = registry.schema_for(&params.sort)?;

        let after = match &params.cursor {
            Some(cursor) => {
                let values = KeyCodec::decode_key(cursor, &schema)?;
                Some(SeekPredicate::after(&params.sort, &values)?)
            }
            None => None,
        };

        // Cheap total once, on the first page only
        let total = if params.cursor.is_none() {
            Some(source.count().await?)
        } else {
            None
        };

        // Fetch one extra row to detect has_next without a second COUNT
        let plan = FetchPlan {
            order: params.sort.clone(),
            range: Range::Seek {
                after,
                limit: limit + 1,
            },
        };
        let mut items = source.fetch(&plan).await?;

        let has_next = items.len() as u64 > limit;
        if has_next {
            items.truncate(limit as usize);
        }

        let next_cursor = if has_next {
            let last = items.last().map(|row| registry.key_of(row, &params.sort));
            match last {
                Some(key) => Some(KeyCodec::encode_key(&key?)),
                None => None,
            }
        } else {
            None
        };

        debug!(
            "CURSOR paginate limit={}, returned={}, has_next={}",
            limit,
            items.len(),
            has_next
        );

        Ok(Page {
            items,
            total,
            page: None,
            page_size: limit,
            pages: None,
            next_cursor,
            has_next,
            has_prev: params.cursor.is_some(),
        })
    }
}
