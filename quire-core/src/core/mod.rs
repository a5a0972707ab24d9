pub mod cursor;
pub mod error;
pub mod paginator;
pub mod query;
pub mod sort;

pub use cursor::KeyCodec;
pub use error::{CacheError, CacheResult, PageResult, PaginationError};
pub use paginator::{CursorPaginator, CursorParams, OffsetPaginator, OffsetParams, Page};
pub use query::{FetchPlan, MemorySource, QuerySource, Range, SeekCondition, SeekOp, SeekPredicate};
pub use sort::{
    FieldRegistry, FieldRegistryBuilder, SortDirection, SortField, SortSpec, SortValue,
    SortValueKind,
};
