//! Query source seam and seek predicates.
//!
//! The engine never talks SQL. It hands a [`FetchPlan`] (sort order plus an
//! offset range or a seek predicate) to a [`QuerySource`], which translates
//! it for whatever store backs the entity. [`MemorySource`] is the in-process
//! implementation used by tests and small static datasets.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::{PageResult, PaginationError};
use super::sort::{FieldRegistry, SortDirection, SortSpec, SortValue};

/// Row range requested from a source.
#[derive(Debug, Clone)]
pub enum Range {
    /// Skip-count paging: `OFFSET offset LIMIT limit`.
    Offset { offset: u64, limit: u64 },
    /// Seek paging: rows strictly after `after` (all rows when `None`),
    /// at most `limit` of them.
    Seek {
        after: Option<SeekPredicate>,
        limit: u64,
    },
}

/// One fetch request: how to order rows and which slice to return.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub order: SortSpec,
    pub range: Range,
}

/// Comparison operator of a seek condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOp {
    Gt,
    Lt,
    Eq,
}

/// A single `field <op> value` comparison.
#[derive(Debug, Clone)]
pub struct SeekCondition {
    pub field: String,
    pub op: SeekOp,
    pub value: SortValue,
}

/// "Rows strictly after this sort-key tuple", as a disjunction of
/// conjunctions.
///
/// For sort fields `(f1, .., fn)` the clauses are the strict lexicographic
/// row-value expansion:
///
/// ```text
/// (f1 > v1) OR (f1 = v1 AND f2 > v2) OR .. OR (f1 = v1 AND .. AND fn > vn)
/// ```
///
/// with `>` flipped to `<` for descending fields. This is the only correct
/// way to resume a multi-column sort without skipping or duplicating rows;
/// a per-column independent filter is not equivalent and must not be
/// substituted. SQL-backed sources translate the clauses into a WHERE
/// disjunction; [`SeekPredicate::matches`] evaluates them in process.
#[derive(Debug, Clone)]
pub struct SeekPredicate {
    clauses: Vec<Vec<SeekCondition>>,
}

impl SeekPredicate {
    /// Build the expansion for resuming `spec` after `cursor_values`.
    ///
    /// `cursor_values` must hold one value per sort field.
    pub fn after(spec: &SortSpec, cursor_values: &BTreeMap<String, SortValue>) -> PageResult<Self> {
        let mut clauses = Vec::with_capacity(spec.len());

        for (i, pivot) in spec.fields().iter().enumerate() {
            let mut clause = Vec::with_capacity(i + 1);

            for prefix in &spec.fields()[..i] {
                clause.push(SeekCondition {
                    field: prefix.field.clone(),
                    op: SeekOp::Eq,
                    value: Self::value_of(cursor_values, &prefix.field)?,
                });
            }

            let op = match pivot.direction {
                SortDirection::Asc => SeekOp::Gt,
                SortDirection::Desc => SeekOp::Lt,
            };
            clause.push(SeekCondition {
                field: pivot.field.clone(),
                op,
                value: Self::value_of(cursor_values, &pivot.field)?,
            });

            clauses.push(clause);
        }

        Ok(Self { clauses })
    }

    fn value_of(values: &BTreeMap<String, SortValue>, field: &str) -> PageResult<SortValue> {
        values.get(field).cloned().ok_or_else(|| {
            PaginationError::InvalidCursor(format!("cursor is missing field '{field}'"))
        })
    }

    /// The OR-of-AND clauses, for sources that translate to a query language.
    pub fn clauses(&self) -> &[Vec<SeekCondition>] {
        &self.clauses
    }

    /// Evaluate the predicate against a row in process.
    pub fn matches<T>(&self, row: &T, registry: &FieldRegistry<T>) -> PageResult<bool> {
        for clause in &self.clauses {
            let mut all = true;
            for cond in clause {
                let actual = registry.extract(row, &cond.field)?;
                let ordering = actual.compare(&cond.value);
                let holds = match cond.op {
                    SeekOp::Gt => ordering == Ordering::Greater,
                    SeekOp::Lt => ordering == Ordering::Less,
                    SeekOp::Eq => ordering == Ordering::Equal,
                };
                if !holds {
                    all = false;
                    break;
                }
            }
            if all {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A sorted, countable row source. The database-facing collaborator of the
/// pagination engine; any store that can order rows and apply either an
/// offset range or a seek predicate satisfies it.
#[async_trait]
pub trait QuerySource<T>: Send + Sync {
    /// Row count of the unrestricted query.
    async fn count(&self) -> PageResult<u64>;

    /// Execute one fetch plan.
    async fn fetch(&self, plan: &FetchPlan) -> PageResult<Vec<T>>;
}

/// Vec-backed [`QuerySource`] that sorts and filters in process.
pub struct MemorySource<T> {
    rows: Vec<T>,
    registry: Arc<FieldRegistry<T>>,
}

impl<T> MemorySource<T> {
    pub fn new(rows: Vec<T>, registry: Arc<FieldRegistry<T>>) -> Self {
        Self { rows, registry }
    }
}

impl<T: Clone> MemorySource<T> {
    fn sorted(&self, order: &SortSpec) -> PageResult<Vec<T>> {
        self.registry.validate(order)?;

        // Precompute sort keys so the comparator itself cannot fail
        let mut keyed: Vec<(Vec<SortValue>, T)> = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let key = order
                .fields()
                .iter()
                .map(|f| self.registry.extract(row, &f.field))
                .collect::<PageResult<Vec<_>>>()?;
            keyed.push((key, row.clone()));
        }

        let directions: Vec<SortDirection> =
            order.fields().iter().map(|f| f.direction).collect();
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, direction) in directions.iter().enumerate() {
                let ordering = a[i].compare(&b[i]);
                let ordering = match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> QuerySource<T> for MemorySource<T> {
    async fn count(&self) -> PageResult<u64> {
        Ok(self.rows.len() as u64)
    }

    async fn fetch(&self, plan: &FetchPlan) -> PageResult<Vec<T>> {
        let sorted = self.sorted(&plan.order)?;

        match &plan.range {
            Range::Offset { offset, limit } => Ok(sorted
                .into_iter()
                .skip(*offset as usize)
                .take(*limit as usize)
                .collect()),
            Range::Seek { after, limit } => {
                let mut out = Vec::new();
                for row in sorted {
                    let keep = match after {
                        Some(predicate) => predicate.matches(&row, &self.registry)?,
                        None => true,
                    };
                    if keep {
                        out.push(row);
                        if out.len() as u64 >= *limit {
                            break;
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}
