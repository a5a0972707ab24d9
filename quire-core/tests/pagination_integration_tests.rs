use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use quire_core::{
    CursorPaginator, CursorParams, FieldRegistry, MemorySource, OffsetPaginator, OffsetParams,
    PaginationError, SortField, SortSpec, SortValue, SortValueKind,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Part {
    id: Uuid,
    sku: String,
    price_cents: i64,
    created_at: DateTime<Utc>,
}

fn registry() -> Arc<FieldRegistry<Part>> {
    Arc::new(
        FieldRegistry::builder()
            .field("id", SortValueKind::Id, |p: &Part| SortValue::Id(p.id))
            .field("sku", SortValueKind::Text, |p: &Part| {
                SortValue::Text(p.sku.clone())
            })
            .field("price_cents", SortValueKind::Int, |p: &Part| {
                SortValue::Int(p.price_cents)
            })
            .field("created_at", SortValueKind::Timestamp, |p: &Part| {
                SortValue::Timestamp(p.created_at)
            })
            .build(),
    )
}

/// 25 parts; prices repeat so multi-field sorts cross ties.
fn parts() -> Vec<Part> {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..25i64)
        .map(|i| Part {
            id: Uuid::from_u128(1000 + i as u128),
            sku: format!("SKU-{:03}", i),
            price_cents: ((i % 5) + 1) * 100,
            created_at: epoch + Duration::minutes(i),
        })
        .collect()
}

fn source() -> MemorySource<Part> {
    MemorySource::new(parts(), registry())
}

fn created_then_id() -> SortSpec {
    SortSpec::new(vec![SortField::asc("created_at"), SortField::asc("id")]).unwrap()
}

#[tokio::test]
async fn test_offset_scenario_25_rows() {
    let source = source();
    let registry = registry();
    let paginator = OffsetPaginator::new(100);

    let page1 = paginator
        .paginate(
            &source,
            &registry,
            &OffsetParams {
                page: 1,
                page_size: 10,
                sort: created_then_id(),
            },
        )
        .await
        .unwrap();
    assert_eq!(page1.items.len(), 10);
    assert_eq!(page1.total, Some(25));
    assert!(page1.has_next);
    assert!(!page1.has_prev);

    let page3 = paginator
        .paginate(
            &source,
            &registry,
            &OffsetParams {
                page: 3,
                page_size: 10,
                sort: created_then_id(),
            },
        )
        .await
        .unwrap();
    assert_eq!(page3.items.len(), 5);
    assert!(!page3.has_next);
    assert!(page3.has_prev);
}

#[tokio::test]
async fn test_cursor_scenario_resumes_at_item_11() {
    let source = source();
    let registry = registry();
    let paginator = CursorPaginator::new(100);

    let first = paginator
        .paginate(
            &source,
            &registry,
            &CursorParams {
                cursor: None,
                limit: 10,
                sort: created_then_id(),
            },
        )
        .await
        .unwrap();
    assert_eq!(first.items.len(), 10);
    assert!(first.has_next);
    let cursor = first.next_cursor.clone().expect("next cursor");

    let second = paginator
        .paginate(
            &source,
            &registry,
            &CursorParams {
                cursor: Some(cursor),
                limit: 10,
                sort: created_then_id(),
            },
        )
        .await
        .unwrap();
    assert_eq!(second.items[0].sku, "SKU-010");
}

#[tokio::test]
async fn test_cursor_pages_match_one_double_fetch() {
    let source = source();
    let registry = registry();
    let paginator = CursorPaginator::new(100);
    let sort = SortSpec::new(vec![SortField::asc("price_cents"), SortField::asc("id")]).unwrap();

    let page1 = paginator
        .paginate(
            &source,
            &registry,
            &CursorParams {
                cursor: None,
                limit: 10,
                sort: sort.clone(),
            },
        )
        .await
        .unwrap();
    let page2 = paginator
        .paginate(
            &source,
            &registry,
            &CursorParams {
                cursor: page1.next_cursor.clone(),
                limit: 10,
                sort: sort.clone(),
            },
        )
        .await
        .unwrap();

    let double = paginator
        .paginate(
            &source,
            &registry,
            &CursorParams {
                cursor: None,
                limit: 20,
                sort,
            },
        )
        .await
        .unwrap();

    let stitched: Vec<&Part> = page1.items.iter().chain(page2.items.iter()).collect();
    let direct: Vec<&Part> = double.items.iter().collect();
    assert_eq!(stitched, direct, "no duplicates, no gaps across the boundary");
}

#[tokio::test]
async fn test_cursor_walk_visits_every_row_once() {
    let source = source();
    let registry = registry();
    let paginator = CursorPaginator::new(100);
    let sort = SortSpec::new(vec![SortField::desc("created_at"), SortField::asc("id")]).unwrap();

    let mut cursor = None;
    let mut seen: Vec<String> = Vec::new();
    let mut steps = 0;
    loop {
        let page = paginator
            .paginate(
                &source,
                &registry,
                &CursorParams {
                    cursor: cursor.clone(),
                    limit: 7,
                    sort: sort.clone(),
                },
            )
            .await
            .unwrap();
        seen.extend(page.items.iter().map(|p| p.sku.clone()));
        steps += 1;
        assert!(steps <= 4, "25 rows at limit 7 is 4 pages");
        if !page.has_next {
            break;
        }
        cursor = page.next_cursor;
    }

    assert_eq!(seen.len(), 25);
    let mut deduped = seen.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), 25, "every row exactly once");
    // Newest first
    assert_eq!(seen[0], "SKU-024");
    assert_eq!(seen[24], "SKU-000");
}

#[tokio::test]
async fn test_cursor_survives_engine_restart() {
    let registry = registry();
    let sort = created_then_id();

    // Cursors are self-describing: a fresh paginator and source resume them
    let first = CursorPaginator::new(100)
        .paginate(
            &source(),
            &registry,
            &CursorParams {
                cursor: None,
                limit: 10,
                sort: sort.clone(),
            },
        )
        .await
        .unwrap();

    let resumed = CursorPaginator::new(100)
        .paginate(
            &source(),
            &registry,
            &CursorParams {
                cursor: first.next_cursor.clone(),
                limit: 10,
                sort,
            },
        )
        .await
        .unwrap();
    assert_eq!(resumed.items[0].sku, "SKU-010");
}

#[tokio::test]
async fn test_unknown_sort_field_is_typed_error() {
    let source = source();
    let registry = registry();

    let err = OffsetPaginator::new(100)
        .paginate(
            &source,
            &registry,
            &OffsetParams {
                page: 1,
                page_size: 10,
                sort: SortSpec::new(vec![SortField::asc("weight")]).unwrap(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PaginationError::InvalidSortField(field) if field == "weight"));
}

#[tokio::test]
async fn test_foreign_cursor_rejected_with_client_error() {
    let source = source();
    let registry = registry();

    // A cursor minted for a different sort spec must not resume this one
    let by_price = SortSpec::new(vec![SortField::asc("price_cents")]).unwrap();
    let minted = CursorPaginator::new(100)
        .paginate(
            &source,
            &registry,
            &CursorParams {
                cursor: None,
                limit: 5,
                sort: by_price,
            },
        )
        .await
        .unwrap();

    let err = CursorPaginator::new(100)
        .paginate(
            &source,
            &registry,
            &CursorParams {
                cursor: minted.next_cursor.clone(),
                limit: 5,
                sort: created_then_id(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PaginationError::InvalidCursor(_)));
}
