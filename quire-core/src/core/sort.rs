//! Sort specifications and the static field registry.
//!
//! Sortable fields are registered once per entity with a typed accessor,
//! so "sort by arbitrary named field" never touches runtime reflection.
//! An unknown field name is rejected with a typed error instead of being
//! silently ignored.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::error::{PageResult, PaginationError};

/// Ordering direction for a single sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One field of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Ordered, non-empty list of sort fields.
///
/// Callers are expected to append a unique tiebreaker field (typically the
/// primary key). Without one, rows that compare equal on every listed field
/// have non-deterministic page boundaries; the engine does not detect this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl SortSpec {
    pub fn new(fields: Vec<SortField>) -> PageResult<Self> {
        if fields.is_empty() {
            return Err(PaginationError::EmptySort);
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Type tag for a sortable field, used to re-type cursor values after decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortValueKind {
    Int,
    Float,
    Text,
    Timestamp,
    Id,
}

/// A scalar sort-key value.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Id(Uuid),
}

impl SortValue {
    pub fn kind(&self) -> SortValueKind {
        match self {
            Self::Int(_) => SortValueKind::Int,
            Self::Float(_) => SortValueKind::Float,
            Self::Text(_) => SortValueKind::Text,
            Self::Timestamp(_) => SortValueKind::Timestamp,
            Self::Id(_) => SortValueKind::Id,
        }
    }

    /// Canonical string form. Round-trips exactly through
    /// [`SortValue::parse`] for the matching kind.
    pub fn to_canonical(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::Timestamp(v) => v.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Id(v) => v.to_string(),
        }
    }

    /// Parse a canonical string back into a typed value.
    pub fn parse(kind: SortValueKind, raw: &str) -> PageResult<Self> {
        let invalid = |what: &str| {
            PaginationError::InvalidCursor(format!("'{raw}' is not a valid {what}"))
        };
        match kind {
            SortValueKind::Int => raw
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|_| invalid("integer")),
            SortValueKind::Float => raw
                .parse::<f64>()
                .map(Self::Float)
                .map_err(|_| invalid("float")),
            SortValueKind::Text => Ok(Self::Text(raw.to_string())),
            SortValueKind::Timestamp => DateTime::parse_from_rfc3339(raw)
                .map(|dt| Self::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|_| invalid("timestamp")),
            SortValueKind::Id => raw
                .parse::<Uuid>()
                .map(Self::Id)
                .map_err(|_| invalid("identifier")),
        }
    }

    /// Total order between two values of the same kind.
    ///
    /// Mismatched kinds fall back to comparing canonical strings; a NaN float
    /// compares equal to anything (NaN sort keys already violate the unique
    /// tiebreaker assumption, so their relative order is unspecified).
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Id(a), Self::Id(b)) => a.cmp(b),
            _ => self.to_canonical().cmp(&other.to_canonical()),
        }
    }
}

type Accessor<T> = Arc<dyn Fn(&T) -> SortValue + Send + Sync>;

struct FieldDef<T> {
    kind: SortValueKind,
    get: Accessor<T>,
}

impl<T> Clone for FieldDef<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            get: Arc::clone(&self.get),
        }
    }
}

/// Statically built map from field name to typed column accessor.
///
/// Built once per entity at startup; validates sort specs and extracts
/// cursor values from rows.
pub struct FieldRegistry<T> {
    fields: HashMap<String, FieldDef<T>>,
}

impl<T> Clone for FieldRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
        }
    }
}

impl<T> FieldRegistry<T> {
    pub fn builder() -> FieldRegistryBuilder<T> {
        FieldRegistryBuilder {
            fields: HashMap::new(),
        }
    }

    /// Kind of a registered field, `None` when unknown.
    pub fn kind_of(&self, name: &str) -> Option<SortValueKind> {
        self.fields.get(name).map(|def| def.kind)
    }

    /// Reject sort specs that reference unregistered fields.
    pub fn validate(&self, spec: &SortSpec) -> PageResult<()> {
        for field in spec.fields() {
            if !self.fields.contains_key(&field.field) {
                warn!("Sort spec references unknown field: {}", field.field);
                return Err(PaginationError::InvalidSortField(field.field.clone()));
            }
        }
        Ok(())
    }

    /// Typed schema of a sort spec, in spec order.
    pub fn schema_for(&self, spec: &SortSpec) -> PageResult<Vec<(String, SortValueKind)>> {
        spec.fields()
            .iter()
            .map(|f| {
                self.kind_of(&f.field)
                    .map(|kind| (f.field.clone(), kind))
                    .ok_or_else(|| PaginationError::InvalidSortField(f.field.clone()))
            })
            .collect()
    }

    /// Extract one field value from a row.
    pub fn extract(&self, row: &T, name: &str) -> PageResult<SortValue> {
        let def = self
            .fields
            .get(name)
            .ok_or_else(|| PaginationError::InvalidSortField(name.to_string()))?;
        Ok((def.get)(row))
    }

    /// Sort-key values of a row for all fields of a spec.
    pub fn key_of(&self, row: &T, spec: &SortSpec) -> PageResult<BTreeMap<String, SortValue>> {
        spec.fields()
            .iter()
            .map(|f| Ok((f.field.clone(), self.extract(row, &f.field)?)))
            .collect()
    }
}

/// Builder for [`FieldRegistry`].
pub struct FieldRegistryBuilder<T> {
    fields: HashMap<String, FieldDef<T>>,
}

impl<T> FieldRegistryBuilder<T> {
    pub fn field<F>(mut self, name: impl Into<String>, kind: SortValueKind, get: F) -> Self
    where
        F: Fn(&T) -> SortValue + Send + Sync + 'static,
    {
        self.fields.insert(
            name.into(),
            FieldDef {
                kind,
                get: Arc::new(get),
            },
        );
        self
    }

    pub fn build(self) -> FieldRegistry<T> {
        FieldRegistry {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        id: i64,
        name: String,
    }

    fn registry() -> FieldRegistry<Row> {
        FieldRegistry::builder()
            .field("id", SortValueKind::Int, |r: &Row| SortValue::Int(r.id))
            .field("name", SortValueKind::Text, |r: &Row| {
                SortValue::Text(r.name.clone())
            })
            .build()
    }

    #[test]
    fn test_empty_sort_rejected() {
        assert!(matches!(
            SortSpec::new(vec![]),
            Err(PaginationError::EmptySort)
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let spec = SortSpec::new(vec![SortField::asc("created_at")]).unwrap();
        let err = registry().validate(&spec).unwrap_err();
        assert!(matches!(err, PaginationError::InvalidSortField(f) if f == "created_at"));
    }

    #[test]
    fn test_extract_and_key_of() {
        let reg = registry();
        let row = Row {
            id: 7,
            name: "bolt".to_string(),
        };
        let spec = SortSpec::new(vec![SortField::asc("name"), SortField::asc("id")]).unwrap();

        let key = reg.key_of(&row, &spec).unwrap();
        assert_eq!(key["id"], SortValue::Int(7));
        assert_eq!(key["name"], SortValue::Text("bolt".to_string()));
    }

    #[test]
    fn test_canonical_round_trip() {
        let ts: DateTime<Utc> = "2024-03-01T12:30:45.123456Z".parse().unwrap();
        let id = Uuid::new_v4();
        let values = [
            SortValue::Int(-42),
            SortValue::Float(3.5),
            SortValue::Text("wing nut".to_string()),
            SortValue::Timestamp(ts),
            SortValue::Id(id),
        ];

        for value in values {
            let raw = value.to_canonical();
            let parsed = SortValue::parse(value.kind(), &raw).unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SortValue::parse(SortValueKind::Int, "twelve").is_err());
        assert!(SortValue::parse(SortValueKind::Timestamp, "yesterday").is_err());
        assert!(SortValue::parse(SortValueKind::Id, "not-a-uuid").is_err());
    }

    #[test]
    fn test_compare_directions() {
        assert_eq!(
            SortValue::Int(1).compare(&SortValue::Int(2)),
            Ordering::Less
        );
        assert_eq!(
            SortValue::Text("b".into()).compare(&SortValue::Text("a".into())),
            Ordering::Greater
        );
    }
}
