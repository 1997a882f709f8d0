//! Snapshot - a point-in-time view of the aggregated telemetry state.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::{Event, FieldValue, Fields, FieldsBuilder, SchemaVersion};

/// The latest fields per category, as of a single point in time.
///
/// Snapshots are always independent copies: the hub builds one under its
/// store lock and hands it out, so holding a snapshot never blocks ingestion.
///
/// # Example
///
/// ```rust
/// use telemhub_types::Snapshot;
///
/// let snapshot = Snapshot::builder()
///     .category("position", |p| p.field("lat", 1.0).field("lon", 2.0))
///     .category("battery", |b| b.field("remaining", 80))
///     .build();
///
/// assert_eq!(snapshot.len(), 2);
/// assert!(snapshot.contains("battery"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Snapshot {
    /// Schema version for forward compatibility.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub version: SchemaVersion,

    /// Unix timestamp in milliseconds of the last update reflected here.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub timestamp_ms: u64,

    /// Latest fields for each category, keyed by category name.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub categories: BTreeMap<String, Fields>,
}

impl Snapshot {
    /// Create an empty snapshot with the current timestamp.
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        Self::with_timestamp(crate::now_ms())
    }

    /// Create an empty snapshot with a specific timestamp.
    pub fn with_timestamp(timestamp_ms: u64) -> Self {
        Self {
            version: SchemaVersion::current(),
            timestamp_ms,
            categories: BTreeMap::new(),
        }
    }

    /// Create a builder for constructing snapshots.
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of categories in the snapshot.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    /// Get the fields for a specific category.
    pub fn get(&self, category: &str) -> Option<&Fields> {
        self.categories.get(category)
    }

    /// Get a single field of a category.
    pub fn field(&self, category: &str, name: &str) -> Option<&FieldValue> {
        self.categories.get(category).and_then(|f| f.get(name))
    }

    /// Iterate over all categories.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Fields)> {
        self.categories.iter()
    }

    /// Merge the fields of the given categories into one flat map.
    ///
    /// Categories are merged in the order given; when two categories share a
    /// field name the later one wins. Missing categories are skipped.
    pub fn flatten<S: AsRef<str>>(&self, categories: &[S]) -> Fields {
        let mut flat = Fields::new();
        for name in categories {
            if let Some(fields) = self.categories.get(name.as_ref()) {
                flat.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        flat
    }
}

#[cfg(feature = "std")]
impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing `Snapshot` instances.
#[derive(Debug)]
pub struct SnapshotBuilder {
    timestamp_ms: Option<u64>,
    categories: BTreeMap<String, Fields>,
}

impl SnapshotBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            timestamp_ms: None,
            categories: BTreeMap::new(),
        }
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// Add a category with fields built using a closure.
    pub fn category<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(FieldsBuilder) -> FieldsBuilder,
    {
        let fields = f(FieldsBuilder::new()).build();
        self.categories.insert(name.into(), fields);
        self
    }

    /// Add a category with pre-built fields.
    pub fn category_fields(mut self, name: impl Into<String>, fields: Fields) -> Self {
        self.categories.insert(name.into(), fields);
        self
    }

    /// Apply an event: its fields replace whatever its category held.
    pub fn event(mut self, event: &Event) -> Self {
        self.categories
            .insert(event.category().into(), event.fields().clone());
        self
    }

    /// Build the snapshot.
    #[cfg(feature = "std")]
    pub fn build(self) -> Snapshot {
        Snapshot {
            version: SchemaVersion::current(),
            timestamp_ms: self.timestamp_ms.unwrap_or_else(crate::now_ms),
            categories: self.categories,
        }
    }

    /// Build the snapshot with a specific timestamp (for no_std).
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> Snapshot {
        Snapshot {
            version: SchemaVersion::current(),
            timestamp_ms: self.timestamp_ms.unwrap_or(0),
            categories: self.categories,
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
