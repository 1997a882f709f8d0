//! Event - one decoded telemetry message.

use alloc::string::String;

use crate::{FieldValue, Fields, FieldsBuilder};

/// A single telemetry message as produced by the upstream decoder.
///
/// Events are immutable once constructed. The hub stores the fields of the
/// latest event per category in its snapshot and keeps the event itself in
/// a bounded history.
///
/// # Example
///
/// ```rust
/// use telemhub_types::{category, Event};
///
/// let event = Event::builder(category::BATTERY)
///     .field("voltage", 12.4)
///     .field("remaining", 87)
///     .received_at_ms(1_703_160_000_000)
///     .build();
///
/// assert_eq!(event.category(), "battery");
/// assert_eq!(event.get("remaining").and_then(|v| v.as_i64()), Some(87));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Event {
    #[cfg_attr(feature = "minicbor", n(0))]
    category: String,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(1))]
    fields: Fields,

    /// Unix timestamp in milliseconds when the event was received.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    received_at_ms: u64,
}

impl Event {
    /// Create an event stamped with the current time.
    #[cfg(feature = "std")]
    pub fn new(category: impl Into<String>, fields: Fields) -> Self {
        Self::with_timestamp(category, fields, crate::now_ms())
    }

    /// Create an event with a specific receive timestamp.
    pub fn with_timestamp(category: impl Into<String>, fields: Fields, received_at_ms: u64) -> Self {
        Self {
            category: category.into(),
            fields,
            received_at_ms,
        }
    }

    /// Create a builder for an event of the given category.
    pub fn builder(category: impl Into<String>) -> EventBuilder {
        EventBuilder::new(category)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Look up a single field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn received_at_ms(&self) -> u64 {
        self.received_at_ms
    }

    /// Decoders may omit the receive time; zero means "not stamped".
    pub fn is_stamped(&self) -> bool {
        self.received_at_ms != 0
    }

    /// Fill in the receive time if the decoder left it empty.
    #[cfg(feature = "std")]
    pub fn stamped(mut self) -> Self {
        if !self.is_stamped() {
            self.received_at_ms = crate::now_ms();
        }
        self
    }

    /// Split the event into its category and fields.
    pub fn into_parts(self) -> (String, Fields) {
        (self.category, self.fields)
    }
}

/// Builder for constructing `Event` instances.
#[derive(Debug)]
pub struct EventBuilder {
    category: String,
    fields: FieldsBuilder,
    received_at_ms: Option<u64>,
}

impl EventBuilder {
    /// Create a new builder.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            fields: FieldsBuilder::new(),
            received_at_ms: None,
        }
    }

    /// Set a field value.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields = self.fields.field(name, value);
        self
    }

    /// Set a specific receive timestamp (milliseconds since Unix epoch).
    pub fn received_at_ms(mut self, ts: u64) -> Self {
        self.received_at_ms = Some(ts);
        self
    }

    /// Build the event.
    #[cfg(feature = "std")]
    pub fn build(self) -> Event {
        Event::with_timestamp(
            self.category,
            self.fields.build(),
            self.received_at_ms.unwrap_or_else(crate::now_ms),
        )
    }

    /// Build the event with a specific timestamp (for no_std).
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> Event {
        Event::with_timestamp(
            self.category,
            self.fields.build(),
            self.received_at_ms.unwrap_or(0),
        )
    }
}
