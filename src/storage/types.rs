//! Core data types for the storage layer.
//!
//! - [`Metric`]: snapshot of a stored metric, handed out by every read
//! - [`NewMetric`]: creation request for [`MetricStore::add`](crate::storage::MetricStore::add)

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// A metric as stored in the `metrics` table.
///
/// Values returned by the store are copies; mutating one has no effect on
/// stored state.
///
/// # Example
///
/// ```
/// use quantitea::Metric;
/// use chrono::Utc;
///
/// let metric = Metric {
///     name: "water".to_string(),
///     category: "health".to_string(),
///     unit: "cups".to_string(),
///     value: 5.0,
///     reset_daily: true,
///     last_changed: Utc::now(),
/// };
/// assert!(metric.reset_daily);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Unique, case-sensitive identifier.
    pub name: String,
    /// Descriptive label (e.g., "health").
    pub category: String,
    /// Descriptive unit label (e.g., "cups").
    pub unit: String,
    /// Current value, never negative.
    pub value: f64,
    /// Whether the daily reset zeroes this metric.
    pub reset_daily: bool,
    /// Time of the last value-affecting write (UTC).
    pub last_changed: DateTime<Utc>,
}

/// Request to create a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMetric {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub reset_daily: bool,
}

impl NewMetric {
    /// Create a new metric request.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        unit: impl Into<String>,
        reset_daily: bool,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            unit: unit.into(),
            reset_daily,
        }
    }

    /// Check the request before it reaches the database.
    ///
    /// Name and category must be non-blank; the unit is free-form.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidArgument(
                "metric name must not be empty".to_string(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(StorageError::InvalidArgument(format!(
                "category of metric '{}' must not be empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// Raw row as read from SQLite.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MetricRow {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub value: f64,
    pub reset_daily: bool,
    pub last_changed: String,
}

impl TryFrom<MetricRow> for Metric {
    type Error = StorageError;

    fn try_from(row: MetricRow) -> Result<Self, Self::Error> {
        let last_changed = parse_timestamp(&row.last_changed).map_err(|e| {
            StorageError::InvalidData(format!(
                "metric '{}' has unreadable last_changed '{}': {}",
                row.name, row.last_changed, e
            ))
        })?;

        Ok(Self {
            name: row.name,
            category: row.category,
            unit: row.unit,
            value: row.value,
            reset_daily: row.reset_daily,
            last_changed,
        })
    }
}

/// Render a timestamp in the fixed-width form stored in `last_changed`.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored `last_changed` value.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_metric_validation() {
        assert!(NewMetric::new("water", "health", "cups", true).validate().is_ok());
        assert!(NewMetric::new("steps", "health", "", false).validate().is_ok());

        let err = NewMetric::new("", "health", "cups", true)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err = NewMetric::new("water", "  ", "cups", true)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (fa, fb) = (format_timestamp(a), format_timestamp(b));

        assert_eq!(fa, "2024-03-09T07:05:01.000000Z");
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(parse_timestamp(&format_timestamp(ts)).unwrap(), ts);
    }

    #[test]
    fn test_unparseable_row_is_invalid_data() {
        let row = MetricRow {
            name: "water".to_string(),
            category: "health".to_string(),
            unit: "cups".to_string(),
            value: 1.0,
            reset_daily: true,
            last_changed: "yesterday-ish".to_string(),
        };
        let err = Metric::try_from(row).unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
    }

    #[test]
    fn test_new_metric_deserialize_defaults() {
        let req: NewMetric =
            serde_json::from_str(r#"{"name": "weight", "category": "health"}"#).unwrap();
        assert_eq!(req.unit, "");
        assert!(!req.reset_daily);
    }
}
