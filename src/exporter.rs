//! Prometheus exporter.
//!
//! Exposes every tracked metric as one gauge sample labelled with its name,
//! category, unit and reset flag. The gauge is rebuilt from the store on each
//! scrape, so deleted metrics drop out immediately.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::storage::{MetricStore, StorageError};

/// Gauge family name.
pub const METRIC_VALUE_GAUGE: &str = "quantitea_metric_value";

const LABELS: [&str; 4] = ["name", "category", "unit", "reset_daily"];

/// Exporter error types.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Registering or encoding with the Prometheus client failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Reading the metrics failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Encoded output was not UTF-8.
    #[error("invalid exposition output: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Renders the store in the Prometheus text exposition format.
pub struct MetricExporter {
    store: MetricStore,
    registry: Registry,
    values: GaugeVec,
    // Serializes scrapes; each one resets the gauge before repopulating it.
    scrape: Mutex<()>,
}

impl MetricExporter {
    /// Create an exporter over `store` with its own registry.
    pub fn new(store: MetricStore) -> Result<Self, ExporterError> {
        let registry = Registry::new();
        let values = GaugeVec::new(
            Opts::new(METRIC_VALUE_GAUGE, "Current value of a tracked metric"),
            &LABELS,
        )?;
        registry.register(Box::new(values.clone()))?;

        Ok(Self {
            store,
            registry,
            values,
            scrape: Mutex::new(()),
        })
    }

    /// Content type of [`render`](Self::render) output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Snapshot the store and encode it.
    pub async fn render(&self) -> Result<String, ExporterError> {
        let _guard = self.scrape.lock().await;

        let metrics = self.store.list().await?;
        self.values.reset();
        for metric in &metrics {
            let reset_daily = if metric.reset_daily { "true" } else { "false" };
            self.values
                .with_label_values(&[
                    metric.name.as_str(),
                    metric.category.as_str(),
                    metric.unit.as_str(),
                    reset_daily,
                ])
                .set(metric.value);
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        tracing::trace!(samples = metrics.len(), "Rendered metrics");

        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewMetric, StorageBuilder, StorageHandles};
    use tempfile::{TempDir, tempdir};

    async fn setup() -> (MetricExporter, StorageHandles, TempDir) {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("export.db").to_string_lossy())
            .build()
            .await
            .unwrap();
        let exporter = MetricExporter::new(handles.store.clone()).unwrap();
        (exporter, handles, dir)
    }

    #[tokio::test]
    async fn test_render_empty_store() {
        let (exporter, _handles, _dir) = setup().await;
        let output = exporter.render().await.unwrap();
        assert!(!output.contains("quantitea_metric_value{"));
    }

    #[tokio::test]
    async fn test_render_includes_labels_and_value() {
        let (exporter, handles, _dir) = setup().await;
        handles
            .store
            .add(NewMetric::new("water", "health", "cups", true))
            .await
            .unwrap();
        handles.store.increment("water", 3.0).await.unwrap();

        let output = exporter.render().await.unwrap();
        let line = output
            .lines()
            .find(|l| l.starts_with("quantitea_metric_value{"))
            .expect("sample line");
        assert!(line.contains(r#"name="water""#));
        assert!(line.contains(r#"category="health""#));
        assert!(line.contains(r#"unit="cups""#));
        assert!(line.contains(r#"reset_daily="true""#));
        assert!(line.ends_with("} 3"), "{line}");
    }

    #[tokio::test]
    async fn test_deleted_metric_disappears() {
        let (exporter, handles, _dir) = setup().await;
        handles
            .store
            .add(NewMetric::new("coffee", "habits", "", false))
            .await
            .unwrap();
        assert!(exporter.render().await.unwrap().contains("coffee"));

        handles.store.delete("coffee").await.unwrap();
        assert!(!exporter.render().await.unwrap().contains("coffee"));
    }

    #[tokio::test]
    async fn test_content_type_is_text_format() {
        let (exporter, _handles, _dir) = setup().await;
        assert!(exporter.content_type().starts_with("text/plain"));
    }
}
