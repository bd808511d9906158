//! Logging and OpenTelemetry setup.
//!
//! With an OTLP endpoint configured, traces, metrics, and logs are exported
//! there alongside compact stderr output. Without one, only the fmt layer
//! is installed and metric instruments are no-ops.

pub mod job;
pub mod metrics;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::{Config, RateLimitConfig};
use crate::error::{Error, Result};

const SERVICE_NAME: &str = "ticketq";

/// Settings for [`init_telemetry`].
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint (e.g. "http://localhost:4317"). `None` means
    /// stderr logging only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info").
    pub log_level: String,
    /// Reported as resource attributes so exported signals carry the
    /// limits the process ran with.
    pub rate_limit: RateLimitConfig,
}

impl TelemetryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.otel_endpoint.clone(),
            service_name: SERVICE_NAME.to_string(),
            log_level: config.log_level.clone(),
            rate_limit: config.rate_limit,
        }
    }

    /// The OTel resource shared by every pipeline.
    pub fn resource(&self) -> Resource {
        let limits = &self.rate_limit;
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes([
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(
                    "ticketq.rate_limit.window_seconds",
                    limits.window.as_secs() as i64,
                ),
                KeyValue::new("ticketq.rate_limit.global", i64::from(limits.global_limit)),
                KeyValue::new(
                    "ticketq.rate_limit.per_user",
                    i64::from(limits.per_user_limit),
                ),
            ])
            .build()
    }
}

/// The three OTLP providers, built together and shut down together.
struct Pipelines {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Pipelines {
    fn build(endpoint: &str, resource: Resource) -> Result<Self> {
        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(exporter_error("span"))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(exporter_error("metric"))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(exporter_error("log"))?;

        Ok(Self {
            tracer: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logger: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }

    fn shutdown(self) {
        // Logs first so shutdown-time events still reach the collector.
        let _ = self.logger.shutdown();
        let _ = self.meter.shutdown();
        let _ = self.tracer.shutdown();
    }
}

fn exporter_error<E: std::fmt::Display>(signal: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
}

/// Flushes and shuts down the OTLP pipelines on drop. Hold it for the
/// lifetime of the process.
pub struct TelemetryGuard {
    pipelines: Option<Pipelines>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(pipelines) = self.pipelines.take() {
            pipelines.shutdown();
        }
    }
}

/// Install the global subscriber and, with an endpoint, the OTLP pipelines
/// and global meter provider.
///
/// # Errors
///
/// Fails if an exporter can't be built or a global subscriber is already
/// set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let pipelines = config
        .endpoint
        .as_deref()
        .map(|endpoint| Pipelines::build(endpoint, config.resource()))
        .transpose()?;

    let trace_layer = pipelines.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer.tracer(SERVICE_NAME))
    });
    let log_layer = pipelines
        .as_ref()
        .map(|p| OpenTelemetryTracingBridge::new(&p.logger));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    if let Some(p) = &pipelines {
        opentelemetry::global::set_meter_provider(p.meter.clone());
    }
    tracing::info!(
        service = %config.service_name,
        otlp = pipelines.is_some(),
        "telemetry initialized"
    );

    Ok(TelemetryGuard { pipelines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{Key, Value};
    use std::time::Duration;

    #[test]
    fn resource_carries_service_and_limits() {
        let config = TelemetryConfig {
            endpoint: None,
            service_name: "ticketq-test".to_string(),
            log_level: "info".to_string(),
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(30),
                global_limit: 50,
                per_user_limit: 4,
            },
        };
        let resource = config.resource();

        assert_eq!(
            resource.get(&Key::new("service.name")),
            Some(Value::from("ticketq-test"))
        );
        assert_eq!(
            resource.get(&Key::new("ticketq.rate_limit.window_seconds")),
            Some(Value::I64(30))
        );
        assert_eq!(
            resource.get(&Key::new("ticketq.rate_limit.global")),
            Some(Value::I64(50))
        );
        assert_eq!(
            resource.get(&Key::new("ticketq.rate_limit.per_user")),
            Some(Value::I64(4))
        );
        assert!(resource.get(&Key::new(SERVICE_VERSION)).is_some());
    }
}
