use std::fmt as StdFmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
use opentelemetry_sdk::{Resource, trace};
use serde_json::json;
use thiserror::Error;
use tracing::Subscriber;
use tracing_opentelemetry::{OpenTelemetrySpanExt, OtelData};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{self, FmtContext};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{AppConfig, TelemetryConfig};

/// Target used for the structured audit line written on every automated decision.
pub const AUDIT_TARGET: &str = "riskboard::audit";

static SUBSCRIBER_INSTALLED: OnceLock<()> = OnceLock::new();
static PROVIDER_SLOT: OnceLock<Mutex<Option<Arc<SdkTracerProvider>>>> = OnceLock::new();

/// Keeps the tracer provider alive; the last guard dropped flushes pending spans.
pub struct TelemetryGuard {
    provider: Option<Arc<SdkTracerProvider>>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        // The slot holds one reference; two means we are the last external owner.
        if Arc::strong_count(&provider) <= 2 {
            if let Some(slot) = PROVIDER_SLOT.get() {
                if let Ok(mut held) = slot.lock() {
                    held.take();
                }
            }
            let _ = provider.shutdown();
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to set tracing subscriber: {0}")]
    SubscriberInit(String),
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(String),
}

/// Install the global subscriber (RUST_LOG driven, `info` by default) and,
/// when configured, an OTLP span exporter. Only the first call installs a
/// subscriber; later calls return an inert guard.
pub fn init_telemetry(
    app: &AppConfig,
    telemetry: &TelemetryConfig,
) -> Result<TelemetryGuard, TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(TelemetryGuard { provider: None });
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| TelemetryError::SubscriberInit(err.to_string()))?;

    let provider = build_provider(app, telemetry)?;
    let tracer: Option<trace::Tracer> = provider
        .as_ref()
        .map(|provider| provider.tracer(app.service_name.clone()));

    let pretty = app.env.eq_ignore_ascii_case("dev");
    let result = if pretty {
        let subscriber = Registry::default()
            .with(
                fmt::layer()
                    .with_target(true)
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .with(tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer)))
            .with(env_filter);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default()
            .with(fmt::layer().event_format(JsonTraceFormatter))
            .with(tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer)))
            .with(env_filter);
        tracing::subscriber::set_global_default(subscriber)
    };
    result.map_err(|err| TelemetryError::SubscriberInit(err.to_string()))?;
    let _ = SUBSCRIBER_INSTALLED.set(());

    if let Some(provider) = &provider {
        let slot = PROVIDER_SLOT.get_or_init(|| Mutex::new(None));
        if let Ok(mut held) = slot.lock() {
            *held = Some(provider.clone());
        }
    }

    Ok(TelemetryGuard { provider })
}

/// Logging-only initializer for tools and tests that have no config file.
pub fn init_logging(env: &str) -> Result<(), TelemetryError> {
    let app = AppConfig {
        service_name: "riskboard".to_string(),
        port: 0,
        env: env.to_string(),
    };
    let telemetry = TelemetryConfig {
        otlp_endpoint: None,
        export_traces: false,
    };
    init_telemetry(&app, &telemetry).map(|_guard| ())
}

fn build_provider(
    app: &AppConfig,
    telemetry: &TelemetryConfig,
) -> Result<Option<Arc<SdkTracerProvider>>, TelemetryError> {
    let endpoint = match telemetry.otlp_endpoint.as_deref() {
        Some(endpoint) if telemetry.export_traces && !endpoint.is_empty() => endpoint,
        _ => return Ok(None),
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_timeout(Duration::from_secs(3))
        .with_endpoint(endpoint)
        .build()
        .map_err(|err| TelemetryError::ExporterBuild(err.to_string()))?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", app.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", app.env.clone()),
        ])
        .build();
    let provider = SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(opentelemetry_sdk::propagation::TraceContextPropagator::new());

    Ok(Some(Arc::new(provider)))
}

/// One JSON object per line: timestamp, level, target, current span, trace id and fields.
struct JsonTraceFormatter;

impl<S, N> FormatEvent<S, N> for JsonTraceFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> StdFmt::Result {
        let mut fields = JsonFields::default();
        event.record(&mut fields);

        let current = ctx.lookup_current();
        let trace_id = current
            .as_ref()
            .and_then(|span| {
                span.extensions()
                    .get::<OtelData>()
                    .and_then(|data| data.trace_id())
            })
            .or_else(|| {
                let span_ctx = tracing::Span::current().context().span().span_context().clone();
                span_ctx.is_valid().then(|| span_ctx.trace_id())
            })
            .map(|id| id.to_string());

        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": event.metadata().level().as_str().to_lowercase(),
            "target": event.metadata().target(),
            "span": current.map(|span| span.name().to_string()),
            "trace_id": trace_id,
            "fields": fields.0,
        });

        let line = serde_json::to_string(&payload).map_err(|_| StdFmt::Error)?;
        writer.write_str(&line)?;
        writer.write_str("\n")
    }
}

#[derive(Default)]
struct JsonFields(serde_json::Map<String, serde_json::Value>);

impl tracing_subscriber::field::Visit for JsonFields {
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn StdFmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}").into());
    }
}
