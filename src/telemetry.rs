use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build a JSON-formatting subscriber. `RUST_LOG` overrides `default_filter`.
pub fn get_subscriber<Sink>(
    default_filter: &str,
    sink: Sink,
) -> impl Subscriber + Send + Sync + 'static
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(sink)
        .json()
        .with_current_span(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
}

/// Install `subscriber` as the global default. Returns false when one is
/// already installed, which happens when several tests share a process.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync + 'static) -> bool {
    subscriber.try_init().is_ok()
}

/// Structured JSON logging to stdout at `info` unless `RUST_LOG` says otherwise
pub fn init_telemetry() {
    init_subscriber(get_subscriber("info", std::io::stdout));
}
