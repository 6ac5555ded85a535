use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filtro por defecto de los binarios cuando no hay `RUST_LOG`.
pub const DEFAULT_FILTER: &str = "info";

/// Instala el subscriber global de `tracing` con salida por stderr.
///
/// `RUST_LOG` tiene prioridad sobre `default_filter`. Si ya habia un subscriber
/// instalado (por ejemplo en tests) no hace nada.
pub fn init_logging(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_names(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
