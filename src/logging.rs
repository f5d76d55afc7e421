use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "gallery_sync_lib=info,gallery_sync=info";
const VERBOSE_LOG_FILTER: &str = "gallery_sync_lib=debug,gallery_sync=debug";

/// Installs the stderr subscriber. `RUST_LOG` wins over `verbose` when set.
/// Calling this more than once is harmless.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
