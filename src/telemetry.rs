use tracing::info;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Installe le subscriber global. `RUST_LOG` prend le pas sur le niveau `info` par défaut.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false);

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global subscriber");

    info!("Tracing initialized");
}
