use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `PIXPACK_LOG` first, then
/// `RUST_LOG`, then a default.
///
/// Log field contract for pixpack tools:
/// - Always include an `event` field naming the lifecycle point.
/// - Include the store path on any store create/close event.
/// - Include the item index on any per-item failure event.
pub fn init_tracing() {
    let filter = env_filter();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("PIXPACK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
