use tracing_subscriber::layer::SubscriberExt;

struct Guard;

impl Drop for Guard {
    fn drop(&mut self) {}
}

/// Install a console `tracing` subscriber configured from `RUST_LOG`.
/// Consumed only at the top level (the `DeviceAgent`'s embedder), never
/// from the leaf crates, which just emit events.
pub fn init() -> impl Drop {
    let console_layer = tracing_subscriber::fmt::layer().with_file(true).with_line_number(true);

    let collector = tracing_subscriber::registry()
        .with(console_layer)
        .with(tracing_subscriber::EnvFilter::from_default_env());

    // Installing twice (e.g. once per camera in the same process) would
    // panic; ignore the error, the first caller wins.
    let _ = tracing::subscriber::set_global_default(collector);

    Guard
}
