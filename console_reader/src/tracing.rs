use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber, filtered by `RUST_LOG`.
///
/// Events go to stderr, stdout carries the decoded blocks. Records of the
/// `log` facade (used by the decoder) are forwarded too.
pub fn init() {
    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();
}
