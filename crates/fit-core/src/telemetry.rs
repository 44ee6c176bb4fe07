//! Tracing setup shared by the pipeline binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str =
    "fitprep=info,pipeline=info,cycle_accumulator=info,matrix_split=info,checkpoint=info,weighting=info";

/// Install the global subscriber: `RUST_LOG` if set, otherwise `default_filter`
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
