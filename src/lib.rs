//! lingua-cache: translation orchestration for puzzle, scenario and feedback
//! content. Calls a slow, rate-limited text-generation upstream at most once
//! per (content, language) and keeps results in a shared durable tier and a
//! process-local volatile tier.

pub mod config;
pub mod error;
pub mod metrics;
pub mod translate;

pub use config::Config;
pub use error::{ConfigError, TranslateError, UpstreamError};
pub use translate::{
    CacheKey, ContentKind, Feedback, Localized, PuzzleFields, TrainingScenario, TranslationResult,
    TranslationService,
};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lingua_cache=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
