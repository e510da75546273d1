use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "coronalapse=info";

/// Directive string for the given verbosity.
///
/// `RUST_LOG` wins when set; otherwise `verbose` raises the crate level to `debug`.
pub fn filter_directives(env: Option<&str>, verbose: bool) -> String {
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(env) => env.to_string(),
        None if verbose => "coronalapse=debug".to_string(),
        None => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global fmt subscriber. Safe to call more than once; later calls are ignored.
pub fn init_logging(verbose: bool) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(env.as_deref(), verbose);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
#[path = "../tests/unit/logging.rs"]
mod tests;
