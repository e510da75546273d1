use super::*;

#[test]
fn env_overrides_verbosity() {
    assert_eq!(filter_directives(Some("warn"), true), "warn");
    assert_eq!(filter_directives(Some("  "), false), DEFAULT_FILTER);
    assert_eq!(filter_directives(None, false), DEFAULT_FILTER);
    assert_eq!(filter_directives(None, true), "coronalapse=debug");
}

#[test]
fn init_is_idempotent() {
    init_logging(false);
    init_logging(true);
    tracing::info!("still fine");
}
