use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        LapseError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        LapseError::persistence("x")
            .to_string()
            .contains("persistence error:")
    );
    assert!(
        LapseError::encoder("x")
            .to_string()
            .contains("encoder error:")
    );
    assert!(
        LapseError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn only_network_failures_are_transient() {
    assert!(FetchError::Timeout { secs: 30 }.is_transient());
    assert!(FetchError::transport("reset").is_transient());
    assert!(!FetchError::invalid_content("text/html").is_transient());
    assert!(
        !FetchError::Exhausted {
            attempts: 9,
            last: "x".to_string()
        }
        .is_transient()
    );
}

#[test]
fn frame_level_errors_are_distinguished_from_run_level() {
    assert!(LapseError::from(FetchError::transport("x")).is_frame_level());
    assert!(LapseError::from(CompositeError::Geometry("x".to_string())).is_frame_level());
    assert!(!LapseError::persistence("disk full").is_frame_level());
    assert!(!LapseError::BatchTimeout { secs: 1 }.is_frame_level());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = LapseError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
