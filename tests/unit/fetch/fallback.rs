use super::*;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::foundation::core::parse_api_timestamp;

/// Answers per offset (minutes relative to `target`); unlisted offsets are invalid content.
struct ScriptedSource {
    target: DateTime<Utc>,
    answers: HashMap<i64, Result<Vec<u8>, FetchError>>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedSource {
    fn new(target: DateTime<Utc>) -> Self {
        Self {
            target,
            answers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn answer(mut self, offset: i64, res: Result<Vec<u8>, FetchError>) -> Self {
        self.answers.insert(offset, res);
        self
    }

    fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageSource for ScriptedSource {
    fn fetch(&self, timestamp: DateTime<Utc>, _layer: &LayerSpec) -> Result<Vec<u8>, FetchError> {
        let offset = (timestamp - self.target).num_minutes();
        self.calls.lock().unwrap().push(offset);
        self.answers
            .get(&offset)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::invalid_content("no data")))
    }
}

fn layer() -> LayerSpec {
    LayerSpec {
        name: "corona".to_string(),
        selector: "[SOHO,LASCO,C2,white-light,1,100]".to_string(),
        scale: 8.0,
        width: 16,
        height: 16,
        x0: 0.0,
        y0: 0.0,
    }
}

fn target() -> DateTime<Utc> {
    parse_api_timestamp("2024-03-01T12:00:00Z").unwrap()
}

#[test]
fn default_sequence_alternates_outwards() {
    let src = ScriptedSource::new(target());
    let resolver = FallbackResolver::new(src, &FallbackConfig::default());
    assert_eq!(resolver.offsets(), &[0, 1, -1, 3, -3, 5, -5, 7, -7]);
}

#[test]
fn exact_hit_uses_no_fallback() {
    let src = ScriptedSource::new(target()).answer(0, Ok(vec![1]));
    let resolver = FallbackResolver::new(src, &FallbackConfig::default());
    let out = resolver.resolve(target(), &layer()).unwrap();
    assert_eq!(out.offset_minutes, 0);
    assert!(!out.used_fallback());
    assert_eq!(out.timestamp, target());
    assert_eq!(resolver.source().calls(), vec![0]);
}

#[test]
fn first_success_short_circuits_remaining_offsets() {
    let src = ScriptedSource::new(target())
        .answer(3, Ok(vec![3]))
        .answer(-3, Ok(vec![0xAA]));
    let resolver = FallbackResolver::new(src, &FallbackConfig::default());

    let out = resolver.resolve(target(), &layer()).unwrap();
    assert_eq!(out.offset_minutes, 3);
    assert_eq!(out.raster, vec![3]);
    assert_eq!(out.attempts, 4);
    assert_eq!(out.timestamp, target() + Duration::minutes(3));
    assert!(out.used_fallback());
    // 0, +1, -1 failed; +3 won; nothing beyond was requested.
    assert_eq!(resolver.source().calls(), vec![0, 1, -1, 3]);

    let stats = resolver.stats();
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.fallbacks, 1);
    assert_eq!(stats.fallback_rate(), 1.0);
}

#[test]
fn all_offsets_failing_reports_exhausted() {
    let src = ScriptedSource::new(target());
    let resolver = FallbackResolver::new(src, &FallbackConfig::default());
    let err = resolver.resolve(target(), &layer()).unwrap_err();
    match err {
        FetchError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 9);
            assert!(last.contains("no data"));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(resolver.source().calls().len(), 9);
    assert_eq!(resolver.stats().exhausted, 1);
}

#[test]
fn persistent_transient_error_moves_on_to_the_next_offset() {
    let src = ScriptedSource::new(target())
        .answer(0, Err(FetchError::transport("HTTP 503")))
        .answer(1, Ok(vec![9]));
    let resolver = FallbackResolver::new(src, &FallbackConfig::default())
        .with_retry(3, std::time::Duration::ZERO);

    let (res, most_calls) = resolver.resolve_counted(target(), &layer());
    let out = res.unwrap();
    assert_eq!(out.offset_minutes, 1);
    assert_eq!(out.attempts, 2);
    assert_eq!(most_calls, 3);
    // Three calls at the exact timestamp, then the +1 offset.
    assert_eq!(resolver.source().calls(), vec![0, 0, 0, 1]);
    assert_eq!(resolver.stats().fallbacks, 1);
}

#[test]
fn invalid_content_is_not_retried_at_the_same_offset() {
    let src = ScriptedSource::new(target()).answer(-1, Ok(vec![7]));
    let resolver = FallbackResolver::new(src, &FallbackConfig::default())
        .with_retry(3, std::time::Duration::ZERO);

    let (res, most_calls) = resolver.resolve_counted(target(), &layer());
    assert_eq!(res.unwrap().offset_minutes, -1);
    assert_eq!(most_calls, 1);
    assert_eq!(resolver.source().calls(), vec![0, 1, -1]);
}

#[test]
fn transient_errors_everywhere_end_in_exhausted() {
    let mut src = ScriptedSource::new(target());
    for offset in [0, 1, -1, 3, -3, 5, -5, 7, -7] {
        src = src.answer(offset, Err(FetchError::Timeout { secs: 30 }));
    }
    let resolver = FallbackResolver::new(src, &FallbackConfig::default())
        .with_retry(2, std::time::Duration::ZERO);

    let err = resolver.resolve(target(), &layer()).unwrap_err();
    match err {
        FetchError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 9);
            assert!(last.contains("timed out"));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(resolver.source().calls().len(), 18);
    assert_eq!(resolver.stats().exhausted, 1);
}

#[test]
fn fallback_rate_counts_only_successes() {
    let src = ScriptedSource::new(target()).answer(0, Ok(vec![1]));
    let resolver = FallbackResolver::with_offsets(src, vec![0, 2]);
    resolver.resolve(target(), &layer()).unwrap();
    resolver.resolve(target(), &layer()).unwrap();
    let stats = resolver.stats();
    assert_eq!(stats.resolved, 2);
    assert_eq!(stats.fallback_rate(), 0.0);
}
