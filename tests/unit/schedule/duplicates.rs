use super::*;

use chrono::{Duration, NaiveDate};

fn key(slot: u32) -> FrameKey {
    FrameKey::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), slot)
}

fn base() -> DateTime<Utc> {
    crate::foundation::core::parse_api_timestamp("2024-03-01T00:00:00Z").unwrap()
}

fn outcome(minute: i64, offset: i64, raster: &[u8]) -> FallbackOutcome {
    FallbackOutcome {
        raster: raster.to_vec(),
        timestamp: base() + Duration::minutes(minute + offset),
        offset_minutes: offset,
        attempts: 1,
    }
}

fn traces(disk: &FallbackOutcome, corona: &FallbackOutcome) -> [LayerTrace; 2] {
    [LayerTrace::of(disk), LayerTrace::of(corona)]
}

#[test]
fn exact_hits_are_never_flagged() {
    let mut t = DuplicateTracker::default();
    let same = outcome(0, 0, b"same");
    assert_eq!(t.observe(0, key(0), traces(&same, &same)), None);
    // Identical bytes at offset 0 are upstream's business, not a fallback artefact.
    assert_eq!(t.observe(1, key(1), traces(&same, &same)), None);
}

#[test]
fn adjacent_fallbacks_to_the_same_timestamp_are_flagged() {
    let mut t = DuplicateTracker::default();
    let disk0 = outcome(0, 0, b"d0");
    let disk1 = outcome(15, 0, b"d1");
    // Slot 0 corona fell forward +7, slot 1 corona fell back -8: both land on minute 7.
    let c0 = outcome(0, 7, b"c7");
    let c1 = outcome(15, -8, b"c7");
    assert_eq!(t.observe(0, key(0), traces(&disk0, &c0)), None);
    assert_eq!(t.observe(1, key(1), traces(&disk1, &c1)), Some(key(0)));
}

#[test]
fn identical_digest_after_fallback_is_flagged() {
    let mut t = DuplicateTracker::default();
    let d0 = outcome(0, 0, b"d0");
    let d1 = outcome(15, 1, b"d1");
    let c0 = outcome(0, 0, b"frozen");
    let c1 = outcome(15, 1, b"frozen");
    t.observe(4, key(4), traces(&d0, &c0));
    assert_eq!(t.observe(5, key(5), traces(&d1, &c1)), Some(key(4)));
}

#[test]
fn non_adjacent_frames_are_not_compared() {
    let mut t = DuplicateTracker::default();
    let d = outcome(0, 3, b"x");
    t.observe(0, key(0), traces(&d, &d));
    assert_eq!(t.observe(2, key(2), traces(&d, &d)), None);
}
