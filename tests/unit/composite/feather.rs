use super::*;

#[test]
fn zero_feather_is_a_binary_disk() {
    let (size, radius) = (64u32, 20.0f32);
    let mask = FeatherMask::circular(size, radius, 0.0);
    assert!(mask.alpha().iter().all(|&a| a == 0 || a == 255));

    let c = size as f32 / 2.0;
    for y in 0..size {
        for x in 0..size {
            let d = (x as f32 + 0.5 - c).hypot(y as f32 + 0.5 - c);
            let expected = if d <= radius { 255 } else { 0 };
            assert_eq!(mask.at(x, y), expected, "pixel ({x},{y}) d={d}");
        }
    }
}

#[test]
fn zero_feather_samples_just_inside_and_outside_radius() {
    // Centre row of a 64px mask: pixel centres sit at 0.5 offsets from the 32.0 centre.
    let mask = FeatherMask::circular(64, 10.0, 0.0);
    // x = 41 -> d = 9.5 (inside), x = 42 -> d = 10.5 (outside)
    assert_eq!(mask.at(41, 31), 255);
    assert_eq!(mask.at(42, 31), 0);
    assert_eq!(mask.at(32 - 10, 31), 255); // d = 9.5
    assert_eq!(mask.at(32 - 11, 31), 0); // d = 10.5
}

#[test]
fn feathered_mask_is_opaque_inside_and_transparent_outside_band() {
    let mask = FeatherMask::circular(100, 20.0, 10.0);
    assert_eq!(mask.at(50, 50), 255);
    // d = 19.5 -> opaque
    assert_eq!(mask.at(69, 49), 255);
    // d = 30.5 -> transparent
    assert_eq!(mask.at(80, 49), 0);
    // middle of the band is partially transparent
    let mid = mask.at(75, 49); // d = 25.5
    assert!(mid > 0 && mid < 255, "{mid}");
}

#[test]
fn feather_falloff_is_monotonic_along_radius() {
    let mask = FeatherMask::circular(120, 30.0, 20.0);
    let mut prev = 255u8;
    for x in 60..120 {
        let a = mask.at(x, 59);
        assert!(a <= prev, "alpha rose at x={x}");
        prev = a;
    }
}

#[test]
fn mask_is_radially_symmetric() {
    let mask = FeatherMask::circular(50, 12.0, 6.0);
    for y in 0..50 {
        for x in 0..50 {
            assert_eq!(mask.at(x, y), mask.at(49 - x, y));
            assert_eq!(mask.at(x, y), mask.at(x, 49 - y));
            assert_eq!(mask.at(x, y), mask.at(y, x));
        }
    }
}

#[test]
fn mask_is_deterministic() {
    let a = FeatherMask::circular(80, 25.0, 7.5);
    let b = FeatherMask::circular(80, 25.0, 7.5);
    assert_eq!(a, b);
}

#[test]
fn negative_feather_is_treated_as_zero() {
    assert_eq!(
        FeatherMask::circular(32, 8.0, -3.0),
        FeatherMask::circular(32, 8.0, 0.0)
    );
}
