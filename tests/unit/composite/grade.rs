use super::*;

#[test]
fn identity_curve_is_identity() {
    let lut = tone_curve(&GradeSpec::IDENTITY);
    for (i, v) in lut.iter().enumerate() {
        assert_eq!(usize::from(*v), i);
    }
}

#[test]
fn identity_grade_leaves_image_untouched() {
    let mut img = RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8 * 30, y as u8 * 30, 77]));
    let before = img.clone();
    grade_in_place(&mut img, &GradeSpec::IDENTITY);
    assert_eq!(img, before);
}

#[test]
fn zero_saturation_produces_gray() {
    let spec = GradeSpec {
        saturation: 0.0,
        ..GradeSpec::IDENTITY
    };
    let curve = tone_curve(&spec);
    let out = grade_pixel([200, 40, 90], &spec, &curve);
    assert_eq!(out[0], out[1]);
    assert_eq!(out[1], out[2]);
}

#[test]
fn cool_tint_shifts_gray_towards_blue() {
    let spec = GradeSpec {
        tint: [0.9, 1.0, 1.1],
        ..GradeSpec::IDENTITY
    };
    let curve = tone_curve(&spec);
    let out = grade_pixel([128, 128, 128], &spec, &curve);
    assert!(out[2] > out[1] && out[1] > out[0], "{out:?}");
}

#[test]
fn contrast_spreads_values_around_mid_gray() {
    let spec = GradeSpec {
        contrast: 1.5,
        ..GradeSpec::IDENTITY
    };
    let lut = tone_curve(&spec);
    assert!(lut[64] < 64);
    assert!(lut[192] > 192);
    assert_eq!(lut[0], 0);
    assert_eq!(lut[255], 255);
}

#[test]
fn gamma_below_one_brightens_midtones() {
    let spec = GradeSpec {
        gamma: 0.8,
        ..GradeSpec::IDENTITY
    };
    let lut = tone_curve(&spec);
    assert!(lut[100] > 100);
}

#[test]
fn grading_is_deterministic() {
    let spec = crate::config::CompositeConfig::default().disk_grade;
    let src = RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 16) as u8, (y * 16) as u8, 200]));
    let mut a = src.clone();
    let mut b = src;
    grade_in_place(&mut a, &spec);
    grade_in_place(&mut b, &spec);
    assert_eq!(a, b);
}
