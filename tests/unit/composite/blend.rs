use super::*;

#[test]
fn screen_with_black_is_noop() {
    for v in [0u8, 1, 77, 254, 255] {
        assert_eq!(screen(v, 0), v);
        assert_eq!(screen(0, v), v);
    }
}

#[test]
fn screen_with_white_is_white() {
    assert_eq!(screen(10, 255), 255);
    assert_eq!(screen(255, 10), 255);
}

#[test]
fn screen_never_darkens_either_input() {
    for a in (0..=255u16).step_by(5) {
        for b in (0..=255u16).step_by(5) {
            let out = screen(a as u8, b as u8);
            assert!(out >= a as u8 && out >= b as u8, "screen({a},{b}) = {out}");
        }
    }
}

#[test]
fn masked_alpha_0_is_noop_and_alpha_255_is_plain_screen() {
    let dst = [10, 20, 30];
    let src = [200, 100, 50];
    assert_eq!(screen_masked(dst, src, 0), dst);
    assert_eq!(
        screen_masked(dst, src, 255),
        [screen(10, 200), screen(20, 100), screen(30, 50)]
    );
}

#[test]
fn masked_blend_result_dominates_masked_source() {
    let dst = [40, 40, 40];
    let src = [220, 180, 90];
    let out = screen_masked(dst, src, 128);
    for i in 0..3 {
        assert!(out[i] >= dst[i]);
        assert!(out[i] >= mul_div255_u8(u16::from(src[i]), 128));
    }
}

#[test]
fn place_rejects_out_of_bounds() {
    let mut dst = RgbImage::new(4, 4);
    let src = RgbImage::from_pixel(2, 2, image::Rgb([9, 9, 9]));
    assert!(place(&mut dst, &src, 2, 2).is_ok());
    assert_eq!(dst.get_pixel(3, 3).0, [9, 9, 9]);
    assert_eq!(dst.get_pixel(1, 1).0, [0, 0, 0]);
    assert!(matches!(
        place(&mut dst, &src, 3, 0),
        Err(CompositeError::Geometry(_))
    ));
}

#[test]
fn screen_masked_in_place_checks_mask_length() {
    let mut dst = RgbImage::new(4, 4);
    let src = RgbImage::from_pixel(2, 2, image::Rgb([9, 9, 9]));
    let err = screen_masked_in_place(&mut dst, &src, &[255; 3], 0, 0).unwrap_err();
    assert!(matches!(err, CompositeError::Geometry(_)));
}

#[test]
fn screen_masked_in_place_respects_mask_per_pixel() {
    let mut dst = RgbImage::from_pixel(2, 1, image::Rgb([50, 50, 50]));
    let src = RgbImage::from_pixel(2, 1, image::Rgb([200, 200, 200]));
    screen_masked_in_place(&mut dst, &src, &[255, 0], 0, 0).unwrap();
    assert_eq!(dst.get_pixel(0, 0).0, [screen(50, 200); 3]);
    assert_eq!(dst.get_pixel(1, 0).0, [50, 50, 50]);
}
