use pixfit_core::geometry::{Size, cover_square, fit_within};
use proptest::prelude::*;

fn size(max: u32) -> impl Strategy<Value = Size> {
    (1u32..max, 1u32..max).prop_map(|(w, h)| Size::new(w, h))
}

proptest! {
    #[test]
    fn fit_stays_within_bounds_without_upscaling(
        natural in size(20_000),
        bounds in size(4_000),
    ) {
        let out = fit_within(natural, bounds);

        prop_assert!(out.width >= 1 && out.height >= 1);
        prop_assert!(out.fits_within(bounds), "{} escapes {}", out, bounds);
        prop_assert!(out.fits_within(natural), "{} upscales {}", out, natural);

        if natural.fits_within(bounds) {
            prop_assert_eq!(out, natural);
        } else {
            prop_assert!(out.width == bounds.width || out.height == bounds.height);
        }
    }

    #[test]
    fn fit_keeps_the_aspect_ratio_within_a_pixel(
        natural in size(20_000),
        bounds in size(4_000),
    ) {
        let out = fit_within(natural, bounds);
        let (w, h) = (natural.width as f64, natural.height as f64);

        // the winning side is exact; the other one is off by rounding (or the
        // one-pixel floor) only
        let height_error = (out.height as f64 - h * out.width as f64 / w).abs();
        let width_error = (out.width as f64 - w * out.height as f64 / h).abs();
        let error = height_error.min(width_error);
        prop_assert!(error <= 1.0, "{} -> {} is off by {}", natural, out, error);
    }

    #[test]
    fn cover_window_is_a_centered_square_inside_the_source(
        natural in size(50_000),
        target in 1u32..4_096,
    ) {
        let placement = cover_square(natural, target);

        prop_assert_eq!(placement.side, natural.width.min(natural.height));
        prop_assert!(placement.offset_x + placement.side <= natural.width);
        prop_assert!(placement.offset_y + placement.side <= natural.height);
        prop_assert!(placement.offset_x.abs_diff(natural.width - placement.offset_x - placement.side) <= 1);
        prop_assert!(placement.offset_y.abs_diff(natural.height - placement.offset_y - placement.side) <= 1);
        prop_assert!((placement.scale * placement.side as f64 - target as f64).abs() < 1e-6);
    }
}
