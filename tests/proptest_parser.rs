use boxsight::color::{ColorPalette, GOLDEN_RATIO_CONJUGATE};
use boxsight::parse::{parse_response, ParseHit};
use proptest::prelude::*;

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn detections_are_always_inside_the_image(
        raw in proptest_helpers::arb_response(),
        (width, height) in proptest_helpers::arb_image_dims(),
    ) {
        let mut palette = ColorPalette::seeded(0);
        let parsed = parse_response(&raw, width, height, &mut palette);

        for detection in parsed.detections() {
            prop_assert!((0.0..=1.0).contains(&detection.confidence));
            prop_assert!(detection.bbox.fits_within(width, height), "{:?}", detection.bbox);
            prop_assert!(!detection.label.trim().is_empty());
        }
    }

    #[test]
    fn arbitrary_text_never_panics(
        raw in ".{0,400}",
        (width, height) in proptest_helpers::arb_image_dims(),
    ) {
        let mut palette = ColorPalette::seeded(0);
        let parsed = parse_response(&raw, width, height, &mut palette);
        for detection in parsed.detections() {
            prop_assert!(detection.bbox.fits_within(width, height));
        }
    }

    #[test]
    fn parsing_is_deterministic(
        raw in proptest_helpers::arb_response(),
        (width, height) in proptest_helpers::arb_image_dims(),
        seed in any::<u64>(),
    ) {
        let first = parse_response(&raw, width, height, &mut ColorPalette::seeded(seed));
        let second = parse_response(&raw, width, height, &mut ColorPalette::seeded(seed));
        prop_assert_eq!(first.hit, second.hit);
    }

    #[test]
    fn json_lists_are_never_read_as_text(
        raw in proptest_helpers::arb_response(),
    ) {
        let parsed = parse_response(&raw, 640, 480, &mut ColorPalette::seeded(1));
        prop_assert!(!matches!(parsed.hit, ParseHit::TextualFallback(_)));
    }

    #[test]
    fn hues_step_by_the_golden_ratio(seed in any::<u64>(), steps in 1usize..200) {
        let mut palette = ColorPalette::seeded(seed);
        let mut previous = palette.hue();
        for _ in 0..steps {
            palette.next_color();
            let step = (palette.hue() - previous).rem_euclid(1.0);
            prop_assert!((step - GOLDEN_RATIO_CONJUGATE).abs() < 1e-9);
            previous = palette.hue();
        }
    }
}
