use proptest::prelude::*;
use tandem::orchestrator::{ChunkStyle, compute_max_prefix, fit_label, format_chunk};
use tandem::types::PrefixAlign;

fn align_strategy() -> impl Strategy<Value = PrefixAlign> {
    prop_oneof![
        Just(PrefixAlign::Left),
        Just(PrefixAlign::Right),
        Just(PrefixAlign::Center),
    ]
}

proptest! {
    // Fitted labels always occupy exactly the shared width.
    #[test]
    fn fitted_label_has_exact_width(
        label in "[a-zA-Z0-9 _-]{0,24}",
        width in 0usize..32,
        align in align_strategy(),
    ) {
        let fitted = fit_label(&label, width, '.', align);
        prop_assert_eq!(fitted.chars().count(), width);
    }

    #[test]
    fn center_puts_the_extra_fill_after(label in "[a-z]{1,8}", extra in 0usize..10) {
        let width = label.len() + extra;
        let fitted = fit_label(&label, width, '*', PrefixAlign::Center);
        let before = fitted.chars().take_while(|c| *c == '*').count();
        let after = fitted.chars().rev().take_while(|c| *c == '*').count();
        prop_assert_eq!(before, extra / 2);
        prop_assert_eq!(after, extra - extra / 2);
    }

    #[test]
    fn max_prefix_stays_within_bounds(
        lens in proptest::collection::vec(0usize..40, 0..8),
        min in 0usize..20,
        max in proptest::option::of(0usize..40),
        decoration in 0usize..4,
    ) {
        let width = compute_max_prefix(lens.iter().copied(), min, max, decoration);
        if let Some(max) = max {
            prop_assert!(width <= max.saturating_sub(decoration));
        } else {
            let longest = lens.iter().copied().max().unwrap_or(0);
            prop_assert_eq!(width, longest.max(min));
        }
    }

    // Formatting never adds or removes line breaks outside condensed mode.
    #[test]
    fn newlines_are_preserved(text in "[a-z\n]{0,40}", at_line_start in any::<bool>()) {
        colored::control::set_override(false);
        let style = ChunkStyle { raw: false, condensed: false, at_line_start };
        let out = format_chunk(&text, "[p]", style).unwrap_or_default();
        prop_assert_eq!(
            out.matches('\n').count(),
            text.matches('\n').count()
        );
    }
}
