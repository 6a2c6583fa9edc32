// tests/output_format.rs

use tandem::orchestrator::prefix::label_for_command_line;
use tandem::orchestrator::{ChunkStyle, PrefixTemplate, compute_max_prefix, fit_label, format_chunk};
use tandem::types::{PrefixAlign, PrefixKey};

fn style(at_line_start: bool) -> ChunkStyle {
    colored::control::set_override(false);
    ChunkStyle {
        raw: false,
        condensed: false,
        at_line_start,
    }
}

fn condensed(at_line_start: bool) -> ChunkStyle {
    ChunkStyle {
        condensed: true,
        ..style(at_line_start)
    }
}

#[test]
fn prefix_goes_on_fresh_lines_only() {
    assert_eq!(
        format_chunk("hello\n", "[a]", style(true)).as_deref(),
        Some("[a] hello\n")
    );
    assert_eq!(
        format_chunk("world\n", "[a]", style(false)).as_deref(),
        Some("world\n")
    );
}

#[test]
fn interior_lines_are_prefixed_but_not_the_tail() {
    assert_eq!(
        format_chunk("one\ntwo\nthr", "[a]", style(true)).as_deref(),
        Some("[a] one\n[a] two\nthr")
    );
}

#[test]
fn partial_line_continues_without_prefix() {
    let first = format_chunk("compil", "[a]", style(true));
    let second = format_chunk("ing\n", "[a]", style(false));
    assert_eq!(first.as_deref(), Some("[a] compil"));
    assert_eq!(second.as_deref(), Some("ing\n"));
}

#[test]
fn ellipsis_is_spelled_out() {
    assert_eq!(
        format_chunk("loading\u{2026}\n", "[a]", style(true)).as_deref(),
        Some("[a] loading...\n")
    );
}

#[test]
fn condensed_drops_blank_lines() {
    assert_eq!(
        format_chunk("a\n\n  \nb\n", "[a]", condensed(true)).as_deref(),
        Some("[a] a\n[a] b\n")
    );
}

#[test]
fn condensed_chunk_of_blanks_writes_nothing() {
    assert_eq!(format_chunk("\n\n", "[a]", condensed(true)), None);
}

#[test]
fn condensed_keeps_the_newline_ending_a_partial_line() {
    assert_eq!(
        format_chunk("\nnext\n", "[a]", condensed(false)).as_deref(),
        Some("\n[a] next\n")
    );
}

#[test]
fn raw_mode_is_a_passthrough() {
    let raw = ChunkStyle {
        raw: true,
        condensed: true,
        at_line_start: true,
    };
    assert_eq!(
        format_chunk("loading\u{2026}\n\n\ndone\n", "[a]", raw).as_deref(),
        Some("loading\u{2026}\n\n\ndone\n")
    );
    assert_eq!(format_chunk("", "[a]", raw), None);
}

#[test]
fn empty_prefix_adds_no_padding() {
    assert_eq!(
        format_chunk("x\ny\n", "", style(true)).as_deref(),
        Some("x\ny\n")
    );
}

#[test]
fn fit_label_truncates_and_pads() {
    assert_eq!(fit_label("build", 3, ' ', PrefixAlign::Left), "bui");
    assert_eq!(fit_label("ab", 5, ' ', PrefixAlign::Left), "ab   ");
    assert_eq!(fit_label("ab", 5, '-', PrefixAlign::Right), "---ab");
    assert_eq!(fit_label("ab", 5, '*', PrefixAlign::Center), "*ab**");
    assert_eq!(fit_label("ab", 0, ' ', PrefixAlign::Center), "");
}

#[test]
fn max_prefix_respects_min_and_max() {
    assert_eq!(compute_max_prefix([3, 5, 2], 0, None, 2), 5);
    assert_eq!(compute_max_prefix([3, 5, 2], 8, None, 2), 8);
    assert_eq!(compute_max_prefix([3, 5, 2], 0, Some(6), 2), 4);
    assert_eq!(compute_max_prefix([3], 0, Some(1), 2), 0);
    assert_eq!(compute_max_prefix(std::iter::empty(), 0, None, 2), 0);
}

#[test]
fn template_parsing() {
    let template = PrefixTemplate::parse("[{index}]").unwrap();
    assert_eq!(template.key(), Some(PrefixKey::Index));
    assert_eq!(template.decoration_len(), 2);
    assert_eq!(template.render("3"), "[3]");
    assert_eq!(template, PrefixTemplate::default());

    let literal = PrefixTemplate::parse("=>").unwrap();
    assert_eq!(literal.key(), None);
    assert_eq!(literal.render("ignored"), "=>");

    assert!(PrefixTemplate::parse("{index}-{pid}").is_err());
    assert!(PrefixTemplate::parse("[{bogus}]").is_err());
}

#[test]
fn labels_from_command_lines() {
    assert_eq!(label_for_command_line("npm run build"), "build");
    assert_eq!(label_for_command_line("yarn test --watch"), "test");
    assert_eq!(label_for_command_line("pnpm"), "pnpm");
    assert_eq!(label_for_command_line("bun run"), "bun");
    assert_eq!(label_for_command_line("/usr/bin/python3 app.py"), "python3");
    assert_eq!(label_for_command_line(""), "");
}
