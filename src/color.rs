// src/color.rs

//! Color chains for prefixes, e.g. `"bold.red"`, `"bgBlue.white"`,
//! `"#ff8800"`.
//!
//! Colorizing goes through `colored`, so `NO_COLOR`, `CLICOLOR_FORCE` and
//! non-terminal output are honoured without extra plumbing.

use std::str::FromStr;

use colored::{Color, ColoredString, Colorize};

const RESET: &str = "\x1b[0m";

/// Reset escape, or an empty string when colors are disabled.
pub fn reset_code() -> &'static str {
    if colored::control::SHOULD_COLORIZE.should_colorize() {
        RESET
    } else {
        ""
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Dimmed,
    Italic,
    Underline,
    Reversed,
    Strikethrough,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorChain {
    fg: Option<Color>,
    bg: Option<Color>,
    styles: Vec<Style>,
}

impl ColorChain {
    pub fn is_plain(&self) -> bool {
        self.fg.is_none() && self.bg.is_none() && self.styles.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        if self.is_plain() {
            return text.to_string();
        }

        let mut out: ColoredString = text.normal();
        if let Some(fg) = self.fg {
            out = out.color(fg);
        }
        if let Some(bg) = self.bg {
            out = out.on_color(bg);
        }
        for style in &self.styles {
            out = match style {
                Style::Bold => out.bold(),
                Style::Dimmed => out.dimmed(),
                Style::Italic => out.italic(),
                Style::Underline => out.underline(),
                Style::Reversed => out.reversed(),
                Style::Strikethrough => out.strikethrough(),
            };
        }
        out.to_string()
    }
}

impl FromStr for ColorChain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chain = ColorChain::default();

        for token in s.split('.').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(style) = parse_style(token) {
                chain.styles.push(style);
                continue;
            }
            if token.eq_ignore_ascii_case("reset") || token.eq_ignore_ascii_case("none") {
                continue;
            }

            let (is_bg, name) = match token.strip_prefix("bg") {
                Some(rest) if !rest.is_empty() => (true, rest.trim_start_matches(['_', '-'])),
                _ => (false, token),
            };
            let color =
                parse_color(name).ok_or_else(|| format!("unknown color '{token}' in \"{s}\""))?;
            if is_bg {
                chain.bg = Some(color);
            } else {
                chain.fg = Some(color);
            }
        }

        Ok(chain)
    }
}

fn parse_style(token: &str) -> Option<Style> {
    match token.to_lowercase().as_str() {
        "bold" => Some(Style::Bold),
        "dim" | "dimmed" => Some(Style::Dimmed),
        "italic" => Some(Style::Italic),
        "underline" => Some(Style::Underline),
        "inverse" | "reversed" => Some(Style::Reversed),
        "strikethrough" => Some(Style::Strikethrough),
        _ => None,
    }
}

fn parse_color(name: &str) -> Option<Color> {
    if let Some(hex) = name.strip_prefix('#') {
        return parse_hex(hex);
    }

    let lower = name.to_lowercase().replace(['_', '-', ' '], "");
    let color = match lower.as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        "gray" | "grey" | "blackbright" | "brightblack" => Color::BrightBlack,
        "redbright" | "brightred" => Color::BrightRed,
        "greenbright" | "brightgreen" => Color::BrightGreen,
        "yellowbright" | "brightyellow" => Color::BrightYellow,
        "bluebright" | "brightblue" => Color::BrightBlue,
        "magentabright" | "brightmagenta" => Color::BrightMagenta,
        "cyanbright" | "brightcyan" => Color::BrightCyan,
        "whitebright" | "brightwhite" => Color::BrightWhite,
        _ => return None,
    };
    Some(color)
}

fn parse_hex(hex: &str) -> Option<Color> {
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Color::TrueColor {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}
