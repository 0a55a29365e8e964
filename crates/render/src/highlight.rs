use std::sync::OnceLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;

/// Theme code blocks are styled with.
const CODE_THEME: &str = "base16-ocean.dark";

/// Foreground used when a line cannot be highlighted.
const FALLBACK_FOREGROUND: Rgb = Rgb {
    r: 0xC0,
    g: 0xC5,
    b: 0xCE,
};

/// 24-bit colour of one highlighted span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// One styled run of text within a code line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSpan {
    pub text: String,
    pub foreground: Rgb,
}

/// One display line of a highlighted code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedLine {
    /// 1-based number shown in the gutter.
    pub number: usize,
    pub spans: Vec<CodeSpan>,
}

fn syntax_set() -> &'static SyntaxSet {
    static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme() -> &'static Theme {
    static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();
    let themes = THEME_SET.get_or_init(ThemeSet::load_defaults);
    &themes.themes[CODE_THEME]
}

/// Highlights one fenced block. Unknown language tags fall back to plain
/// text so the block still renders, numbered, instead of disappearing.
pub fn highlight_code(language: Option<&str>, code: &str) -> Vec<HighlightedLine> {
    let syntax_set = syntax_set();
    let syntax = language
        .and_then(|token| syntax_set.find_syntax_by_token(token))
        .unwrap_or_else(|| syntax_set.find_syntax_plain_text());

    let mut highlighter = HighlightLines::new(syntax, theme());
    code.lines()
        .enumerate()
        .map(|(index, line)| {
            let spans = match highlighter.highlight_line(line, syntax_set) {
                Ok(regions) => regions
                    .into_iter()
                    .map(|(style, text)| CodeSpan {
                        text: text.to_string(),
                        foreground: Rgb {
                            r: style.foreground.r,
                            g: style.foreground.g,
                            b: style.foreground.b,
                        },
                    })
                    .collect(),
                Err(error) => {
                    tracing::debug!(error = %error, "highlighting failed, rendering line unstyled");
                    vec![CodeSpan {
                        text: line.to_string(),
                        foreground: FALLBACK_FOREGROUND,
                    }]
                }
            };
            HighlightedLine {
                number: index + 1,
                spans,
            }
        })
        .collect()
}
