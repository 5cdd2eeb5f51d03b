//! Markup to plain text
//!
//! Issue bodies arrive as HTML (rendered fields) or wiki markup. Both are
//! reduced to plain text: tags dropped, block elements become line breaks,
//! runs of whitespace collapse to one space.

use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

static RE_WIKI_MACRO: OnceLock<Regex> = OnceLock::new();

/// Elements that start a new line
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre", "section", "table", "tr",
    "ul",
];

/// Elements whose text is never content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "noscript"];

/// Wiki macros reduced to nothing (`{code:java}`, `{noformat}`, ...)
const WIKI_MACROS: &[&str] = &["code", "noformat", "quote", "panel", "color"];

/// Strip markup from an issue body
pub fn to_plain_text(input: &str) -> String {
    let stripped = if looks_like_html(input) {
        html_to_text(input)
    } else {
        input.to_string()
    };
    normalize_whitespace(&strip_wiki_macros(&stripped))
}

fn looks_like_html(input: &str) -> bool {
    input.contains('<') && input.contains('>')
}

fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::new();

    for node in fragment.root_element().descendants() {
        if let Some(text_node) = node.value().as_text() {
            let skipped = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
            });
            if !skipped {
                text.push_str(text_node);
            }
        } else if let Some(elem) = node.value().as_element() {
            if BLOCK_ELEMENTS.contains(&elem.name()) {
                text.push('\n');
            } else if matches!(elem.name(), "td" | "th") {
                text.push(' ');
            }
        }
    }

    text
}

/// Remove `{macro}` and `{macro:params}` markers, keeping the enclosed text
fn strip_wiki_macros(input: &str) -> String {
    let re = RE_WIKI_MACRO.get_or_init(|| {
        Regex::new(&format!(r"\{{(?:{})(?::[^}}]*)?\}}", WIKI_MACROS.join("|")))
            .expect("wiki macro pattern is valid")
    });
    re.replace_all(input, "\n").into_owned()
}

/// Collapse whitespace inside lines and drop blank lines
fn normalize_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
