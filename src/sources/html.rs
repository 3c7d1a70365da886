//! Text extraction helpers for episode pages.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// Extracts text from an element, excluding ruby annotations (`<rt>`, `<rp>`).
pub fn text_without_ruby(elem: ElementRef) -> String {
    let mut text = String::new();

    for node in elem.descendants() {
        if let Node::Text(t) = node.value() {
            let in_annotation = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "rt" | "rp"))
            });

            if !in_annotation {
                text.push_str(t);
            }
        }
    }

    text
}

/// Returns the trimmed text of the first non-empty match, trying selectors in order.
pub fn first_text(doc: &Html, selectors: &[&Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        doc.select(selector)
            .map(|elem| text_without_ruby(elem).trim().to_string())
            .find(|text| !text.is_empty())
    })
}

/// Joins the paragraphs of a body element with newlines.
///
/// Blank paragraphs are kept as empty lines. Elements without `<p>` children
/// fall back to their whole text.
pub fn paragraph_text(body: ElementRef, paragraph: &Selector) -> String {
    let paragraphs: Vec<String> = body
        .select(paragraph)
        .map(|p| text_without_ruby(p).trim_end().to_string())
        .collect();

    let text = if paragraphs.is_empty() {
        text_without_ruby(body)
    } else {
        paragraphs.join("\n")
    };

    text.trim_matches('\n').to_string()
}

/// Returns the text following a label such as `作者：` in an element's text.
pub fn text_after_label(text: &str, label: &str) -> Option<String> {
    let (_, rest) = text.split_once(label)?;
    let value = rest.lines().next().unwrap_or("").trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
