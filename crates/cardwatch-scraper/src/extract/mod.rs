//! Selector resolution against an HTML snapshot.
//!
//! Both page engines snapshot the (rendered) document as a string; all
//! extraction runs on that snapshot, so the engines share one code path and
//! nothing borrowed from a parser crosses an await point.
//!
//! A [`cardwatch_core::Selector`] resolves to the first non-null extraction
//! over its fallback list. Individual expression failures — parse errors,
//! no match, empty text, `matchText` mismatch — are swallowed and the next
//! expression is tried; exhausting the list yields `None`.

mod xpath;

use cardwatch_core::{Extract, Selector, SelectorGroup, SelectorKind};
use scraper::{Html, Selector as CssSelector};

use crate::normalize::fold_text;

/// A parsed page (or page fragment) plus the URL it was loaded from.
#[derive(Debug, Clone)]
pub struct Document {
    url: String,
    html: String,
}

impl Document {
    #[must_use]
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Document {
            url: url.into(),
            html: html.into(),
        }
    }

    /// URL the snapshot was taken from — for fragments, the parent page URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolves a selector to its first non-null extraction.
    #[must_use]
    pub fn extract(&self, selector: &Selector) -> Option<String> {
        let mode = selector.extract.unwrap_or(Extract::Text);
        for expr in selector.value.as_slice() {
            let extracted = match selector.kind {
                SelectorKind::Css => self.extract_css(expr, mode, selector.match_text.as_deref()),
                SelectorKind::Xpath => {
                    self.extract_xpath(expr, mode, selector.match_text.as_deref())
                }
                SelectorKind::Text => self.extract_text(expr),
            };
            if extracted.is_some() {
                return extracted;
            }
        }
        None
    }

    /// Returns one fragment document per node matched by the selector, in
    /// document order. Only CSS selection can produce fragments; shop config
    /// validation enforces this for article selectors.
    #[must_use]
    pub fn select_fragments(&self, selector: &Selector) -> Vec<Document> {
        if selector.kind != SelectorKind::Css {
            tracing::debug!(kind = ?selector.kind, "fragment selection requires a css selector");
            return Vec::new();
        }

        let doc = Html::parse_document(&self.html);
        let mut fragments = Vec::new();
        for expr in selector.value.as_slice() {
            let Ok(css) = CssSelector::parse(expr) else {
                continue;
            };
            for element in doc.select(&css) {
                fragments.push(Document::new(self.url.clone(), element.html()));
            }
            if !fragments.is_empty() {
                break;
            }
        }
        fragments
    }

    /// True when the selector matches anything in the snapshot.
    #[must_use]
    pub fn exists(&self, selector: &Selector) -> bool {
        self.extract(selector).is_some()
    }

    /// True when ANY selector in the group matches.
    #[must_use]
    pub fn any_match(&self, group: Option<&SelectorGroup>) -> bool {
        group.is_some_and(|group| group.iter().any(|selector| self.exists(selector)))
    }

    fn extract_css(&self, expr: &str, mode: Extract, match_text: Option<&str>) -> Option<String> {
        let doc = Html::parse_document(&self.html);
        let css = CssSelector::parse(expr).ok()?;

        for element in doc.select(&css) {
            let text = element.text().collect::<String>();
            if !match_text_ok(match_text, &text) {
                continue;
            }
            let value = match mode {
                Extract::Href => element
                    .value()
                    .attr("href")
                    .map(|href| href.trim().to_string()),
                Extract::InnerHtml => Some(element.inner_html()),
                Extract::Text => non_empty(text),
            };
            // With a matchText guard, bare element presence is the signal
            // even when the mode yields nothing further (e.g. empty href).
            if value.is_some() {
                return value;
            }
            if match_text.is_some() {
                return non_empty(element.text().collect::<String>());
            }
        }
        None
    }

    fn extract_xpath(&self, expr: &str, mode: Extract, match_text: Option<&str>) -> Option<String> {
        for found in xpath::evaluate(&self.html, expr) {
            if !match_text_ok(match_text, found.text.as_deref().unwrap_or_default()) {
                continue;
            }
            let value = match mode {
                Extract::Href => found.href.clone(),
                // Inner HTML is not reconstructable from the xpath item tree;
                // the node text is the closest faithful value.
                Extract::InnerHtml | Extract::Text => found.text.clone().and_then(non_empty),
            };
            if value.is_some() {
                return value;
            }
        }
        None
    }

    /// A text selector matches when the document's visible text contains the
    /// expression (case- and accent-insensitively); the expression itself is
    /// the extracted value.
    fn extract_text(&self, expr: &str) -> Option<String> {
        let doc = Html::parse_document(&self.html);
        let page_text = fold_text(&doc.root_element().text().collect::<String>());
        if page_text.contains(&fold_text(expr)) {
            non_empty(expr.to_string())
        } else {
            None
        }
    }
}

fn match_text_ok(expected: Option<&str>, actual: &str) -> bool {
    match expected {
        None => true,
        Some(expected) => fold_text(expected) == fold_text(actual),
    }
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
