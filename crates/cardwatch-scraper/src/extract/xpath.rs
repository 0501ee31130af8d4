//! XPath evaluation on an HTML snapshot, isolated here so the rest of the
//! extractor only sees plain matched values.

use skyscraper::html;
use skyscraper::xpath;

/// One node matched by an XPath expression, reduced to the values the
/// extractor can use.
pub(crate) struct XpathFound {
    /// Concatenated text content of the node (or the attribute value when
    /// the expression selects an attribute).
    pub text: Option<String>,
    /// The node's `href` attribute, when it is an element that carries one.
    pub href: Option<String>,
}

/// Evaluates `expr` against `html_text`, returning matches in document order.
///
/// Any failure — unparseable document, invalid expression, evaluation error —
/// yields an empty list; selector fallback handles the rest.
pub(crate) fn evaluate(html_text: &str, expr: &str) -> Vec<XpathFound> {
    let Ok(tree) = html::parse(html_text) else {
        return Vec::new();
    };

    let parsed = match xpath::parse(expr) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(expr, error = %e, "xpath expression does not parse");
            return Vec::new();
        }
    };

    let items = match parsed.apply(&tree) {
        Ok(items) => items,
        Err(e) => {
            tracing::debug!(expr, error = %e, "xpath evaluation failed");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .map(|item| {
            let node = item.extract_into_node();
            let href = node
                .as_element_node()
                .ok()
                .and_then(|element| element.get_attribute(&tree, "href"))
                .map(str::to_string);
            let text = node.text(&tree);
            XpathFound { text, href }
        })
        .collect()
}
