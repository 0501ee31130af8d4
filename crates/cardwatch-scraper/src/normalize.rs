//! URL and text normalization helpers shared by the extractor and the
//! match policy.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::error::ScrapeError;

/// Characters escaped when substituting a search phrase into a query slot.
/// `CONTROLS` plus the characters that would change URL structure.
const QUERY_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'?');

/// Builds the search URL for a shop: substitutes the URL-encoded phrase into
/// the `{query}` slot, or appends it when the slot is absent.
#[must_use]
pub fn build_search_url(search_url: &str, phrase: &str) -> String {
    let encoded = utf8_percent_encode(phrase, QUERY_SET).to_string();
    if search_url.contains("{query}") {
        search_url.replace("{query}", &encoded)
    } else {
        format!("{search_url}{encoded}")
    }
}

/// Resolves an extracted `href` against a shop's base URL.
///
/// Accepts already-absolute, protocol-relative (`//host/path`), absolute-path
/// (`/path`), and relative (`path`) inputs. The operation is idempotent:
/// normalizing an already-normalized URL returns it unchanged.
///
/// # Errors
///
/// Returns [`ScrapeError::InvalidUrl`] when neither the href nor the base
/// yields a valid absolute URL.
pub fn normalize_url(href: &str, base_url: &str) -> Result<String, ScrapeError> {
    if let Ok(absolute) = Url::parse(href) {
        return Ok(absolute.to_string());
    }

    let base = Url::parse(base_url).map_err(|e| ScrapeError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    base.join(href)
        .map(|joined| joined.to_string())
        .map_err(|e| ScrapeError::InvalidUrl {
            url: href.to_string(),
            reason: e.to_string(),
        })
}

/// Recovers a human-readable title from a product URL slug: the last
/// non-empty path segment with dashes turned into spaces.
///
/// Used when a shop truncates listing titles and the slug carries the full
/// product name.
#[must_use]
pub fn slug_title(product_url: &str) -> Option<String> {
    let url = Url::parse(product_url).ok()?;
    let segment = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()?;
    let cleaned = segment
        .trim_end_matches(".html")
        .replace(['-', '_'], " ")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Folds text for comparison: lowercase, Polish/Latin accents stripped,
/// whitespace collapsed to single spaces.
#[must_use]
pub fn fold_text(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        match c {
            'ą' => folded.push('a'),
            'ć' => folded.push('c'),
            'ę' => folded.push('e'),
            'ł' => folded.push('l'),
            'ń' => folded.push('n'),
            'ó' => folded.push('o'),
            'ś' => folded.push('s'),
            'ź' | 'ż' => folded.push('z'),
            'á' | 'à' | 'â' | 'ä' => folded.push('a'),
            'é' | 'è' | 'ê' | 'ë' => folded.push('e'),
            'í' | 'ì' | 'î' | 'ï' => folded.push('i'),
            'ö' | 'ô' | 'ò' => folded.push('o'),
            'ü' | 'û' | 'ù' => folded.push('u'),
            other => folded.push(other),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
