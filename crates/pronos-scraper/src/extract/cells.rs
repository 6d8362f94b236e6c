//! Cell-level helpers shared by the extractors.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid regex"));
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid regex"));
static LEADING_INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)").expect("valid regex"));

/// Row classes used for repeated headers and spacers inside `tbody`.
const NON_DATA_ROW_CLASSES: [&str; 4] = ["thead", "over_header", "spacer", "partial_table"];

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Text content with whitespace collapsed; `None` when empty.
pub(crate) fn clean_text(element: ElementRef<'_>) -> Option<String> {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    let collapsed = collapse_whitespace(&joined);
    (!collapsed.is_empty()).then_some(collapsed)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps each `data-stat` attribute in the row to its cell.
pub(crate) fn cells_by_stat<'a>(
    row: ElementRef<'a>,
    cell_sel: &Selector,
) -> HashMap<&'a str, ElementRef<'a>> {
    row.select(cell_sel)
        .filter_map(|cell| cell.value().attr("data-stat").map(|stat| (stat, cell)))
        .collect()
}

pub(crate) fn stat_text(cells: &HashMap<&str, ElementRef<'_>>, stat: &str) -> Option<String> {
    cells.get(stat).and_then(|cell| clean_text(*cell))
}

pub(crate) fn stat_href(
    cells: &HashMap<&str, ElementRef<'_>>,
    stat: &str,
    link_sel: &Selector,
) -> Option<String> {
    cells
        .get(stat)?
        .select(link_sel)
        .next()?
        .value()
        .attr("href")
        .map(str::to_string)
}

/// `true` for repeated header rows, spacers, and rows without data cells.
pub(crate) fn is_non_data_row(row: ElementRef<'_>, td_sel: &Selector) -> bool {
    let classed = row
        .value()
        .classes()
        .any(|class| NON_DATA_ROW_CLASSES.contains(&class));
    classed || row.select(td_sel).next().is_none()
}

/// Leading integer of a cell such as `"2 (4)"` (penalties) or `"25-123"`
/// (age in years-days).
pub(crate) fn leading_u32(text: &str) -> Option<u32> {
    LEADING_INT_RE
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// First number in the text with thousands separators removed.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    NUMBER_RE
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

pub(crate) fn parse_count(text: &str) -> Option<u64> {
    NUMBER_RE
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// A percentage if the text contains one, otherwise its first number,
/// otherwise the text unchanged.
pub(crate) fn percentage_or_value(text: &str) -> String {
    if let Some(caps) = PERCENT_RE.captures(text) {
        return format!("{}%", &caps[1]);
    }
    if let Some(m) = NUMBER_RE.find(text) {
        return m.as_str().replace(',', "");
    }
    text.to_string()
}

/// Some tables ship inside HTML comments and are only revealed by script.
/// Returns the first comment containing `needle`, parsed as a fragment.
pub(crate) fn commented_fragment(html: &Html, needle: &str) -> Option<Html> {
    html.tree.nodes().find_map(|node| match node.value() {
        Node::Comment(comment) => {
            let text: &str = comment;
            text.contains(needle).then(|| Html::parse_fragment(text))
        }
        _ => None,
    })
}
