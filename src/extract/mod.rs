pub mod detail;
pub mod directory;

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;
use thiserror::Error;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed page: {0}")]
    MalformedPage(String),
}

/// Visible text of an element with runs of whitespace collapsed.
fn element_text(el: ElementRef<'_>) -> String {
    let joined: String = el.text().collect();
    WS_RE.replace_all(joined.trim(), " ").into_owned()
}
