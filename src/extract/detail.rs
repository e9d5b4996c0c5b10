use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{element_text, ExtractError};
use crate::model::{Detail, PROFESSION_UNSPECIFIED};

static DESCRIPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".person-description").unwrap());
static LABEL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".person-title").unwrap());

pub fn parse_detail(html: &str) -> Result<Detail, ExtractError> {
    let doc = Html::parse_document(html);

    let description = doc
        .select(&DESCRIPTION_SEL)
        .next()
        .map(element_text)
        .ok_or_else(|| ExtractError::MalformedPage("no description block".into()))?;
    let label = doc.select(&LABEL_SEL).next().map(element_text);

    Ok(Detail {
        description,
        profession: derive_profession(label.as_deref()),
    })
}

/// "Senior Consultant, Oslo" → "Senior Consultant".
pub fn derive_profession(label: Option<&str>) -> String {
    label
        .and_then(|l| l.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(PROFESSION_UNSPECIFIED)
        .to_string()
}

// ── Tests ──
