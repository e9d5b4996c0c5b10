use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::{element_text, ExtractError};
use crate::model::{Group, Listing, Stub};

static GROUP_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.c-accordion__item").unwrap());
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.c-accordion__title").unwrap());
static ENTITY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article").unwrap());
static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.person-name").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Parse the staff listing into groups of stubs, in page order.
///
/// Image and detail references are resolved against `base`, so relative
/// links on the page come out absolute.
pub fn parse_directory(html: &str, base: &Url) -> Result<Listing, ExtractError> {
    let doc = Html::parse_document(html);
    let mut groups = Vec::new();

    for item in doc.select(&GROUP_SEL) {
        let name = item
            .select(&TITLE_SEL)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExtractError::MalformedPage("group without a title".into()))?;

        let members = item
            .select(&ENTITY_SEL)
            .map(|article| parse_stub(article, base, &name))
            .collect::<Result<Vec<_>, _>>()?;
        if members.is_empty() {
            return Err(ExtractError::MalformedPage(format!(
                "group '{}' has no people",
                name
            )));
        }

        groups.push(Group { name, members });
    }

    if groups.is_empty() {
        return Err(ExtractError::MalformedPage("no directory groups found".into()));
    }
    Ok(groups)
}

fn parse_stub(article: ElementRef<'_>, base: &Url, group: &str) -> Result<Stub, ExtractError> {
    let missing = |what: &str| {
        ExtractError::MalformedPage(format!("entry in '{}' is missing its {}", group, what))
    };

    let name = article
        .select(&NAME_SEL)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| missing("name"))?;
    let image = article
        .select(&IMG_SEL)
        .next()
        .and_then(|el| el.value().attr("src"))
        .ok_or_else(|| missing("image"))?;
    let detail = article
        .select(&LINK_SEL)
        .next()
        .and_then(|el| el.value().attr("href"))
        .ok_or_else(|| missing("link"))?;

    Ok(Stub {
        image_ref: resolve(base, image),
        detail_ref: resolve(base, detail),
        name,
    })
}

fn resolve(base: &Url, reference: &str) -> String {
    let reference = reference.trim();
    base.join(reference)
        .map(String::from)
        .unwrap_or_else(|_| reference.to_string())
}

// ── Tests ──
