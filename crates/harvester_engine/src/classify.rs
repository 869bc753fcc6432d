use harvester_core::StructureType;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::discover::resolve_url;
use crate::extract::{parse_selectors, ExtractError, ExtractionSelectors};

/// Markup signatures the classifier looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSelectors {
    /// Next-page links; the first one with an href is followed.
    pub next_page: Vec<String>,
    /// Buttons that reveal more reviews in place.
    pub load_more: Vec<String>,
    /// Sentinels of scroll-triggered loaders.
    pub infinite_scroll: Vec<String>,
    /// Review items of a fixed list.
    pub review_items: Vec<String>,
}

impl Default for ClassifierSelectors {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            next_page: list(&[
                "a[rel=\"next\"]",
                "link[rel=\"next\"]",
                ".pagination a.next",
                "a.next-page",
                "[data-testid*=\"next-page\"]",
            ]),
            load_more: list(&[".load-more", ".show-more", "button[data-testid*=\"load\"]"]),
            infinite_scroll: list(&[
                "[data-infinite-scroll]",
                ".infinite-scroll",
                ".scroll-loader",
                "[data-testid*=\"infinite\"]",
            ]),
            review_items: ExtractionSelectors::default().containers,
        }
    }
}

#[derive(Debug)]
pub struct PageClassifier {
    next_page: Vec<Selector>,
    load_more: Vec<Selector>,
    infinite_scroll: Vec<Selector>,
    review_items: Vec<Selector>,
}

impl PageClassifier {
    pub fn new(selectors: &ClassifierSelectors) -> Result<Self, ExtractError> {
        Ok(Self {
            next_page: parse_selectors(&selectors.next_page, "next_page")?,
            load_more: parse_selectors(&selectors.load_more, "load_more")?,
            infinite_scroll: parse_selectors(&selectors.infinite_scroll, "infinite_scroll")?,
            review_items: parse_selectors(&selectors.review_items, "review_items")?,
        })
    }

    /// Paging controls win over scroll loaders, which win over a plain list.
    /// `Unknown` means none of the signatures matched.
    pub fn classify(&self, doc: &Html) -> StructureType {
        if any_match(doc, &self.next_page) || any_match(doc, &self.load_more) {
            StructureType::Paginated
        } else if any_match(doc, &self.infinite_scroll) {
            StructureType::InfiniteScroll
        } else if any_match(doc, &self.review_items) {
            StructureType::Static
        } else {
            StructureType::Unknown
        }
    }

    /// Resolved href of the first next-page control that has one.
    pub fn next_page_link(&self, doc: &Html, base: &str) -> Option<String> {
        let base = Url::parse(base).ok();
        self.next_page.iter().find_map(|selector| {
            doc.select(selector).find_map(|element| {
                let href = element.value().attr("href")?;
                resolve_url(href, base.as_ref()).map(String::from)
            })
        })
    }

    pub fn has_load_more(&self, doc: &Html) -> bool {
        any_match(doc, &self.load_more)
    }
}

fn any_match(doc: &Html, selectors: &[Selector]) -> bool {
    selectors.iter().any(|s| doc.select(s).next().is_some())
}
