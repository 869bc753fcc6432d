//! Target discovery: plain URL lists and link scans over listing pages.
use std::collections::HashSet;

use engine_logging::{engine_info, engine_warn};
use harvester_core::{DiscoveryMethod, FetchHint, Target, TargetError};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{Fetcher, Governor, GovernorError};

/// Targets from newline separated URLs. Blank lines and `#` comments are skipped;
/// repeated URLs (after canonicalization) are kept once.
pub fn targets_from_lines(text: &str, method: DiscoveryMethod) -> (Vec<Target>, Vec<TargetError>) {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut errors = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Target::new(line, method) {
            Ok(target) => {
                if seen.insert(target.id().to_string()) {
                    targets.push(target);
                }
            }
            Err(err) => errors.push(err),
        }
    }
    (targets, errors)
}

/// Product links on a listing page whose resolved URL contains `pattern`, in
/// document order, deduplicated, at most `max_targets`.
pub fn scan_links(html: &str, base_url: &str, pattern: &str, max_targets: usize) -> Vec<Target> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for anchor in document.select(&anchors) {
        if targets.len() >= max_targets {
            break;
        }
        let Some(url) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_url(href, base.as_ref()))
        else {
            continue;
        };
        if !url.as_str().contains(pattern) {
            continue;
        }
        if let Ok(target) = Target::new(url.as_str(), DiscoveryMethod::LinkScan) {
            if seen.insert(target.id().to_string()) {
                targets.push(target);
            }
        }
    }
    targets
}

/// Fetches a listing page through the governor and scans it for target links.
pub async fn discover_targets(
    listing_url: &str,
    pattern: &str,
    max_targets: usize,
    fetcher: &dyn Fetcher,
    governor: &Governor,
    cancel: &CancellationToken,
) -> Result<Vec<Target>, GovernorError> {
    let page = governor
        .execute(listing_url, &FetchHint::Load, fetcher, cancel)
        .await?;
    let targets = scan_links(&page.html, &page.final_url, pattern, max_targets);
    if targets.is_empty() {
        engine_warn!("no links containing {pattern:?} on {listing_url}");
    } else {
        engine_info!("discovered {} targets on {listing_url}", targets.len());
    }
    Ok(targets)
}

/// Resolves an href against the page URL. Fragment-only and `javascript:`
/// references yield nothing; only http(s) results are returned.
pub(crate) fn resolve_url(reference: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with("javascript:") {
        return None;
    }
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => base?.join(trimmed).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}
