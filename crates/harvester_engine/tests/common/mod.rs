#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use harvester_core::{CanonicalRecord, DiscoveryMethod, FetchHint, Target};
use harvester_engine::{
    FetchError, FetchErrorKind, Fetcher, GovernorConfig, HarvestConfig, PageContent, RecordWriter,
    StorageError,
};

pub struct Review {
    pub reviewer: String,
    pub text: String,
    pub rating: String,
    pub date: String,
}

pub fn review(reviewer: &str, text: &str, rating: &str, date: &str) -> Review {
    Review {
        reviewer: reviewer.to_string(),
        text: text.to_string(),
        rating: rating.to_string(),
        date: date.to_string(),
    }
}

/// `count` distinct valid reviews whose reviewers are `{prefix}-{n}`.
pub fn reviews(prefix: &str, count: usize) -> Vec<Review> {
    (1..=count)
        .map(|n| {
            review(
                &format!("{prefix}-{n}"),
                &format!("Review number {n} from {prefix}, lovely texture."),
                &format!("{}", n % 5 + 1),
                "2024-03-15",
            )
        })
        .collect()
}

/// Product page with the default review markup and an optional `rel="next"` link.
pub fn review_page(reviews: &[Review], next: Option<&str>) -> String {
    let mut html = String::from("<html><body><h1>Product</h1><div class=\"reviews\">");
    for r in reviews {
        html.push_str(&format!(
            "<div class=\"review-item\"><span class=\"reviewer-name\">{}</span>\
             <p class=\"review-text\">{}</p><span class=\"rating\">{}</span>\
             <span class=\"review-date\">{}</span></div>",
            r.reviewer, r.text, r.rating, r.date
        ));
    }
    html.push_str("</div>");
    if let Some(href) = next {
        html.push_str(&format!("<a rel=\"next\" href=\"{href}\">Next</a>"));
    }
    html.push_str("</body></html>");
    html
}

pub fn target(url: &str) -> Target {
    Target::new(url, DiscoveryMethod::DirectSearch).unwrap()
}

/// Serves canned pages by locator. Unknown locators are 404s; locators in
/// `hang_on` never answer.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, String>,
    hang_on: HashSet<String>,
    calls: Mutex<Vec<(String, FetchHint)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, locator: &str, html: String) -> Self {
        self.pages.insert(locator.to_string(), html);
        self
    }

    pub fn hang_on(mut self, locator: &str) -> Self {
        self.hang_on.insert(locator.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, FetchHint)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn locators(&self) -> Vec<String> {
        self.calls().into_iter().map(|(locator, _)| locator).collect()
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, locator: &str, hint: &FetchHint) -> Result<PageContent, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((locator.to_string(), hint.clone()));
        if self.hang_on.contains(locator) {
            std::future::pending::<()>().await;
        }
        match self.pages.get(locator) {
            Some(html) => Ok(PageContent::new(locator, html.clone())),
            None => Err(FetchError::new(FetchErrorKind::NotFound, "404 Not Found")),
        }
    }
}

/// Keeps accepted records in memory.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    records: Arc<Mutex<Vec<CanonicalRecord>>>,
}

impl MemoryWriter {
    pub fn records(&self) -> Vec<CanonicalRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordWriter for MemoryWriter {
    fn write(&mut self, record: &CanonicalRecord) -> Result<(), StorageError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// One worker, no pacing delay, two attempts per fetch.
pub fn fast_config(output_dir: &Path) -> HarvestConfig {
    HarvestConfig {
        concurrency: 1,
        governor: GovernorConfig {
            base_delay_ms: 0,
            ceiling_ms: 0,
            max_attempts: 2,
            fetch_timeout_ms: 3_600_000,
            jitter: false,
        },
        output_dir: output_dir.to_path_buf(),
        ..HarvestConfig::default()
    }
}
