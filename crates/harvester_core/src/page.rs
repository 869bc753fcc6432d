use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StructureType {
    InfiniteScroll,
    Paginated,
    Static,
    #[default]
    Unknown,
}

/// Position within a target's review listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cursor {
    #[default]
    Start,
    /// Number of scroll/wait rounds the fetch capability performs before capturing content.
    Scroll { offset: u32 },
    /// Page number and the locator to fetch it from (next-page link or the target URL
    /// itself when the control is a button without href).
    Page { number: u32, locator: String },
}

/// Instruction passed to the fetch capability alongside the locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchHint {
    Load,
    ScrollAndWait { offset: u32 },
    LoadMore { clicks: u32 },
}

/// Transient per-target extraction state, owned by the driver while a target runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageState {
    pub structure: StructureType,
    /// Whether `structure` came from the classifier rather than the default.
    pub classified: bool,
    pub cursor: Cursor,
    pub consecutive_empty_fetches: u32,
    pub consecutive_extraction_failures: u32,
    pub cycles: u32,
    #[serde(default)]
    pub records_accepted: u64,
}

impl PageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator and hint for fetching the content at the current cursor.
    pub fn fetch_request(&self, target_url: &str) -> (String, FetchHint) {
        match &self.cursor {
            Cursor::Start => (target_url.to_string(), FetchHint::Load),
            Cursor::Scroll { offset } => (
                target_url.to_string(),
                FetchHint::ScrollAndWait { offset: *offset },
            ),
            Cursor::Page { number, locator } if locator == target_url => (
                locator.clone(),
                FetchHint::LoadMore {
                    clicks: number.saturating_sub(1),
                },
            ),
            Cursor::Page { locator, .. } => (locator.clone(), FetchHint::Load),
        }
    }
}
