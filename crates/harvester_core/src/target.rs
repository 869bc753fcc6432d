use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Stable identifier of a target: the first 16 hex digits of SHA-256 over its canonical URL.
pub type TargetId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryMethod {
    DirectSearch,
    BrandPage,
    LinkScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Exhausted,
}

impl TargetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TargetStatus::Completed | TargetStatus::Failed | TargetStatus::Exhausted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target url {0:?}")]
    InvalidUrl(String),
    #[error("target {id} is {from:?} and cannot move to {to:?}")]
    IllegalTransition {
        id: TargetId,
        from: TargetStatus,
        to: TargetStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    id: TargetId,
    url: String,
    discovery_method: DiscoveryMethod,
    status: TargetStatus,
}

impl Target {
    pub fn new(raw_url: &str, discovery_method: DiscoveryMethod) -> Result<Self, TargetError> {
        let url = canonical_url(raw_url).ok_or_else(|| TargetError::InvalidUrl(raw_url.into()))?;
        Ok(Self {
            id: target_id_for(&url),
            url,
            discovery_method,
            status: TargetStatus::Pending,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn discovery_method(&self) -> DiscoveryMethod {
        self.discovery_method
    }

    pub fn status(&self) -> TargetStatus {
        self.status
    }

    /// Moves the target along its lifecycle. Terminal statuses are frozen; an
    /// in-progress target may fall back to `Pending` when a run is stopped.
    pub fn transition(&mut self, next: TargetStatus) -> Result<(), TargetError> {
        let allowed = match (self.status, next) {
            (TargetStatus::Pending, TargetStatus::InProgress) => true,
            (TargetStatus::InProgress, TargetStatus::Pending) => true,
            (TargetStatus::InProgress, to) => to.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(TargetError::IllegalTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Canonical form used for target identity: parsed absolute URL with
/// lower-cased scheme and host, no fragment and no trailing slash on
/// non-root paths.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Some(url.to_string())
}

pub fn target_id_for(canonical: &str) -> TargetId {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
