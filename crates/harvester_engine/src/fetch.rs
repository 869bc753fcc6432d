use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use futures_util::StreamExt;
use harvester_core::FetchHint;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::decode::decode_html;
use crate::{FetchError, FetchErrorKind, PageContent};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            user_agent: concat!("review-harvester/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// The fetch capability: retrieve the content at a locator, honouring the hint.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, locator: &str, hint: &FetchHint) -> Result<PageContent, FetchError>;
}

/// Plain HTTP fetcher.
///
/// It cannot scroll or click, so `ScrollAndWait` and `LoadMore` hints fetch the
/// locator unchanged; the driver then sees no new records and winds the target down.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let redirect_limit = settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(policy)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| FetchError::new(FetchErrorKind::Transport, err.to_string()))?;

        Ok(Self { settings, client })
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    fn too_large(&self, actual: u64) -> FetchError {
        FetchError::new(
            FetchErrorKind::Transport,
            format!(
                "response too large (max {}, actual {actual})",
                self.settings.max_bytes
            ),
        )
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, locator: &str, hint: &FetchHint) -> Result<PageContent, FetchError> {
        let parsed = reqwest::Url::parse(locator)
            .map_err(|err| FetchError::new(FetchErrorKind::Transport, err.to_string()))?;
        if *hint != FetchHint::Load {
            engine_debug!("{hint:?} not supported over plain HTTP; loading {locator}");
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(status_kind(status), status.to_string()));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(self.too_large(content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FetchErrorKind::Transport,
                    format!("unsupported content type {ct}"),
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(self.too_large(next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        let decoded = decode_html(&bytes, content_type.as_deref());
        if decoded.lossy {
            engine_warn!("{locator}: malformed {} replaced", decoded.encoding_label);
        }
        engine_debug!(
            "fetched {locator}: {} bytes, {}",
            bytes.len(),
            decoded.encoding_label
        );

        Ok(PageContent {
            locator: locator.to_string(),
            final_url,
            html: decoded.html,
        })
    }
}

/// Maps a non-success status to the failure kind the governor reacts to.
fn status_kind(status: StatusCode) -> FetchErrorKind {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchErrorKind::NotFound,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            FetchErrorKind::Blocked
        }
        _ => FetchErrorKind::Transport,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchErrorKind::Timeout, err.to_string());
    }
    FetchError::new(FetchErrorKind::Transport, err.to_string())
}
