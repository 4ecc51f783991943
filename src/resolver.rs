//! Stream URL resolution
//!
//! Cameras that serve a browser viewer usually embed the live stream directly
//! in the page markup. The resolver fetches that page once and picks the
//! stream address out of it: the first `<video src>` wins, otherwise the
//! first `<img src>` (MJPEG viewers render the stream as an image).

use crate::errors::RecorderError;
use reqwest::Url;
use scraper::{Html, Selector};
use std::time::Duration;

/// Tag selectors in priority order
const CANDIDATE_SELECTORS: [&str; 2] = ["video[src]", "img[src]"];

/// Retrieves the HTML of a camera page
pub trait PageFetcher {
    fn fetch(&self, url: &Url) -> Result<String, RecorderError>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    fn fetch(&self, url: &Url) -> Result<String, RecorderError> {
        (**self).fetch(url)
    }
}

/// Blocking HTTP page fetcher without headers, auth or cookies
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, RecorderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecorderError::Resolution(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<String, RecorderError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| RecorderError::Resolution(format!("Request to {} failed: {}", url, e)))?;

        let response = response
            .error_for_status()
            .map_err(|e| RecorderError::Resolution(format!("Camera page returned error: {}", e)))?;

        response
            .text()
            .map_err(|e| RecorderError::Resolution(format!("Failed to read camera page: {}", e)))
    }
}

/// Prefix `default_scheme` onto an address that lacks one and parse it
pub fn normalize_address(address: &str, default_scheme: &str) -> Result<Url, RecorderError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(RecorderError::InvalidInput(
            "IP camera URL is required".to_string(),
        ));
    }

    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("{}://{}", default_scheme, address)
    };

    Url::parse(&with_scheme).map_err(|e| {
        RecorderError::Resolution(format!("Invalid camera address {:?}: {}", with_scheme, e))
    })
}

/// Whether `value` begins with an RFC 3986 scheme (`alpha *( alpha / digit / "+" / "-" / "." ) ":"`)
fn has_scheme(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

/// Turn a tag's `src` value into an absolute URL string
///
/// Absolute values are returned untouched; anything else is joined onto `base`.
pub fn absolutize(src: &str, base: &Url) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    if has_scheme(src) {
        return Some(src.to_string());
    }
    base.join(src).ok().map(|url| url.to_string())
}

/// Search camera page markup for a stream address
pub fn find_stream_url(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);

    for raw in CANDIDATE_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let found = document
            .select(&selector)
            .filter_map(|element| element.value().attr("src"))
            .find_map(|src| absolutize(src, base));
        if found.is_some() {
            return found;
        }
    }

    None
}

/// Resolves a camera's base address to its stream URL
pub struct StreamResolver<F: PageFetcher> {
    fetcher: F,
    default_scheme: String,
}

impl<F: PageFetcher> StreamResolver<F> {
    pub fn new(fetcher: F, default_scheme: impl Into<String>) -> Self {
        Self {
            fetcher,
            default_scheme: default_scheme.into(),
        }
    }

    /// Fetch the camera page once and extract the stream URL. No retries.
    pub fn resolve(&self, address: &str) -> Result<String, RecorderError> {
        let base = normalize_address(address, &self.default_scheme)?;
        log::debug!("Fetching camera page {}", base);

        let html = self.fetcher.fetch(&base)?;

        match find_stream_url(&html, &base) {
            Some(stream_url) => {
                log::info!("Extracted stream URL: {}", stream_url);
                Ok(stream_url)
            }
            None => Err(RecorderError::Resolution(format!(
                "No <video> or <img> source found on {}",
                base
            ))),
        }
    }
}
