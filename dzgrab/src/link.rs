use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::{Client, redirect};
use tracing::{debug, error, info};

use crate::error::InputError;
use crate::session::{USER_AGENT, prefix};

const SHORT_LINK_HOST: &str = "link.deezer.com";
const SITE_DOMAIN: &str = "deezer.com";

static RE_TRACK_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/track/(\d+)").expect("track path pattern"));

/// Decimal track id, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

impl AssetId {
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InputError::Empty);
        }
        if !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(InputError::NotNumeric(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn track_id_from_url(url: &str) -> Option<AssetId> {
    RE_TRACK_PATH
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| AssetId(m.as_str().to_string()))
}

/// Accepts a bare id, a track url, or a `link.deezer.com` short link.
pub async fn resolve_asset_id(input: &str, timeout: Duration) -> Result<AssetId, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::Empty);
    }
    if !input.contains(SITE_DOMAIN) {
        return AssetId::parse(input);
    }

    let url = if input.contains(SHORT_LINK_HOST) {
        follow_short_link(input, timeout).await?
    } else {
        input.to_string()
    };

    match track_id_from_url(&url) {
        Some(id) => {
            info!("Extracted track id: {}", id);
            Ok(id)
        }
        None => {
            error!("Could not extract track id from url: {}", url);
            Err(InputError::NoTrackInUrl(url))
        }
    }
}

async fn follow_short_link(url: &str, timeout: Duration) -> Result<String, InputError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    let final_url = client.get(url).send().await?.url().to_string();
    info!("Redirected to: {}", final_url);
    if !final_url.contains(SHORT_LINK_HOST) {
        return Ok(final_url);
    }

    // some short links answer 200 with a js redirect, read Location by hand
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .build()?;
    let response = client.get(url).send().await?;
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    match location {
        Some(location) => {
            info!("Found redirect location: {}", location);
            Ok(location)
        }
        None => {
            let body = response.text().await.unwrap_or_default();
            debug!("Page content: {}", prefix(&body, 500));
            Err(InputError::NoTrackInUrl(final_url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_extracted_from_urls() {
        for (url, id) in [
            ("https://www.deezer.com/track/123456789", "123456789"),
            ("https://deezer.com/track/987654321", "987654321"),
            ("https://www.deezer.com/en/track/555666777?utm=x", "555666777"),
        ] {
            assert_eq!(track_id_from_url(url).unwrap().as_str(), id);
        }
        assert!(track_id_from_url("https://www.deezer.com/album/42").is_none());
    }

    #[test]
    fn bare_ids_must_be_numeric() {
        assert_eq!(AssetId::parse(" 3135556 ").unwrap().as_str(), "3135556");
        assert!(matches!(AssetId::parse("31a5"), Err(InputError::NotNumeric(_))));
        assert!(matches!(AssetId::parse(""), Err(InputError::Empty)));
    }

    #[tokio::test]
    async fn full_urls_resolve_without_network() {
        let id = resolve_asset_id("https://www.deezer.com/fr/track/3135556", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "3135556");

        let err = resolve_asset_id("https://www.deezer.com/playlist/1", Duration::from_secs(1)).await;
        assert!(matches!(err, Err(InputError::NoTrackInUrl(_))));
    }
}
