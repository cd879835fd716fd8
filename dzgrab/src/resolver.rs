//! Turns track metadata into a download url.
//!
//! The cdn has changed its addressing several times and none of the known
//! formulas is documented, so the resolver does not pick one. It lists every
//! plausible candidate in priority order and takes the first one the cdn
//! answers with a 200:
//!
//! 1. the `full` media href from `song.getListData`, or failing that, urls
//!    synthesised from the track token;
//! 2. legacy md5 urls for each quality tier, highest first, across every
//!    known secret and cdn host;
//! 3. the unencrypted 30 second preview.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::ResolutionError;
use crate::gateway::{self, METHOD_LIST_DATA};
use crate::keys::md5_hex;
use crate::metadata::{AssetMetadata, MediaKind};
use crate::session::{Session, prefix};

const LEGACY_SECRETS: [&str; 3] = ["jo6aey6haid2Teih", "g4el58wc0zvf9na1", ""];
const URL_PART_SEPARATOR: char = '¤';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    Mp3_320,
    Mp3_256,
    Mp3_128,
}

impl Quality {
    /// Probe order, best first.
    pub const ALL: [Quality; 3] = [Quality::Mp3_320, Quality::Mp3_256, Quality::Mp3_128];

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Mp3_320 => "MP3_320",
            Quality::Mp3_256 => "MP3_256",
            Quality::Mp3_128 => "MP3_128",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateGroup {
    Listed,
    TokenFallback,
    Legacy(Quality),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub group: CandidateGroup,
}

impl Candidate {
    fn new(url: String, group: CandidateGroup) -> Self {
        Self { url, group }
    }
}

/// Where the bytes come from. Previews are plain mp3 and carry no key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Full { url: String, group: CandidateGroup },
    Preview { url: String },
}

impl Delivery {
    pub fn url(&self) -> &str {
        match self {
            Delivery::Full { url, .. } | Delivery::Preview { url } => url,
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, Delivery::Preview { .. })
    }
}

/// Existence check for a candidate url, without fetching the body.
pub trait Probe {
    fn exists(&self, url: &str) -> impl Future<Output = bool>;
}

pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Probe for HttpProbe {
    async fn exists(&self, url: &str) -> bool {
        match self.client.head(url).timeout(self.timeout).send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                debug!("Url not available (HTTP {}): {}...", response.status(), prefix(url, 80));
                false
            }
            Err(e) => {
                debug!("Url not accessible ({}): {}...", e, prefix(url, 80));
                false
            }
        }
    }
}

fn cdn_server(origin_hash: &str) -> Option<char> {
    origin_hash.chars().next()
}

/// Asks `song.getListData` for the track's media list and returns the
/// `full` href if there is one. Any failure here just means "no listed url".
pub async fn listed_media_url(session: &Session, meta: &AssetMetadata) -> Option<String> {
    let id = meta.id()?;
    let body = json!({ "sng_ids": [id] });
    let reply = match gateway::call(
        session.client(),
        session.gateway_url(),
        METHOD_LIST_DATA,
        session.api_token(),
        Some(&body),
        session.timeout(),
    )
    .await
    {
        Ok(reply) => reply,
        Err(e) => {
            debug!("Failed to get media list: {}", e);
            return None;
        }
    };

    if let Some(text) = reply.error_text() {
        debug!("Media api error: {}", text);
        return None;
    }

    full_href_from_list(&reply.results)
}

pub fn full_href_from_list(results: &Value) -> Option<String> {
    results
        .get("data")?
        .get(0)?
        .get("MEDIA")?
        .as_array()?
        .iter()
        .find(|media| media.get("TYPE").and_then(Value::as_str) == Some("full"))
        .and_then(|media| media.get("HREF"))
        .and_then(Value::as_str)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

/// Urls built from the track token on the `mobile/1` path. Which hash the
/// cdn expects in front of the token is unknown, so all three are tried.
pub fn token_fallback_candidates(meta: &AssetMetadata) -> Vec<Candidate> {
    let (Some(token), Some(origin), Some(id)) = (meta.delivery_token(), meta.origin_hash(), meta.id())
    else {
        debug!("No track token or origin hash in track details");
        return Vec::new();
    };
    let Some(server) = cdn_server(origin) else {
        return Vec::new();
    };
    let host = format!("https://e-cdns-proxy-{server}.dzcdn.net/mobile/1");

    let token_hash: String = token.chars().take(32).collect();
    [origin.to_string(), md5_hex(format!("{id}{token}")), token_hash]
        .into_iter()
        .map(|hash| Candidate::new(format!("{host}/{hash}?{token}"), CandidateGroup::TokenFallback))
        .collect()
}

/// The token-based group: the listed href alone when the api gave one,
/// otherwise the synthetic fallbacks.
pub fn token_candidates(listed: Option<&str>, meta: &AssetMetadata) -> Vec<Candidate> {
    match listed {
        Some(href) => vec![Candidate::new(href.to_string(), CandidateGroup::Listed)],
        None => token_fallback_candidates(meta),
    }
}

/// Pre-2024 urls for one quality tier: `md5(quality¤id¤version¤origin + secret)`
/// for every secret, each on five host patterns.
pub fn legacy_candidates(meta: &AssetMetadata, quality: Quality) -> Vec<Candidate> {
    let (Some(origin), Some(id)) = (meta.origin_hash(), meta.id()) else {
        return Vec::new();
    };
    let Some(c) = cdn_server(origin) else {
        return Vec::new();
    };
    let sep = URL_PART_SEPARATOR;
    let url_part = format!("{quality}{sep}{id}{sep}{}{sep}{origin}", meta.media_version());

    LEGACY_SECRETS
        .iter()
        .flat_map(|secret| {
            let hash = md5_hex(format!("{url_part}{secret}"));
            [
                format!("https://e-cdns-proxy-{c}.dzcdn.net/mobile/1/{hash}"),
                format!("https://e-cdn-proxy-{c}.dzcdn.net/mobile/1/{hash}"),
                format!("https://cdns-proxy-{c}.dzcdn.net/mobile/1/{hash}"),
                format!("https://cdn-proxy-{c}.dzcdn.net/mobile/1/{hash}"),
                format!("https://e-cdns-proxy-{c}.deezer.com/mobile/1/{hash}"),
            ]
        })
        .map(|url| Candidate::new(url, CandidateGroup::Legacy(quality)))
        .collect()
}

// groups are built on demand, so a hit in the token group never generates legacy urls
fn candidate_groups<'a>(
    listed: Option<&'a str>,
    meta: &'a AssetMetadata,
) -> impl Iterator<Item = Vec<Candidate>> + 'a {
    std::iter::once_with(move || token_candidates(listed, meta))
        .chain(Quality::ALL.into_iter().map(move |q| legacy_candidates(meta, q)))
}

/// Full probe order with duplicates removed.
pub fn plan(listed: Option<&str>, meta: &AssetMetadata) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidate_groups(listed, meta)
        .flatten()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

pub async fn resolve<P: Probe>(
    session: &Session,
    prober: &P,
    meta: &AssetMetadata,
) -> Result<Delivery, ResolutionError> {
    let listed = listed_media_url(session, meta).await;
    if let Some(href) = &listed {
        debug!("Got download url from api: {}...", prefix(href, 80));
    }
    resolve_with(prober, meta, listed.as_deref()).await
}

/// Probes candidates one at a time and stops at the first hit. Falls back to
/// the preview when nothing answers.
pub async fn resolve_with<P: Probe>(
    prober: &P,
    meta: &AssetMetadata,
    listed: Option<&str>,
) -> Result<Delivery, ResolutionError> {
    let mut seen = HashSet::new();
    let mut tried = 0usize;

    info!("Trying token-based url format...");
    for (i, group) in candidate_groups(listed, meta).enumerate() {
        if i == 1 {
            info!("Token-based urls failed, trying legacy format...");
        }
        for candidate in group {
            if !seen.insert(candidate.url.clone()) {
                continue;
            }
            tried += 1;
            if prober.exists(&candidate.url).await {
                match candidate.group {
                    CandidateGroup::Legacy(quality) => {
                        info!("Using legacy quality {}: {}...", quality, prefix(&candidate.url, 50))
                    }
                    _ => info!("Using token-based url: {}...", prefix(&candidate.url, 80)),
                }
                return Ok(Delivery::Full {
                    url: candidate.url,
                    group: candidate.group,
                });
            }
        }
    }

    match meta.media_href(MediaKind::Preview) {
        Some(url) => {
            warn!("Using preview url as fallback (30-second preview only)");
            Ok(Delivery::Preview { url: url.to_string() })
        }
        None => Err(ResolutionError::Exhausted { tried }),
    }
}
