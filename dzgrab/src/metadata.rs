use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};
use tracing::{debug, error};

use crate::error::MetadataError;
use crate::gateway::{self, METHOD_PAGE_TRACK};
use crate::session::Session;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Full,
    Preview,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaEntry {
    #[serde(rename = "TYPE", default)]
    pub kind: MediaKind,
    #[serde(rename = "HREF", default)]
    pub href: Option<String>,
}

/// Track record from `results.DATA` of `deezer.pageTrack`. Every field is
/// optional on the wire; the accessors below decide the fallbacks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetMetadata {
    #[serde(rename = "SNG_ID", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(rename = "SNG_TITLE", default)]
    pub title: Option<String>,
    #[serde(rename = "ART_NAME", default)]
    pub artist: Option<String>,
    #[serde(rename = "MD5_ORIGIN", default)]
    pub origin_hash: Option<String>,
    #[serde(rename = "MEDIA_VERSION", default, deserialize_with = "lenient_string")]
    pub media_version: Option<String>,
    #[serde(rename = "TRACK_TOKEN", default)]
    pub delivery_token: Option<String>,
    #[serde(rename = "RIGHTS", default)]
    pub rights: Value,
    #[serde(rename = "MEDIA", default)]
    pub media: Vec<MediaEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetMetadata {
    pub fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    pub fn origin_hash(&self) -> Option<&str> {
        non_empty(&self.origin_hash)
    }

    pub fn delivery_token(&self) -> Option<&str> {
        non_empty(&self.delivery_token)
    }

    pub fn title(&self) -> &str {
        non_empty(&self.title).unwrap_or(UNKNOWN_TITLE)
    }

    pub fn artist(&self) -> &str {
        non_empty(&self.artist).unwrap_or(UNKNOWN_ARTIST)
    }

    pub fn media_version(&self) -> &str {
        non_empty(&self.media_version).unwrap_or("1")
    }

    /// Only an explicit `false` blocks the download.
    pub fn streamable(&self) -> bool {
        self.rights
            .get("STREAM_ADS_AVAILABLE")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn media_href(&self, kind: MediaKind) -> Option<&str> {
        self.media
            .iter()
            .filter(|m| m.kind == kind)
            .find_map(|m| non_empty(&m.href))
    }

    pub fn filesizes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.extra
            .iter()
            .filter(|(k, _)| k.starts_with("FILESIZE_"))
            .map(|(k, v)| (k.as_str(), v))
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

// ids and versions come back as numbers or strings depending on the endpoint
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub fn parse_track_data(results: &Value) -> Result<AssetMetadata, MetadataError> {
    let data = results
        .get("DATA")
        .filter(|d| d.is_object())
        .ok_or_else(|| MetadataError::Malformed("no track data returned".to_string()))?;
    serde_json::from_value(data.clone()).map_err(|e| MetadataError::Malformed(e.to_string()))
}

pub async fn fetch_metadata(session: &Session, track_id: &str) -> Result<AssetMetadata, MetadataError> {
    let body = json!({ "sng_id": track_id });
    let reply = gateway::call(
        session.client(),
        session.gateway_url(),
        METHOD_PAGE_TRACK,
        session.api_token(),
        Some(&body),
        session.timeout(),
    )
    .await
    .map_err(|e| {
        if e.is_decode() {
            MetadataError::Malformed(e.to_string())
        } else {
            MetadataError::Transport(e)
        }
    })?;

    if let Some(text) = reply.error_text() {
        error!("Api error: {}", text);
        if gateway::is_token_error(&text) {
            error!("Api token expired, this usually means the arl token is invalid");
            return Err(MetadataError::TokenExpired(text));
        }
        return Err(MetadataError::NotFound(text));
    }

    let metadata = parse_track_data(&reply.results)?;
    debug!(
        "Available file sizes: {:?}",
        metadata.filesizes().collect::<Vec<_>>()
    );
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "DATA": {
                "SNG_ID": 3135556,
                "SNG_TITLE": "Harder, Better, Faster, Stronger",
                "ART_NAME": "Daft Punk",
                "MD5_ORIGIN": "abc123def4567890abc123def4567890",
                "MEDIA_VERSION": "8",
                "TRACK_TOKEN": "AAAAtokenBBBB",
                "RIGHTS": { "STREAM_ADS_AVAILABLE": true },
                "FILESIZE_MP3_128": "3665302",
                "MEDIA": [
                    { "TYPE": "preview", "HREF": "https://cdns-preview-d.dzcdn.net/stream/x.mp3" },
                    { "TYPE": "video" }
                ]
            }
        })
    }

    #[test]
    fn parses_numeric_id_and_media() {
        let meta = parse_track_data(&sample()).unwrap();
        assert_eq!(meta.id(), Some("3135556"));
        assert_eq!(meta.artist(), "Daft Punk");
        assert_eq!(meta.media_version(), "8");
        assert!(meta.streamable());
        assert_eq!(
            meta.media_href(MediaKind::Preview),
            Some("https://cdns-preview-d.dzcdn.net/stream/x.mp3")
        );
        assert_eq!(meta.media_href(MediaKind::Full), None);
        assert_eq!(meta.filesizes().count(), 1);
    }

    #[test]
    fn defaults_apply_to_missing_fields() {
        let meta = parse_track_data(&json!({ "DATA": { "SNG_ID": "42", "RIGHTS": [] } })).unwrap();
        assert_eq!(meta.title(), UNKNOWN_TITLE);
        assert_eq!(meta.artist(), UNKNOWN_ARTIST);
        assert_eq!(meta.media_version(), "1");
        assert_eq!(meta.origin_hash(), None);
        assert!(meta.streamable());
    }

    #[test]
    fn explicit_false_right_blocks() {
        let meta = parse_track_data(&json!({
            "DATA": { "SNG_ID": "42", "RIGHTS": { "STREAM_ADS_AVAILABLE": false } }
        }))
        .unwrap();
        assert!(!meta.streamable());
    }

    #[test]
    fn missing_data_is_malformed() {
        assert!(matches!(
            parse_track_data(&json!({})),
            Err(MetadataError::Malformed(_))
        ));
        assert!(matches!(
            parse_track_data(&json!({ "DATA": [] })),
            Err(MetadataError::Malformed(_))
        ));
    }
}
