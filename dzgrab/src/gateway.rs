use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const API_VERSION: &str = "1.0";
pub const METHOD_USER_DATA: &str = "deezer.getUserData";
pub const METHOD_PAGE_TRACK: &str = "deezer.pageTrack";
pub const METHOD_LIST_DATA: &str = "song.getListData";

/// Reply envelope of every gateway method: payload under `results`, failure
/// under `error`. The service sends `"error": []` when nothing went wrong.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayReply {
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub error: Value,
}

impl GatewayReply {
    pub fn error_text(&self) -> Option<String> {
        match &self.error {
            Value::Null => None,
            Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::Array(a) if a.is_empty() => None,
            Value::Object(o) if o.is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

/// Whether an error payload means the api token or the session behind it is
/// no longer valid. The service has no stable error codes, so this matches text.
pub fn is_token_error(text: &str) -> bool {
    text.contains("VALID_TOKEN_REQUIRED") || text.contains("Invalid CSRF token")
}

pub async fn call(
    client: &Client,
    gateway_url: &str,
    method: &str,
    api_token: &str,
    body: Option<&Value>,
    timeout: Duration,
) -> Result<GatewayReply, reqwest::Error> {
    let mut request = client
        .post(gateway_url)
        .query(&[
            ("method", method),
            ("input", "3"),
            ("api_version", API_VERSION),
            ("api_token", api_token),
        ])
        .header("Accept", "application/json, text/plain, */*")
        .timeout(timeout);
    if let Some(body) = body {
        request = request.json(body);
    }

    let reply: GatewayReply = request.send().await?.error_for_status()?.json().await?;
    debug!(
        "{} response: results={} error={}",
        method,
        result_keys(&reply.results),
        reply.error
    );
    Ok(reply)
}

// results carry the api token and account details, so only their shape is logged
fn result_keys(results: &Value) -> String {
    match results {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("{{{}}}", keys.join(", "))
        }
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Null => "null".to_string(),
        _ => "<scalar>".to_string(),
    }
}
