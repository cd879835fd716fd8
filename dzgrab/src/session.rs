use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use tracing::{debug, error, info};

use crate::config::{Config, Credential};
use crate::error::AuthenticationError;
use crate::gateway::{self, METHOD_USER_DATA};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static RE_API_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""api_token":"([^"]+)""#).expect("api token pattern"));

/// Logged-in context for one run: the cookie-carrying client plus the
/// `checkForm` token every later gateway call needs.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    api_token: String,
    username: String,
    gateway_url: String,
    timeout: Duration,
}

impl Session {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn build_client(config: &Config, credential: &Credential) -> Result<Client, AuthenticationError> {
    let site = Url::parse(config.site_url())
        .map_err(|e| AuthenticationError::Unexpected(format!("invalid site url: {e}")))?;

    let jar = Arc::new(Jar::default());
    let cookie = match site.host_str() {
        Some(host) if host.ends_with("deezer.com") => {
            format!("arl={}; Domain=.deezer.com; Path=/", credential.as_str())
        }
        _ => format!("arl={}; Path=/", credential.as_str()),
    };
    jar.add_cookie_str(&cookie, &site);

    Ok(Client::builder()
        .cookie_provider(jar)
        .user_agent(USER_AGENT)
        .connect_timeout(config.request_timeout())
        .build()?)
}

/// Pulls the embedded `api_token` out of the landing page, looking in the
/// script tags first and the raw body after that.
pub fn scrape_api_token(html: &str) -> Option<String> {
    let capture = |text: &str| {
        RE_API_TOKEN
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    let document = Html::parse_document(html);
    let script_selector = Selector::parse("script").ok()?;
    document
        .select(&script_selector)
        .find_map(|script| capture(&script.inner_html()))
        .or_else(|| capture(html))
}

pub async fn authenticate(
    config: &Config,
    credential: &Credential,
) -> Result<Session, AuthenticationError> {
    let client = build_client(config, credential)?;
    let gateway_url = config.gateway_url();
    let timeout = config.request_timeout();

    let landing = client
        .get(config.site_url())
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.5")
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    // an empty token still works for getUserData when the arl cookie is good
    let initial_token = scrape_api_token(&landing).unwrap_or_default();
    if initial_token.is_empty() {
        debug!("No initial api token found in page");
    } else {
        debug!("Found initial api token: {}...", prefix(&initial_token, 20));
    }

    let reply = gateway::call(&client, &gateway_url, METHOD_USER_DATA, &initial_token, None, timeout).await?;

    if let Some(text) = reply.error_text() {
        error!("Failed to get api token: {}", text);
        if gateway::is_token_error(&text) {
            error!("Please get a fresh arl token from your browser");
            return Err(AuthenticationError::InvalidCredential(text));
        }
        return Err(AuthenticationError::Unexpected(text));
    }

    let api_token = reply
        .results
        .get("checkForm")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .ok_or(AuthenticationError::MissingApiToken)?
        .to_string();

    let user = reply.results.get("USER");
    let username = ["BLOG_NAME", "USERNAME"]
        .iter()
        .find_map(|field| {
            user.and_then(|u| u.get(field))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("Unknown")
        .to_string();
    info!("Successfully authenticated as user: {}", username);

    Ok(Session {
        client,
        api_token,
        username,
        gateway_url,
        timeout,
    })
}

pub(crate) fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
