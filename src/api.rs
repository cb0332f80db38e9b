// API client module: a small blocking HTTP client that talks to the shop's
// web API the way the browser front-end does. It owns the two
// authentication cookies and refreshes them from every response.

use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{Cart, CartItem, SearchResponse};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub const BASE_URL: &str = "https://www.mathem.se/tienda-web-api/v1";
pub const WEB_BASE_URL: &str = "https://www.mathem.se";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";

const SESSION_COOKIE: &str = "sessionid";
const CSRF_COOKIE: &str = "csrftoken";

/// Where and how long to talk to the service. Fixed once a client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// JSON API root, e.g. `https://www.mathem.se/tienda-web-api/v1`.
    pub base_url: String,
    /// Human-facing site root, used for the login page and referers.
    pub web_base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.into(),
            web_base_url: WEB_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `MATHEMCLI_API_URL`, `MATHEMCLI_WEB_URL` and
    /// `MATHEMCLI_TIMEOUT_SECS` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("MATHEMCLI_API_URL") {
            config.base_url = url;
        }
        if let Ok(url) = std::env::var("MATHEMCLI_WEB_URL") {
            config.web_base_url = url;
        }
        if let Ok(secs) = std::env::var("MATHEMCLI_TIMEOUT_SECS") {
            match parse_timeout(&secs) {
                Some(timeout) => config.timeout = timeout,
                None => tracing::warn!(value = %secs, "ignoring invalid MATHEMCLI_TIMEOUT_SECS"),
            }
        }
        config
    }
}

/// Whole seconds, at least one. A zero timeout would fail every request.
fn parse_timeout(secs: &str) -> Option<Duration> {
    match secs.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}

/// Headers Chrome sends on same-origin XHR calls. The service may turn away
/// requests that lack them.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,sv;q=0.8"),
    );
    let fixed = [
        (
            "sec-ch-ua",
            r#""Not(A:Brand";v="8", "Chromium";v="144", "Google Chrome";v="144""#,
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Linux""#),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
    ];
    for (name, value) in fixed {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct AddItemsRequest<'a> {
    items: &'a [CartItem],
}

/// Blocking client holding the HTTP connection pool, the endpoint roots and
/// the current session id / CSRF token pair. Not meant to be shared between
/// threads; one request is in flight at a time.
pub struct ApiClient {
    client: Client,
    base_url: String,
    web_base_url: String,
    session_id: String,
    csrf_token: String,
}

impl ApiClient {
    /// Client with no credentials yet; call [`ApiClient::login`] next.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .default_headers(browser_headers())
            .timeout(config.timeout)
            .build()?;
        Ok(ApiClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            web_base_url: config.web_base_url.trim_end_matches('/').to_string(),
            session_id: String::new(),
            csrf_token: String::new(),
        })
    }

    /// Client resuming a session obtained by an earlier login.
    pub fn with_session(config: ClientConfig, session_id: &str, csrf_token: &str) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.session_id = session_id.to_string();
        client.csrf_token = csrf_token.to_string();
        Ok(client)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Snapshot of the current tokens, ready to persist.
    pub fn to_session(&self, email: &str) -> Session {
        Session {
            session_id: self.session_id.clone(),
            csrf_token: self.csrf_token.clone(),
            email: email.to_string(),
        }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn web_url(&self, page: &str) -> String {
        format!("{}{}", self.web_base_url, page)
    }

    fn cookie_header(&self) -> Option<String> {
        let pairs: Vec<String> = [
            (SESSION_COOKIE, &self.session_id),
            (CSRF_COOKIE, &self.csrf_token),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Pick up rotated tokens from the response's `Set-Cookie` headers. This
    /// is the only place the held tokens change after construction.
    fn absorb_cookies(&mut self, resp: &Response) {
        for cookie in resp.cookies() {
            let slot = match cookie.name() {
                SESSION_COOKIE => &mut self.session_id,
                CSRF_COOKIE => &mut self.csrf_token,
                _ => continue,
            };
            if *slot != cookie.value() {
                tracing::debug!(cookie = cookie.name(), "token updated from response");
                *slot = cookie.value().to_string();
            }
        }
    }

    /// Attach referer and auth cookies, send, and absorb returned cookies.
    fn execute(&mut self, req: RequestBuilder, referer: &str) -> Result<Response> {
        let mut req = req.header(header::REFERER, referer);
        if let Some(cookies) = self.cookie_header() {
            req = req.header(header::COOKIE, cookies);
        }
        let request = req.build()?;
        tracing::debug!(method = %request.method(), url = %request.url(), "sending request");

        let resp = self.client.execute(request)?;
        tracing::debug!(status = resp.status().as_u16(), "received response");
        self.absorb_cookies(&resp);
        Ok(resp)
    }

    /// Visit the login page so the server hands out a CSRF token. The API
    /// refuses logins without one.
    fn init_session(&mut self) -> Result<()> {
        let req = self.client.get(self.web_url("/se/user/login/"));
        let referer = self.web_url("/se/");
        let resp = self.execute(req, &referer)?;
        if !resp.status().is_success() {
            tracing::warn!(status = resp.status().as_u16(), "login page returned an error status");
        }
        Ok(())
    }

    /// Log in with email and password. On success the client holds a fresh
    /// session id and CSRF token.
    pub fn login(&mut self, email: &str, password: &str) -> Result<()> {
        self.session_id.clear();
        self.csrf_token.clear();
        self.init_session()?;

        let payload = LoginRequest {
            username: email,
            password,
        };
        let req = self.client.post(self.api_url("/user/login/")).json(&payload);
        let referer = self.web_url("/se/user/login/");
        let resp = self.execute(req, &referer)?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text()?;
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        // A 200 alone does not prove the credentials were accepted.
        if self.session_id.is_empty() {
            return Err(Error::NoSessionCookie);
        }
        tracing::info!(email, "logged in");
        Ok(())
    }

    /// Search the product catalog. `page` is passed through as-is.
    pub fn search(&mut self, query: &str, page: u32) -> Result<SearchResponse> {
        let req = self
            .client
            .get(self.api_url("/search/mixed/"))
            .query(&[("q", query), ("type", "product")])
            .query(&[("page", page)]);
        let referer = self.web_url("/se/");
        decode(self.execute(req, &referer)?)
    }

    /// Current cart, grouped by recipe.
    pub fn get_cart(&mut self) -> Result<Cart> {
        let req = self
            .client
            .get(self.api_url("/cart/"))
            .query(&[("group_by", "recipes")]);
        let referer = self.web_url("/se/");
        decode(self.execute(req, &referer)?)
    }

    /// Add a batch of items. Returns the whole updated cart.
    pub fn add_to_cart(&mut self, items: &[CartItem]) -> Result<Cart> {
        let req = self
            .client
            .post(self.api_url("/cart/items/"))
            .json(&AddItemsRequest { items });
        let referer = self.web_url("/se/");
        decode(self.execute(req, &referer)?)
    }

    /// Empty the cart. Returns the resulting (empty) cart.
    pub fn clear_cart(&mut self) -> Result<Cart> {
        let req = self.client.post(self.api_url("/cart/clear/"));
        let referer = self.web_url("/se/cart/");
        decode(self.execute(req, &referer)?)
    }
}

/// Buffer the body, reject non-2xx statuses with the raw body, then decode.
fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(Error::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_skips_empty_tokens() {
        let client = ApiClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.cookie_header(), None);

        let client = ApiClient::with_session(ClientConfig::default(), "", "C1").unwrap();
        assert_eq!(client.cookie_header().as_deref(), Some("csrftoken=C1"));

        let client = ApiClient::with_session(ClientConfig::default(), "S1", "C1").unwrap();
        assert_eq!(
            client.cookie_header().as_deref(),
            Some("sessionid=S1; csrftoken=C1")
        );
    }

    #[test]
    fn urls_ignore_trailing_slash_in_config() {
        let config = ClientConfig {
            base_url: "http://localhost:1/api/".into(),
            web_base_url: "http://localhost:1/".into(),
            timeout: Duration::from_secs(1),
        };
        let client = ApiClient::new(config).unwrap();
        assert_eq!(client.api_url("/cart/"), "http://localhost:1/api/cart/");
        assert_eq!(client.web_url("/se/"), "http://localhost:1/se/");
    }

    #[test]
    fn timeout_must_be_positive_whole_seconds() {
        assert_eq!(parse_timeout("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_timeout(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_timeout("0"), None);
        assert_eq!(parse_timeout("-1"), None);
        assert_eq!(parse_timeout("soon"), None);
    }

    #[test]
    fn to_session_copies_tokens() {
        let client = ApiClient::with_session(ClientConfig::default(), "S1", "C1").unwrap();
        let session = client.to_session("a@b.com");
        assert_eq!(session.session_id, "S1");
        assert_eq!(session.csrf_token, "C1");
        assert_eq!(session.email, "a@b.com");
    }

    #[test]
    fn browser_headers_identify_as_chrome() {
        let headers = browser_headers();
        assert!(headers[header::USER_AGENT]
            .to_str()
            .unwrap()
            .contains("Chrome/144"));
        assert_eq!(headers["sec-fetch-site"], "same-origin");
        assert_eq!(headers["sec-ch-ua-mobile"], "?0");
    }
}
