use crate::filters::sanitize_search;
use crate::models::{BrowseOptions, SearchFilters, Station, ALL_GENRES};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://de1.api.radio-browser.info",
    "https://at1.api.radio-browser.info",
    "https://nl1.api.radio-browser.info",
    "https://fr1.api.radio-browser.info",
    "https://de2.api.radio-browser.info",
    "https://de3.api.radio-browser.info",
    "https://uk1.api.radio-browser.info",
    "https://uk2.api.radio-browser.info",
    "https://us1.api.radio-browser.info",
    "https://us2.api.radio-browser.info",
    "https://fi1.api.radio-browser.info",
    "https://pl1.api.radio-browser.info",
    "https://ru1.api.radio-browser.info",
    "https://ca1.api.radio-browser.info",
    "https://au1.api.radio-browser.info",
    "https://br1.api.radio-browser.info",
    "https://za1.api.radio-browser.info",
    "https://in1.api.radio-browser.info",
    "https://jp1.api.radio-browser.info",
    "https://sg1.api.radio-browser.info",
];

const MAX_BODY_BYTES: usize = 1_000_000;
const SEARCH_LIMIT: &str = "100";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported stream URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Server answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("HTTP response too large ({0} bytes)")]
    TooLarge(u64),

    #[error("Server returned no playable stations")]
    Empty,

    #[error("No directory mirrors configured")]
    NoMirrors,

    #[error("{action} failed on all {attempts} mirrors, last error: {last}")]
    AllMirrorsFailed {
        action: &'static str,
        attempts: usize,
        last: Box<Error>,
    },

    #[error("No stations found for {0}")]
    NoMatches(String),
}

#[derive(Debug, Clone)]
pub struct RadioBrowserClient {
    http: reqwest::Client,
    mirrors: Vec<String>,
    last_server: Option<String>,
}

impl RadioBrowserClient {
    pub fn new(mirrors: Vec<String>, user_agent: &str, last_server: Option<String>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).context("Invalid User-Agent header")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        let mirrors = mirrors
            .into_iter()
            .map(|m| m.trim().trim_end_matches('/').to_string())
            .filter(|m| !m.is_empty())
            .collect();

        Ok(Self {
            http,
            mirrors,
            last_server,
        })
    }

    pub fn last_server(&self) -> Option<&str> {
        self.last_server.as_deref()
    }

    pub fn set_last_server(&mut self, server: Option<String>) {
        self.last_server = server;
    }

    /// Configured mirrors with the last one that answered moved to the front.
    pub fn ordered_mirrors(&self) -> Vec<String> {
        let mut servers = self.mirrors.clone();
        if let Some(last) = self.last_server.as_deref() {
            if let Some(pos) = servers.iter().position(|s| s == last) {
                let s = servers.remove(pos);
                servers.insert(0, s);
            }
        }
        servers
    }

    pub async fn browse(&mut self, opts: &BrowseOptions) -> Result<Vec<Station>> {
        let mut pairs = vec![
            ("limit", opts.limit.to_string()),
            ("hidebroken", "true".to_string()),
        ];
        let optional = [
            ("language", opts.language.trim()),
            ("country", opts.country.trim()),
            ("codec", opts.codec.trim()),
        ];
        for (key, value) in optional {
            if !value.is_empty() {
                pairs.push((key, value.to_string()));
            }
        }
        let genre = opts.genre.trim();
        if !genre.is_empty() && genre != ALL_GENRES {
            pairs.push(("tag", genre.to_string()));
        }
        if opts.bitrate > 0 {
            pairs.push(("bitrate", opts.bitrate.to_string()));
        }

        let http = self.http.clone();
        self.with_mirrors("browse", move |base| {
            let http = http.clone();
            let pairs = pairs.clone();
            async move { fetch_stations(&http, &base, "/json/stations/search", &pairs).await }
        })
        .await
    }

    pub async fn top_voted(&mut self, count: u32) -> Result<Vec<Station>> {
        let http = self.http.clone();
        let path = format!("/json/stations/topvote/{count}");
        self.with_mirrors("top voted", move |base| {
            let http = http.clone();
            let path = path.clone();
            async move { fetch_stations(&http, &base, &path, &[]).await }
        })
        .await
    }

    pub async fn search_by_name(&mut self, name: &str) -> Result<Vec<Station>> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Ok(vec![]);
        }
        let pairs = vec![("name", name.clone()), ("limit", SEARCH_LIMIT.to_string())];
        self.playable_search("search", pairs)
            .await
            .map_err(|e| {
                warn!(query = %name, error = %e, "name search found nothing");
                Error::NoMatches(format!("\"{name}\""))
            })
    }

    pub async fn search_by_filters(&mut self, filters: &SearchFilters) -> Result<Vec<Station>> {
        let pairs = filters.query_pairs();
        self.playable_search("filter search", pairs)
            .await
            .map_err(|e| {
                warn!(error = %e, "filter search found nothing");
                Error::NoMatches("the given filters".to_string())
            })
    }

    /// A mirror answering with nothing playable counts as a failure, so the next one gets asked.
    async fn playable_search(
        &mut self,
        action: &'static str,
        pairs: Vec<(&'static str, String)>,
    ) -> Result<Vec<Station>> {
        let http = self.http.clone();
        self.with_mirrors(action, move |base| {
            let http = http.clone();
            let pairs = pairs.clone();
            async move {
                let raw = fetch_stations(&http, &base, "/json/stations/search", &pairs).await?;
                debug!(server = %base, raw = raw.len(), "search results");
                let playable = sanitize_search(raw);
                if playable.is_empty() {
                    return Err(Error::Empty);
                }
                Ok(playable)
            }
        })
        .await
    }

    async fn with_mirrors<F, Fut, T>(&mut self, action: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let servers = self.ordered_mirrors();
        if servers.is_empty() {
            return Err(Error::NoMirrors);
        }

        let mut last_err: Option<Error> = None;
        for server in &servers {
            debug!(server = %server, action, "trying mirror");
            match f(server.clone()).await {
                Ok(v) => {
                    info!(server = %server, action, "mirror answered");
                    self.last_server = Some(server.clone());
                    return Ok(v);
                }
                Err(e) => {
                    warn!(server = %server, action, error = %e, "mirror failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(Error::AllMirrorsFailed {
            action,
            attempts: servers.len(),
            last: Box::new(last_err.unwrap_or(Error::NoMirrors)),
        })
    }
}

async fn fetch_stations(
    http: &reqwest::Client,
    base: &str,
    path: &str,
    pairs: &[(&'static str, String)],
) -> Result<Vec<Station>> {
    let mut url = Url::parse(&format!("{base}{path}"))?;
    if !pairs.is_empty() {
        let mut q = url.query_pairs_mut();
        for (k, v) in pairs {
            q.append_pair(k, v);
        }
    }
    debug!(%url, "GET");
    let resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(Error::Status(resp.status()));
    }
    let bytes = read_limited(resp, MAX_BODY_BYTES).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn parse_stream_url(s: &str) -> Result<Url> {
    let url = Url::parse(s.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::UnsupportedScheme(other.to_string())),
    }
}

async fn read_limited(resp: reqwest::Response, limit: usize) -> Result<Vec<u8>> {
    if let Some(len) = resp.content_length() {
        if len as usize > limit {
            return Err(Error::TooLarge(len));
        }
    }

    let mut data: Vec<u8> = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if data.len().saturating_add(chunk.len()) > limit {
            return Err(Error::TooLarge(data.len().saturating_add(chunk.len()) as u64));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}
