//! NASA Earthdata access: login, CMR granule search and download.

use crate::bbox::BoundingBox;
use crate::config::EarthdataConfig;
use crate::granule::GranuleRecord;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable holding a ready-made bearer token.
pub const TOKEN_ENV: &str = "EARTHDATA_TOKEN";
pub const USERNAME_ENV: &str = "EARTHDATA_USERNAME";
pub const PASSWORD_ENV: &str = "EARTHDATA_PASSWORD";

const SEARCH_AFTER_HEADER: &str = "CMR-Search-After";
const DATA_LINK_TYPE: &str = "GET DATA";

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// No usable credentials, or the login endpoint refused them
    #[error("Earthdata authentication failed: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("No granules of {short_name} matched the search")]
    EmptySearch { short_name: String },

    #[error("Unexpected CMR response: {0}")]
    Response(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Search parameters for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct GranuleQuery {
    pub short_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Geographic (lon/lat) bounding box
    pub bbox: BoundingBox,
}

impl GranuleQuery {
    fn params(&self, page_size: usize) -> Vec<(&'static str, String)> {
        vec![
            ("short_name", self.short_name.clone()),
            (
                "temporal[]",
                format!(
                    "{}T00:00:00Z,{}T23:59:59Z",
                    self.start.format("%Y-%m-%d"),
                    self.end.format("%Y-%m-%d")
                ),
            ),
            ("bounding_box", self.bbox.to_cmr_param()),
            ("page_size", page_size.to_string()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authenticated session against Earthdata Login.
#[derive(Debug, Clone)]
pub struct EarthdataClient {
    client: Client,
    token: String,
    config: EarthdataConfig,
}

impl EarthdataClient {
    /// Log in using `EARTHDATA_TOKEN`, or exchange `EARTHDATA_USERNAME` and
    /// `EARTHDATA_PASSWORD` for a token.
    pub async fn login(config: &EarthdataConfig) -> Result<Self> {
        let client = Client::new();
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                info!("Using Earthdata token from {}", TOKEN_ENV);
                return Ok(Self::with_token(client, token.trim().to_string(), config));
            }
        }
        let username = std::env::var(USERNAME_ENV).map_err(|_| {
            ArchiveError::Auth(format!("set {} or {} and {}", TOKEN_ENV, USERNAME_ENV, PASSWORD_ENV))
        })?;
        let password = std::env::var(PASSWORD_ENV)
            .map_err(|_| ArchiveError::Auth(format!("{} is not set", PASSWORD_ENV)))?;

        info!("Requesting Earthdata token for {}", username);
        let response = client
            .post(&config.token_url)
            .basic_auth(&username, Some(&password))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ArchiveError::Auth(format!("login rejected ({})", status)));
        }
        if !status.is_success() {
            return Err(ArchiveError::Status {
                url: config.token_url.clone(),
                status,
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(Self::with_token(client, token.access_token, config))
    }

    pub fn with_token(client: Client, token: String, config: &EarthdataConfig) -> Self {
        Self {
            client,
            token,
            config: config.clone(),
        }
    }

    fn bearer(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ArchiveError::Auth("token contains invalid header characters".to_string()))
    }

    /// All granules matching `query`, following CMR search-after paging.
    pub async fn search(&self, query: &GranuleQuery) -> Result<Vec<GranuleRecord>> {
        let params = query.params(self.config.page_size);
        let mut records = Vec::new();
        let mut search_after: Option<HeaderValue> = None;
        loop {
            let mut request = self.client.get(&self.config.search_url).query(&params);
            if let Some(cursor) = &search_after {
                request = request.header(SEARCH_AFTER_HEADER, cursor.clone());
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ArchiveError::Status {
                    url: self.config.search_url.clone(),
                    status,
                });
            }
            let next = response.headers().get(SEARCH_AFTER_HEADER).cloned();
            let body: Value = response.json().await?;
            let page = parse_umm_page(&body)?;
            debug!("CMR page returned {} granules", page.len());
            let page_len = page.len();
            records.extend(page);

            match next {
                Some(cursor) if page_len > 0 => search_after = Some(cursor),
                _ => break,
            }
        }
        info!("CMR search for {} found {} granules", query.short_name, records.len());
        if records.is_empty() {
            return Err(ArchiveError::EmptySearch {
                short_name: query.short_name.clone(),
            });
        }
        Ok(records)
    }

    /// Download every data file of `records` into `dir`, skipping files that
    /// already exist. Returns the local paths in record order.
    pub async fn download(&self, records: &[GranuleRecord], dir: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;
        let mut paths = Vec::new();
        for record in records {
            for url in &record.data_urls {
                let Some(file_name) = url.rsplit('/').next().filter(|n| !n.is_empty()) else {
                    return Err(ArchiveError::Response(format!("no file name in {}", url)));
                };
                let path = dir.join(file_name);
                if tokio::fs::try_exists(&path).await? {
                    debug!("{} already present, skipping", path.display());
                    paths.push(path);
                    continue;
                }
                info!("Downloading {}", url);
                let response = self
                    .client
                    .get(url)
                    .header(AUTHORIZATION, self.bearer()?)
                    .send()
                    .await?;
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Err(ArchiveError::Auth(format!("download of {} refused ({})", url, status)));
                }
                if !status.is_success() {
                    return Err(ArchiveError::Status {
                        url: url.clone(),
                        status,
                    });
                }
                let bytes = response.bytes().await?;
                // Partial transfers never land under the final name.
                let partial = path.with_extension("part");
                tokio::fs::write(&partial, &bytes).await?;
                tokio::fs::rename(&partial, &path).await?;
                paths.push(path);
            }
        }
        info!("{} granule files available in {}", paths.len(), dir.display());
        Ok(paths)
    }
}

/// Extract granule records from one `granules.umm_json` page.
pub fn parse_umm_page(body: &Value) -> Result<Vec<GranuleRecord>> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ArchiveError::Response("missing items array".to_string()))?;
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let native_id = item
            .pointer("/meta/native-id")
            .and_then(Value::as_str)
            .ok_or_else(|| ArchiveError::Response("granule without meta.native-id".to_string()))?
            .to_string();
        let data_urls = item
            .pointer("/umm/RelatedUrls")
            .and_then(Value::as_array)
            .map(|urls| {
                urls.iter()
                    .filter(|u| u.get("Type").and_then(Value::as_str) == Some(DATA_LINK_TYPE))
                    .filter_map(|u| u.get("URL").and_then(Value::as_str))
                    .filter(|u| u.starts_with("https://"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        records.push(GranuleRecord {
            native_id,
            data_urls,
        });
    }
    Ok(records)
}
