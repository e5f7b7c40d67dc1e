//! Paginated upstream fetch
//!
//! One call = one GET for one claimed page. Failures are surfaced as-is;
//! whether to retry is the caller's decision.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use super::offset::PageClaim;
use crate::error::{IngestError, Result};
use crate::model::RawRecord;

/// Header carrying the optional upstream application token
pub const APP_TOKEN_HEADER: &str = "X-App-Token";

/// Anything that can produce the records of one page
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the records in `claim`. An empty vector means the upstream has
    /// nothing at this offset.
    async fn fetch(&self, claim: PageClaim) -> Result<Vec<RawRecord>>;
}

/// Build the HTTP client shared by the page and snapshot fetchers
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("crashmap-ingest/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {}", e)))
}

/// [`PageSource`] backed by a Socrata-style `$offset`/`$limit` endpoint
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    endpoint: Url,
    app_token: Option<String>,
    borough: Option<String>,
}

impl HttpPageFetcher {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            app_token: None,
            borough: None,
        }
    }

    pub fn with_app_token(mut self, token: Option<String>) -> Self {
        self.app_token = token;
        self
    }

    /// Restrict pages to one borough (equality filter on the `borough` column)
    pub fn with_borough(mut self, borough: Option<String>) -> Self {
        self.borough = borough;
        self
    }

    pub fn page_url(&self, claim: PageClaim) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("$offset", &claim.offset.to_string())
                .append_pair("$limit", &claim.limit.to_string());
            if let Some(ref borough) = self.borough {
                query.append_pair("borough", borough);
            }
        }
        url
    }
}

#[async_trait]
impl PageSource for HttpPageFetcher {
    async fn fetch(&self, claim: PageClaim) -> Result<Vec<RawRecord>> {
        let url = self.page_url(claim);

        let mut request = self.client.get(url.clone());
        if let Some(ref token) = self.app_token {
            request = request.header(APP_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IngestError::network(url.as_str(), e))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| IngestError::network(url.as_str(), e))?;

        decode_page(url.as_str(), &body)
    }
}

/// Decode a page body; anything but a JSON array of objects is a decode error.
pub fn decode_page(url: &str, body: &[u8]) -> Result<Vec<RawRecord>> {
    serde_json::from_slice::<Vec<RawRecord>>(body).map_err(|e| IngestError::decode(url, e))
}
