//! Resolver service reached over HTTP.
//!
//! The service answers `GET {uri}/{z}/{x}/{y}` with the tile URL in the
//! first non-empty line of a `text/plain` body. `404` or `204` means the
//! service has no URL for the tile.

use std::time::Duration;

use reqwest::StatusCode;
use tokio::runtime::Handle;
use url::Url;

use super::{query_uri, ResolverConnection, ResolverProtocol};
use crate::error::ResolverError;
use crate::net::DEFAULT_REQUEST_TIMEOUT;
use crate::tile::TileCoordinate;

/// Protocol for `http://` and `https://` resolver URIs.
///
/// Queries block the calling thread on the given runtime, so they must not
/// be issued from inside an async task. Every query is abandoned after the
/// query timeout, or earlier when the caller passes a smaller budget.
#[derive(Clone)]
pub struct HttpResolverProtocol {
    client: reqwest::Client,
    runtime: Handle,
    query_timeout: Duration,
}

impl HttpResolverProtocol {
    pub fn new(client: reqwest::Client, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            query_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Upper bound for a single query.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

impl ResolverProtocol for HttpResolverProtocol {
    fn connect(&self, uri: &str) -> Result<Box<dyn ResolverConnection>, ResolverError> {
        let parsed = Url::parse(uri).map_err(|e| ResolverError::Open {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ResolverError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        Ok(Box::new(HttpResolverConnection {
            base: uri.trim_end_matches('/').to_string(),
            client: self.client.clone(),
            runtime: self.runtime.clone(),
            query_timeout: self.query_timeout,
        }))
    }
}

struct HttpResolverConnection {
    base: String,
    client: reqwest::Client,
    runtime: Handle,
    query_timeout: Duration,
}

impl ResolverConnection for HttpResolverConnection {
    fn query(&mut self, coordinate: &TileCoordinate) -> Result<Option<String>, ResolverError> {
        self.query_within(coordinate, self.query_timeout)
    }

    fn query_within(
        &mut self,
        coordinate: &TileCoordinate,
        timeout: Duration,
    ) -> Result<Option<String>, ResolverError> {
        let url = query_uri(&self.base, coordinate);
        let client = self.client.clone();
        let timeout = timeout.min(self.query_timeout);

        self.runtime.block_on(async move {
            let lookup = lookup(client, &url);
            match tokio::time::timeout(timeout, lookup).await {
                Ok(result) => result,
                Err(_) => Err(ResolverError::Query(format!(
                    "{}: timed out after {} ms",
                    url,
                    timeout.as_millis()
                ))),
            }
        })
    }
}

async fn lookup(client: reqwest::Client, url: &str) -> Result<Option<String>, ResolverError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ResolverError::Query(format!("{}: {}", url, e)))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ResolverError::Query(format!("HTTP {} from {}", status.as_u16(), url)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ResolverError::Query(format!("{}: {}", url, e)))?;

    Ok(first_line(&body))
}

fn first_line(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}
