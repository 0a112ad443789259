use crate::diagnostics::Outcome;
use crate::error::StoreError;
use crate::key::SymbolKey;
use crate::result::{SearchResult, StreamFactory, SymbolStream};
use crate::store::{CacheValidityPolicy, SymbolStore};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use std::io;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Hook issuing follow-up requests after an authoritative 404.
///
/// Returning `Some` propagates that result to the caller; returning `None`
/// lets the store report `NotFound`. The hook receives the store so it can
/// reuse its HTTP client and name.
pub type AdditionalRequests = Arc<
    dyn Fn(
            &HttpSymbolStore,
            &SymbolKey,
            &CancellationToken,
            OffsetDateTime,
        ) -> BoxFuture<'static, Option<SearchResult>>
        + Send
        + Sync,
>;

/// Client for one symbol server: a plain `GET` of `{base}/{key}`, with an
/// unreachable-backoff memory so a dead server is not hammered on every
/// lookup.
pub struct HttpSymbolStore {
    name: String,
    client: Client,
    last_unreachable: Mutex<Option<OffsetDateTime>>,
    additional_requests: Option<AdditionalRequests>,
}

impl HttpSymbolStore {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Self::with_additional_requests(base_url, None)
    }

    pub fn with_additional_requests(
        base_url: &str,
        additional_requests: Option<AdditionalRequests>,
    ) -> Result<Self, StoreError> {
        let name = base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&name)
            .map_err(|err| StoreError::InvalidUrl(format!("{base_url}: {err}")))?;
        let client = Client::builder().build()?;
        Ok(Self {
            name,
            client,
            last_unreachable: Mutex::new(None),
            additional_requests,
        })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    fn url_for(&self, key: &SymbolKey) -> String {
        format!("{}/{key}", self.name)
    }

    fn circuit_open(&self, now: OffsetDateTime, policy: &CacheValidityPolicy) -> bool {
        if let Ok(last) = self.last_unreachable.lock()
            && let Some(at) = *last
        {
            return now < at + policy.unreachable_status_validity;
        }
        false
    }

    fn record_unreachable(&self, at: OffsetDateTime) {
        if let Ok(mut last) = self.last_unreachable.lock() {
            *last = Some(at);
        }
    }

    fn unreachable(&self, key: &SymbolKey, url: String, query_time: OffsetDateTime) -> SearchResult {
        SearchResult::new(
            Outcome::Unreachable,
            &self.name,
            Some(self.url_for(key)),
            Some(url),
            query_time,
            None,
            None,
        )
    }
}

#[async_trait]
impl SymbolStore for HttpSymbolStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_identity(&self, key: &SymbolKey) -> Option<String> {
        Some(self.url_for(key))
    }

    async fn find(
        &self,
        key: &SymbolKey,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> Option<SearchResult> {
        let query_time = OffsetDateTime::now_utc();
        let url = self.url_for(key);
        if self.circuit_open(query_time, policy) {
            debug!("{} recently unreachable, skipping {url}", self.name);
            return Some(self.unreachable(key, url, query_time));
        }

        let request = self.client.get(&url).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("query for {key} cancelled before {url} answered");
                return Some(self.unreachable(key, url, query_time));
            }
            response = request => response,
        };

        match response {
            Ok(response) if response.status().is_success() => Some(SearchResult::new(
                Outcome::Success,
                &self.name,
                Some(self.url_for(key)),
                Some(url),
                query_time,
                None,
                Some(response_stream(response)),
            )),
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                if let Some(additional) = &self.additional_requests
                    && let Some(found) = additional.as_ref()(self, key, cancel, query_time).await
                {
                    return Some(found);
                }
                debug!("{url} answered 404");
                Some(SearchResult::new(
                    Outcome::NotFound,
                    &self.name,
                    Some(self.url_for(key)),
                    Some(url),
                    query_time,
                    None,
                    None,
                ))
            }
            Ok(response) => {
                warn!("{url} answered {}", response.status());
                self.record_unreachable(query_time);
                Some(self.unreachable(key, url, query_time))
            }
            Err(err) => {
                warn!("request to {url} failed: {err}");
                self.record_unreachable(query_time);
                Some(self.unreachable(key, url, query_time))
            }
        }
    }
}

/// Adapts a response body into a [`SymbolStream`].
pub(crate) fn body_stream(response: Response) -> SymbolStream {
    Box::pin(StreamReader::new(
        response.bytes_stream().map_err(io::Error::other),
    ))
}

/// Deferred reader over a response body.
pub(crate) fn response_stream(response: Response) -> StreamFactory {
    Box::new(move || async move { Ok(body_stream(response)) }.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn trailing_slash_is_trimmed_from_name() {
        let store = HttpSymbolStore::new("http://symbols.example.com/store/").unwrap();
        assert_eq!(store.name(), "http://symbols.example.com/store");
    }

    #[test]
    fn identity_joins_name_and_key() {
        let store = HttpSymbolStore::new("http://symbols.example.com").unwrap();
        let key = SymbolKey::new("a/b/c").unwrap();
        assert_eq!(
            store.file_identity(&key).as_deref(),
            Some("http://symbols.example.com/a/b/c")
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(HttpSymbolStore::new("not a url").is_err());
    }

    #[test]
    fn circuit_opens_only_within_the_validity_window() {
        let store = HttpSymbolStore::new("http://symbols.example.com").unwrap();
        let policy = CacheValidityPolicy::default();
        let now = OffsetDateTime::now_utc();
        assert!(!store.circuit_open(now, &policy));

        store.record_unreachable(now);
        assert!(store.circuit_open(now + std::time::Duration::from_secs(60), &policy));
        assert!(!store.circuit_open(now + std::time::Duration::from_secs(600), &policy));
    }
}
