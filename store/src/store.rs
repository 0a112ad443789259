use crate::key::SymbolKey;
use crate::result::SearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_UNREACHABLE_VALIDITY: Duration = Duration::from_secs(5 * 60);

/// How long transient state observed during a query stays trustworthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheValidityPolicy {
    /// Suppress outbound requests to a server for this long after a
    /// transport failure.
    pub unreachable_status_validity: Duration,

    /// Reserved TTL for cached content. `None` serves stored results
    /// without ever re-querying upstream.
    pub file_result_validity: Option<Duration>,
}

impl Default for CacheValidityPolicy {
    fn default() -> Self {
        Self {
            unreachable_status_validity: DEFAULT_UNREACHABLE_VALIDITY,
            file_result_validity: None,
        }
    }
}

/// One layer in a store stack: an HTTP symbol server, a union of servers,
/// or a disk cache wrapping either.
#[async_trait]
pub trait SymbolStore: Send + Sync {
    /// Human-meaningful identifier: base URL, cache root path, or `Union`.
    fn name(&self) -> &str;

    /// Identity of the concrete file that would answer `key`, when it can
    /// be predicted without performing I/O. Fan-out stores return `None`
    /// because the answering upstream is not known before dispatch.
    fn file_identity(&self, key: &SymbolKey) -> Option<String>;

    /// Locates `key`.
    ///
    /// Failure is never reported as an error: transport and protocol
    /// problems are encoded in the returned result's outcome. `None` is
    /// the absence value of fan-out dispatch — a union with no successful
    /// upstream, a compound fallback with no hit. Leaf stores and caches
    /// always return `Some`.
    ///
    /// `cancel` is advisory and observed at every suspension point.
    async fn find(
        &self,
        key: &SymbolKey,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> Option<SearchResult>;

    /// [`find`](Self::find) with the default validity policy.
    async fn find_with_default_policy(
        &self,
        key: &SymbolKey,
        cancel: &CancellationToken,
    ) -> Option<SearchResult> {
        self.find(key, cancel, &CacheValidityPolicy::default()).await
    }
}
