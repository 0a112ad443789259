use crate::diagnostics::Outcome;
use crate::key::SymbolKey;
use crate::result::SearchResult;
use crate::store::{CacheValidityPolicy, SymbolStore};
use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fan-out over an ordered set of upstream stores.
///
/// All upstreams are queried concurrently; the first to succeed cancels the
/// rest. A fast authoritative miss never suppresses a slower hit on a
/// different upstream. The selected result's diagnostics are exposed
/// directly, without a union frame, so callers see which upstream actually
/// answered.
pub struct UnionSymbolStore {
    upstreams: Vec<Arc<dyn SymbolStore>>,
}

impl UnionSymbolStore {
    pub fn new(upstreams: Vec<Arc<dyn SymbolStore>>) -> Self {
        Self { upstreams }
    }

    pub fn upstreams(&self) -> &[Arc<dyn SymbolStore>] {
        &self.upstreams
    }
}

#[async_trait]
impl SymbolStore for UnionSymbolStore {
    fn name(&self) -> &str {
        "Union"
    }

    /// The answering upstream is unknown before dispatch.
    fn file_identity(&self, _key: &SymbolKey) -> Option<String> {
        None
    }

    async fn find(
        &self,
        key: &SymbolKey,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> Option<SearchResult> {
        let dispatch_cancel = cancel.child_token();
        let mut dispatched: FuturesUnordered<_> = self
            .upstreams
            .iter()
            .enumerate()
            .map(|(index, upstream)| {
                let dispatch_cancel = dispatch_cancel.clone();
                async move {
                    let result = upstream.find(key, &dispatch_cancel, policy).await;
                    (
                        index,
                        result.filter(|found| found.outcome() == Outcome::Success),
                    )
                }
            })
            .collect();

        // Cancel the losers as soon as one upstream succeeds, then drain
        // every dispatched query so none is left mid-flight.
        let mut successes = Vec::new();
        while let Some((index, result)) = dispatched.next().await {
            if let Some(result) = result {
                if successes.is_empty() {
                    dispatch_cancel.cancel();
                }
                successes.push((index, result));
            }
        }
        drop(dispatched);

        if successes.is_empty() {
            debug!("no upstream produced {key}");
            return None;
        }
        successes
            .into_iter()
            .min_by_key(|(index, _)| *index)
            .map(|(_, result)| result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::memory_stream;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use time::OffsetDateTime;

    struct ScriptedStore {
        name: String,
        delay: Duration,
        outcome: Outcome,
        saw_cancel: Arc<AtomicBool>,
    }

    impl ScriptedStore {
        fn new(name: &str, delay: Duration, outcome: Outcome) -> (Arc<Self>, Arc<AtomicBool>) {
            let saw_cancel = Arc::new(AtomicBool::new(false));
            let store = Arc::new(Self {
                name: name.to_string(),
                delay,
                outcome,
                saw_cancel: saw_cancel.clone(),
            });
            (store, saw_cancel)
        }
    }

    #[async_trait]
    impl SymbolStore for ScriptedStore {
        fn name(&self) -> &str {
            &self.name
        }

        fn file_identity(&self, key: &SymbolKey) -> Option<String> {
            Some(format!("{}/{key}", self.name))
        }

        async fn find(
            &self,
            key: &SymbolKey,
            cancel: &CancellationToken,
            _policy: &CacheValidityPolicy,
        ) -> Option<SearchResult> {
            tokio::select! {
                biased;
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Some(SearchResult::new(
                        Outcome::Unreachable,
                        &self.name,
                        None,
                        None,
                        OffsetDateTime::now_utc(),
                        None,
                        None,
                    ));
                }
            }
            Some(SearchResult::new(
                self.outcome,
                &self.name,
                self.file_identity(key),
                self.file_identity(key),
                OffsetDateTime::now_utc(),
                None,
                Some(memory_stream(vec![7])),
            ))
        }
    }

    fn key() -> SymbolKey {
        SymbolKey::new("a/b/c").unwrap()
    }

    #[tokio::test]
    async fn first_upstream_wins_when_all_succeed_instantly() {
        let (first, _) = ScriptedStore::new("first", Duration::ZERO, Outcome::Success);
        let (second, _) = ScriptedStore::new("second", Duration::ZERO, Outcome::Success);
        let union = UnionSymbolStore::new(vec![first as Arc<dyn SymbolStore>, second]);

        let result = union
            .find_with_default_policy(&key(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.diagnostics().store_name, "first");
    }

    #[tokio::test]
    async fn success_cancels_slower_upstreams() {
        let (slow, slow_cancelled) =
            ScriptedStore::new("slow", Duration::from_secs(30), Outcome::Success);
        let (fast, _) = ScriptedStore::new("fast", Duration::from_millis(5), Outcome::Success);
        let union = UnionSymbolStore::new(vec![slow as Arc<dyn SymbolStore>, fast]);

        let result = union
            .find_with_default_policy(&key(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.diagnostics().store_name, "fast");
        assert!(slow_cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fast_miss_does_not_suppress_slower_hit() {
        let (miss, miss_cancelled) =
            ScriptedStore::new("miss", Duration::ZERO, Outcome::NotFound);
        let (hit, _) = ScriptedStore::new("hit", Duration::from_millis(20), Outcome::Success);
        let union = UnionSymbolStore::new(vec![miss as Arc<dyn SymbolStore>, hit]);

        let result = union
            .find_with_default_policy(&key(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.diagnostics().store_name, "hit");
        assert!(!miss_cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn all_misses_yield_none() {
        let (a, _) = ScriptedStore::new("a", Duration::ZERO, Outcome::NotFound);
        let (b, _) = ScriptedStore::new("b", Duration::ZERO, Outcome::Unreachable);
        let union = UnionSymbolStore::new(vec![a as Arc<dyn SymbolStore>, b]);

        assert!(union
            .find_with_default_policy(&key(), &CancellationToken::new())
            .await
            .is_none());
        assert!(union.file_identity(&key()).is_none());
    }
}
