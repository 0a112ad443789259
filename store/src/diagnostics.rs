use time::OffsetDateTime;

/// Terminal classification of one store's answer for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Content is available; the result carries a stream producer.
    Success,
    /// Authoritative absence (HTTP 404, or a cache miss whose upstream had
    /// nothing).
    NotFound,
    /// Transport failure, non-404 HTTP error, open circuit, or cancellation
    /// observed at the transport layer.
    Unreachable,
}

/// Per-query provenance record.
///
/// `upstream` links to the record of the next store inward, forming a chain
/// from the store the caller talked to down to the origin of the bytes.
/// Records are built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub outcome: Outcome,
    /// URL or filesystem path this store consulted, when it got that far.
    pub file_path: Option<String>,
    pub query_time: OffsetDateTime,
    pub store_name: String,
    pub upstream: Option<Box<Diagnostics>>,
}

impl Diagnostics {
    pub fn new(
        outcome: Outcome,
        store_name: impl Into<String>,
        file_path: Option<String>,
        query_time: OffsetDateTime,
        upstream: Option<Diagnostics>,
    ) -> Self {
        Self {
            outcome,
            file_path,
            query_time,
            store_name: store_name.into(),
            upstream: upstream.map(Box::new),
        }
    }

    /// Iterates the chain from this (outermost) record inward.
    pub fn chain(&self) -> impl Iterator<Item = &Diagnostics> {
        std::iter::successors(Some(self), |record| record.upstream.as_deref())
    }

    /// Number of records in the chain, including this one.
    pub fn depth(&self) -> usize {
        self.chain().count()
    }

    /// The innermost record, where the bytes originally came from.
    pub fn origin(&self) -> &Diagnostics {
        self.chain().last().unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, upstream: Option<Diagnostics>) -> Diagnostics {
        Diagnostics::new(
            Outcome::Success,
            name,
            Some(format!("{name}/a/b/c")),
            OffsetDateTime::now_utc(),
            upstream,
        )
    }

    #[test]
    fn chain_walks_outermost_to_origin() {
        let chain = record("cache", Some(record("union-member", Some(record("origin", None)))));
        let names: Vec<_> = chain.chain().map(|r| r.store_name.as_str()).collect();
        assert_eq!(names, vec!["cache", "union-member", "origin"]);
        assert_eq!(chain.depth(), 3);
        assert_eq!(chain.origin().store_name, "origin");
    }

    #[test]
    fn single_record_is_its_own_origin() {
        let only = record("http", None);
        assert_eq!(only.depth(), 1);
        assert_eq!(only.origin().store_name, "http");
    }
}
