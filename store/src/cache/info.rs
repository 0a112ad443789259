use crate::diagnostics::{Diagnostics, Outcome};
use crate::error::StoreError;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const IDENTITY_PREFIX: &str = "File Identity:";
const STORE_PREFIX: &str = "Store:";
const PATH_PREFIX: &str = "File Path:";
const TIME_PREFIX: &str = "Last Query Time:";

/// One recorded upstream step of a cached acquisition. Only successful
/// steps are ever recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamQuery {
    pub store_name: String,
    pub file_path: String,
    pub last_query_time: OffsetDateTime,
}

/// The persisted sidecar record: which concrete file answered a key, and
/// the chain of stores that produced it at ingest time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFileInfo {
    pub file_identity: String,
    pub upstream_queries: Vec<UpstreamQuery>,
}

impl CacheFileInfo {
    /// Flattens a live diagnostics chain, outermost first.
    pub fn from_diagnostics(file_identity: String, diagnostics: &Diagnostics) -> Self {
        let upstream_queries = diagnostics
            .chain()
            .map(|record| UpstreamQuery {
                store_name: record.store_name.clone(),
                file_path: record.file_path.clone().unwrap_or_default(),
                last_query_time: record.query_time,
            })
            .collect();
        Self {
            file_identity,
            upstream_queries,
        }
    }

    /// Rebuilds the upstream chain by folding the recorded steps in
    /// reverse: the last step becomes the origin, each earlier step wraps
    /// it. Every reconstructed record is `Success`.
    pub fn to_diagnostics(&self) -> Option<Diagnostics> {
        let mut chain: Option<Diagnostics> = None;
        for step in self.upstream_queries.iter().rev() {
            chain = Some(Diagnostics::new(
                Outcome::Success,
                step.store_name.clone(),
                Some(step.file_path.clone()),
                step.last_query_time,
                chain,
            ));
        }
        chain
    }

    /// Renders the textual sidecar form.
    pub fn format(&self) -> Result<String, StoreError> {
        let mut out = String::new();
        out.push_str(&format!("{IDENTITY_PREFIX} {}\n", self.file_identity));
        for step in &self.upstream_queries {
            out.push_str(&format!("{STORE_PREFIX} {}\n", step.store_name));
            out.push_str(&format!("{PATH_PREFIX} {}\n", step.file_path));
            out.push_str(&format!(
                "{TIME_PREFIX} {}\n",
                step.last_query_time.format(&Rfc3339)?
            ));
        }
        Ok(out)
    }

    /// Parses the textual sidecar form. The first line fixes the identity;
    /// the rest come in `Store` / `File Path` / `Last Query Time` groups.
    /// Any malformed group invalidates the whole record.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let first = lines
            .next()
            .ok_or_else(|| StoreError::MalformedCacheInfo("empty sidecar".to_string()))?;
        let file_identity = strip_field(first, IDENTITY_PREFIX)?.to_string();

        let rest: Vec<&str> = lines.collect();
        if rest.len() % 3 != 0 {
            return Err(StoreError::MalformedCacheInfo(format!(
                "{} trailing lines do not form store/path/time groups",
                rest.len()
            )));
        }
        let mut upstream_queries = Vec::with_capacity(rest.len() / 3);
        for group in rest.chunks(3) {
            let timestamp = strip_field(group[2], TIME_PREFIX)?;
            upstream_queries.push(UpstreamQuery {
                store_name: strip_field(group[0], STORE_PREFIX)?.to_string(),
                file_path: strip_field(group[1], PATH_PREFIX)?.to_string(),
                last_query_time: OffsetDateTime::parse(timestamp, &Rfc3339).map_err(|err| {
                    StoreError::MalformedCacheInfo(format!("bad timestamp {timestamp:?}: {err}"))
                })?,
            });
        }
        Ok(Self {
            file_identity,
            upstream_queries,
        })
    }
}

fn strip_field<'a>(line: &'a str, prefix: &str) -> Result<&'a str, StoreError> {
    let line = line.trim_end_matches('\r');
    line.strip_prefix(prefix)
        .map(str::trim)
        .ok_or_else(|| StoreError::MalformedCacheInfo(format!("expected {prefix:?} in {line:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> CacheFileInfo {
        CacheFileInfo {
            file_identity: "http://symbols.example.com/a/b/c".to_string(),
            upstream_queries: vec![
                UpstreamQuery {
                    store_name: "http://symbols.example.com".to_string(),
                    file_path: "http://symbols.example.com/a/b/c".to_string(),
                    last_query_time: OffsetDateTime::now_utc(),
                },
                UpstreamQuery {
                    store_name: "http://mirror.example.com".to_string(),
                    file_path: "http://mirror.example.com/a/b/c".to_string(),
                    last_query_time: OffsetDateTime::now_utc(),
                },
            ],
        }
    }

    #[test]
    fn round_trips_through_text() {
        let info = sample();
        let text = info.format().unwrap();
        assert_eq!(CacheFileInfo::parse(&text).unwrap(), info);
    }

    #[test]
    fn tolerates_crlf_and_blank_lines() {
        let info = sample();
        let text = info.format().unwrap().replace('\n', "\r\n\r\n");
        assert_eq!(CacheFileInfo::parse(&text).unwrap(), info);
    }

    #[test]
    fn empty_text_is_malformed() {
        assert!(CacheFileInfo::parse("").is_err());
        assert!(CacheFileInfo::parse("\n\n").is_err());
    }

    #[test]
    fn incomplete_group_invalidates_the_file() {
        let text = "File Identity: id\nStore: s\nFile Path: p\n";
        assert!(CacheFileInfo::parse(text).is_err());
    }

    #[test]
    fn unknown_field_invalidates_the_file() {
        let text = "File Identity: id\nStore: s\nWrong: p\nLast Query Time: 2024-01-01T00:00:00Z\n";
        assert!(CacheFileInfo::parse(text).is_err());
    }

    #[test]
    fn record_without_upstream_steps_parses() {
        let info = CacheFileInfo {
            file_identity: "/tmp/Symbols/a/b/c".to_string(),
            upstream_queries: Vec::new(),
        };
        let parsed = CacheFileInfo::parse(&info.format().unwrap()).unwrap();
        assert_eq!(parsed, info);
        assert!(parsed.to_diagnostics().is_none());
    }

    #[test]
    fn chain_rebuild_reverses_the_flattened_order() {
        let info = sample();
        let chain = info.to_diagnostics().unwrap();
        let names: Vec<_> = chain.chain().map(|r| r.store_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["http://symbols.example.com", "http://mirror.example.com"]
        );
        assert!(chain.chain().all(|r| r.outcome == Outcome::Success));

        let reflattened = CacheFileInfo::from_diagnostics(info.file_identity.clone(), &chain);
        assert_eq!(reflattened, info);
    }
}
