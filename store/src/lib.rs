//! # Symstore
//!
//! Layered retrieval and caching of debugging artifacts (executable images
//! and debug databases) addressed by content-derived keys.
//!
//! ## Architecture
//!
//! ```text
//! find(key)
//!     │
//!     ├──> FileCache ──────────── hit: serve from disk, provenance from
//!     │        │                       the sidecar record
//!     │        └── miss ──> upstream
//!     │
//!     ├──> UnionSymbolStore ───── concurrent fan-out over N upstreams,
//!     │        │                       first success cancels the rest
//!     │        └──> HttpSymbolStore ── GET {base}/{key}, backoff memory,
//!     │                                compound fallback on 404
//!     │
//!     └──> SearchResult ───────── outcome + lazy stream + diagnostics
//!                                      chain naming every layer consulted
//! ```
//!
//! Stores compose: a cache wraps an HTTP store or a union of them, and every
//! layer stamps the result's diagnostics chain so a cache hit still shows
//! where the bytes originally came from.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use symstore::{FileCache, HttpSymbolStore, SymbolKey, SymbolStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), symstore::StoreError> {
//! let server = Arc::new(HttpSymbolStore::new("https://msdl.microsoft.com/download/symbols")?);
//! let cache = FileCache::identity_partitioned(symstore::default_cache_dir(), server)?;
//!
//! let key = SymbolKey::new("clr.dll/4ba21eeb965000/clr.dll")?;
//! if let Some(mut result) = cache
//!     .find_with_default_policy(&key, &CancellationToken::new())
//!     .await
//! {
//!     println!("{:?}", result.diagnostics());
//!     let _stream = result.open_stream().await;
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod diagnostics;
mod error;
mod http;
mod key;
mod microsoft;
mod result;
mod store;
mod union;

pub use cache::{default_cache_dir, CacheFileInfo, CacheLayout, FileCache, UpstreamQuery};
pub use diagnostics::{Diagnostics, Outcome};
pub use error::StoreError;
pub use http::{AdditionalRequests, HttpSymbolStore};
pub use key::SymbolKey;
pub use microsoft::{microsoft_store, CompressedFileConverter};
pub use result::{file_stream, memory_stream, SearchResult, StreamFactory, SymbolStream};
pub use store::{CacheValidityPolicy, SymbolStore};
pub use union::UnionSymbolStore;
