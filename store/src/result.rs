use crate::diagnostics::{Diagnostics, Outcome};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use time::OffsetDateTime;
use tokio::io::AsyncRead;

/// Byte stream for a symbol artifact. The caller owns it and must drop it
/// to release the underlying file handle or connection.
pub type SymbolStream = Pin<Box<dyn AsyncRead + Send>>;

/// Deferred producer of a [`SymbolStream`].
///
/// The factory is move-only and yields its stream exactly once; opening may
/// perform I/O and may suspend.
pub type StreamFactory = Box<dyn FnOnce() -> BoxFuture<'static, io::Result<SymbolStream>> + Send>;

/// Outcome of one `find`, with the provenance chain describing how the
/// answer was produced.
pub struct SearchResult {
    identity: Option<String>,
    diagnostics: Diagnostics,
    stream: Option<StreamFactory>,
}

impl SearchResult {
    /// Builds a result with a fresh diagnostics record tagged with the
    /// constructing store's name. The stream producer is kept only for
    /// successful outcomes.
    pub fn new(
        outcome: Outcome,
        store_name: &str,
        identity: Option<String>,
        file_path: Option<String>,
        query_time: OffsetDateTime,
        upstream: Option<Diagnostics>,
        stream: Option<StreamFactory>,
    ) -> Self {
        Self {
            identity,
            diagnostics: Diagnostics::new(outcome, store_name, file_path, query_time, upstream),
            stream: if outcome == Outcome::Success {
                stream
            } else {
                None
            },
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.diagnostics.outcome
    }

    /// Identity of the concrete file that answered, when known.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Opens the content stream.
    ///
    /// Yields `Some` at most once per result; later calls and non-success
    /// results return `None`.
    pub async fn open_stream(&mut self) -> Option<io::Result<SymbolStream>> {
        let factory = self.stream.take()?;
        Some(factory().await)
    }
}

impl fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResult")
            .field("identity", &self.identity)
            .field("diagnostics", &self.diagnostics)
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

/// Factory that lazily opens a file on disk.
pub fn file_stream(path: PathBuf) -> StreamFactory {
    Box::new(move || {
        async move {
            let file = tokio::fs::File::open(&path).await?;
            Ok(Box::pin(file) as SymbolStream)
        }
        .boxed()
    })
}

/// Factory serving an in-memory buffer; handy for tests and synthetic
/// stores.
pub fn memory_stream(bytes: Vec<u8>) -> StreamFactory {
    Box::new(move || async move { Ok(Box::pin(io::Cursor::new(bytes)) as SymbolStream) }.boxed())
}
