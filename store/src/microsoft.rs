use crate::diagnostics::Outcome;
use crate::error::StoreError;
use crate::http::{body_stream, AdditionalRequests, HttpSymbolStore};
use crate::key::SymbolKey;
use crate::result::{file_stream, SearchResult, StreamFactory, SymbolStream};
use crate::store::SymbolStore;
use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use reqwest::header::USER_AGENT;
use reqwest::{Client, Response};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SYMBOL_SERVER_USER_AGENT: &str = "Microsoft-Symbol-Server/10.0.0.0";

/// Inflates the body of a compressed-path response (the `.cab` convention,
/// where the stored blob's name ends in `_`). The actual decompressor is an
/// external adapter; only its seam is defined here.
#[async_trait]
pub trait CompressedFileConverter: Send + Sync {
    async fn decompress(&self, input: SymbolStream) -> io::Result<SymbolStream>;
}

/// Symbol server client speaking the Microsoft dialect: when the plain key
/// GET 404s, a redirect pointer file and a compressed blob are probed in
/// parallel, first hit wins.
pub fn microsoft_store(
    base_url: &str,
    converter: Arc<dyn CompressedFileConverter>,
) -> Result<HttpSymbolStore, StoreError> {
    HttpSymbolStore::with_additional_requests(base_url, Some(compound_requests(converter)))
}

fn compound_requests(converter: Arc<dyn CompressedFileConverter>) -> AdditionalRequests {
    Arc::new(move |store, key, cancel, query_time| {
        let client = store.client().clone();
        let store_name = store.name().to_string();
        let key = key.clone();
        let probes_cancel = cancel.child_token();
        let converter = Arc::clone(&converter);
        async move {
            let mut probes = FuturesUnordered::new();
            probes.push(
                pointer_probe(&client, &store_name, &key, &probes_cancel, query_time).boxed(),
            );
            probes.push(
                compressed_probe(
                    &client,
                    &store_name,
                    &key,
                    &probes_cancel,
                    query_time,
                    Arc::clone(&converter),
                )
                .boxed(),
            );

            // First probe to land a result cancels its peer, but both are
            // drained before returning so no request is left mid-flight.
            let mut found = None;
            while let Some(result) = probes.next().await {
                if result.is_some() && found.is_none() {
                    probes_cancel.cancel();
                    found = result;
                }
            }
            found
        }
        .boxed()
    })
}

/// `GET {base}/{dir(key)}/file.ptr`: a one-line body redirecting to a local
/// path, or an informational message.
async fn pointer_probe(
    client: &Client,
    store_name: &str,
    key: &SymbolKey,
    cancel: &CancellationToken,
    query_time: OffsetDateTime,
) -> Option<SearchResult> {
    let dir = key.dir();
    let url = if dir.is_empty() {
        format!("{store_name}/file.ptr")
    } else {
        format!("{store_name}/{dir}/file.ptr")
    };
    let response = get_with_cancel(client, &url, cancel).await?;
    let body = tokio::select! {
        _ = cancel.cancelled() => return None,
        body = response.text() => body.ok()?,
    };
    match parse_pointer(&body)? {
        SymbolPointer::Msg(message) => {
            debug!("{url}: {message}");
            None
        }
        SymbolPointer::Path(path) => {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("{url} redirects to missing path {}", path.display());
                return None;
            }
            let file_path = path.display().to_string();
            Some(SearchResult::new(
                Outcome::Success,
                store_name,
                Some(format!("{store_name}/{key}")),
                Some(file_path),
                query_time,
                None,
                Some(file_stream(path)),
            ))
        }
    }
}

/// `GET {base}/{key with last character replaced by '_'}`: the compressed
/// blob, inflated lazily when the caller opens the stream.
async fn compressed_probe(
    client: &Client,
    store_name: &str,
    key: &SymbolKey,
    cancel: &CancellationToken,
    query_time: OffsetDateTime,
    converter: Arc<dyn CompressedFileConverter>,
) -> Option<SearchResult> {
    let url = format!("{store_name}/{}", key.compressed());
    let response = get_with_cancel(client, &url, cancel).await?;
    let stream: StreamFactory = Box::new(move || {
        async move { converter.decompress(body_stream(response)).await }.boxed()
    });
    Some(SearchResult::new(
        Outcome::Success,
        store_name,
        Some(format!("{store_name}/{key}")),
        Some(url),
        query_time,
        None,
        Some(stream),
    ))
}

async fn get_with_cancel(
    client: &Client,
    url: &str,
    cancel: &CancellationToken,
) -> Option<Response> {
    let request = client
        .get(url)
        .header(USER_AGENT, SYMBOL_SERVER_USER_AGENT)
        .send();
    let response = tokio::select! {
        _ = cancel.cancelled() => return None,
        response = request => response.ok()?,
    };
    response.status().is_success().then_some(response)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SymbolPointer {
    /// Informational only; the server had nothing to redirect to.
    Msg(String),
    /// Local filesystem path holding the artifact.
    Path(PathBuf),
}

/// The leading sentinel alone decides the kind; an empty body or any other
/// prefix fails to parse.
fn parse_pointer(body: &str) -> Option<SymbolPointer> {
    let line = body.lines().next()?;
    if let Some(rest) = line.strip_prefix("PATH:") {
        Some(SymbolPointer::Path(PathBuf::from(rest.trim())))
    } else if let Some(rest) = line.strip_prefix("MSG:") {
        Some(SymbolPointer::Msg(rest.trim().to_string()))
    } else {
        None
    }
}
