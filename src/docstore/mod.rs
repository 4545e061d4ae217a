//! Backing document store trait and search types
//!
//! The store persists user records in an external indexed document store.
//! This module defines the client-side seam: point reads and writes plus a
//! scrolled search surface with explicit cursor cleanup.

use async_trait::async_trait;
use log::warn;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::error::Result;

pub mod r#impl;

/// Generic attribute map a document encodes to and from
pub type AttrMap = serde_json::Map<String, serde_json::Value>;

/// A stored document returned by a point lookup
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Monotonically increasing version assigned by the store on every write
    pub version: u64,
    pub source: AttrMap,
}

/// Outcome of a whole-document index operation
#[derive(Debug, Clone, Copy)]
pub struct IndexOutcome {
    /// True when no prior document existed under the id
    pub created: bool,
    pub version: u64,
}

/// Query forms the store issues against the backing index
#[derive(Debug, Clone)]
pub enum Query {
    MatchAll,
    /// Documents whose ids are in the given set
    Ids(Vec<String>),
    /// All documents of the given type
    DocType(String),
}

/// A scrolled search over one index
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub index: String,
    pub doc_type: String,
    pub query: Query,
    pub page_size: usize,
    /// Scroll cursor TTL
    pub keep_alive: Duration,
    /// Request per-hit version metadata
    pub with_version: bool,
    /// Request per-hit document sources
    pub fetch_source: bool,
    /// Treat a missing index as an empty result instead of an error
    pub ignore_unavailable: bool,
}

/// One page of search hits plus the cursor for the next page
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub scroll_id: Option<String>,
    pub hits: Vec<Hit>,
}

/// A single search hit
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    /// Present when the request asked for versions
    pub version: Option<u64>,
    /// Present when the request asked for sources
    pub source: Option<AttrMap>,
}

/// Asynchronous client for the backing document store
///
/// `Error::IndexNotFound` is the distinguished missing-index error; callers
/// on the read path suppress it, the write path propagates it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point lookup by primary key
    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Option<Document>>;

    /// Whole-document write; creates the document or replaces it entirely
    async fn index(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: AttrMap,
        refresh: bool,
    ) -> Result<IndexOutcome>;

    /// Delete by primary key; returns whether a document was found
    async fn delete(&self, index: &str, doc_type: &str, id: &str, refresh: bool) -> Result<bool>;

    /// Open a scrolled search and return its first page
    async fn search(&self, request: SearchRequest) -> Result<SearchPage>;

    /// Fetch the next page of an open scroll
    async fn search_scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<SearchPage>;

    /// Release scroll cursors
    async fn clear_scroll(&self, scroll_ids: Vec<String>) -> Result<()>;
}

/// Drive a scrolled search to completion, feeding each page to `visit`
///
/// The visitor may abort the scan by returning `ControlFlow::Break`. On
/// every exit path (completion, abort, or error) any open scroll cursor is
/// cleared best-effort; a failed clear is logged, not propagated.
pub(crate) async fn scroll_all<F>(
    client: &dyn DocumentStore,
    request: SearchRequest,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&[Hit]) -> ControlFlow<()>,
{
    let keep_alive = request.keep_alive;
    let mut page = client.search(request).await?;
    let mut last_scroll_id = page.scroll_id.clone();

    let result = loop {
        if page.hits.is_empty() {
            break Ok(());
        }
        if visit(&page.hits).is_break() {
            break Ok(());
        }
        let scroll_id = match &page.scroll_id {
            Some(id) => id.clone(),
            None => break Ok(()),
        };
        match client.search_scroll(&scroll_id, keep_alive).await {
            Ok(next) => {
                if next.scroll_id.is_some() {
                    last_scroll_id = next.scroll_id.clone();
                }
                page = next;
            }
            Err(e) => break Err(e),
        }
    };

    if let Some(scroll_id) = last_scroll_id {
        if let Err(e) = client.clear_scroll(vec![scroll_id]).await {
            warn!("failed to clear scroll after scanning users: {}", e);
        }
    }

    result
}
