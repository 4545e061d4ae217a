//! In-memory document store implementation
//!
//! Behaves like the real backing store where the user store can observe it:
//! indices auto-create on first write, every write bumps a per-document
//! version, and scrolled searches hand out cursors that must be cleared.
//! Backs the crate's tests; also usable for embedding without a cluster.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use uuid::Uuid;

use crate::docstore::{
    AttrMap, Document, DocumentStore, Hit, IndexOutcome, Query, SearchPage, SearchRequest,
};
use crate::error::{Error, Result};

struct StoredDoc {
    doc_type: String,
    source: AttrMap,
    version: u64,
}

#[derive(Default)]
struct IndexData {
    docs: HashMap<String, StoredDoc>,
}

struct ScrollState {
    remaining: VecDeque<Hit>,
    page_size: usize,
}

#[derive(Default)]
struct StoreState {
    indices: HashMap<String, IndexData>,
    scrolls: HashMap<String, ScrollState>,
}

/// In-memory, immediately consistent document store
pub struct InMemoryDocumentStore {
    state: Mutex<StoreState>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Number of scroll cursors that have not been cleared
    pub fn open_scroll_count(&self) -> usize {
        self.state.lock().scrolls.len()
    }

    fn matches(query: &Query, id: &str, doc: &StoredDoc) -> bool {
        match query {
            Query::MatchAll => true,
            Query::Ids(ids) => ids.iter().any(|candidate| candidate == id),
            Query::DocType(doc_type) => doc.doc_type == *doc_type,
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Option<Document>> {
        let state = self.state.lock();
        let index_data = state
            .indices
            .get(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;

        Ok(index_data
            .docs
            .get(id)
            .filter(|doc| doc.doc_type == doc_type)
            .map(|doc| Document {
                id: id.to_string(),
                version: doc.version,
                source: doc.source.clone(),
            }))
    }

    async fn index(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: AttrMap,
        _refresh: bool,
    ) -> Result<IndexOutcome> {
        let mut state = self.state.lock();
        let index_data = state.indices.entry(index.to_string()).or_default();

        match index_data.docs.get_mut(id) {
            Some(doc) => {
                doc.doc_type = doc_type.to_string();
                doc.source = source;
                doc.version += 1;
                Ok(IndexOutcome {
                    created: false,
                    version: doc.version,
                })
            }
            None => {
                index_data.docs.insert(
                    id.to_string(),
                    StoredDoc {
                        doc_type: doc_type.to_string(),
                        source,
                        version: 1,
                    },
                );
                Ok(IndexOutcome {
                    created: true,
                    version: 1,
                })
            }
        }
    }

    async fn delete(&self, index: &str, doc_type: &str, id: &str, _refresh: bool) -> Result<bool> {
        let mut state = self.state.lock();
        let index_data = state
            .indices
            .get_mut(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;

        let found = index_data
            .docs
            .get(id)
            .map(|doc| doc.doc_type == doc_type)
            .unwrap_or(false);
        if found {
            index_data.docs.remove(id);
        }
        Ok(found)
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchPage> {
        let mut state = self.state.lock();

        let index_data = match state.indices.get(&request.index) {
            Some(data) => data,
            None if request.ignore_unavailable => return Ok(SearchPage::default()),
            None => return Err(Error::IndexNotFound(request.index.clone())),
        };

        let mut hits: Vec<Hit> = index_data
            .docs
            .iter()
            .filter(|(_, doc)| doc.doc_type == request.doc_type)
            .filter(|(id, doc)| Self::matches(&request.query, id, doc))
            .map(|(id, doc)| Hit {
                id: id.clone(),
                version: request.with_version.then_some(doc.version),
                source: request.fetch_source.then(|| doc.source.clone()),
            })
            .collect();
        // stable order so scroll pages do not overlap or skip
        hits.sort_by(|a, b| a.id.cmp(&b.id));

        let mut remaining: VecDeque<Hit> = hits.into();
        let first_page: Vec<Hit> = {
            let take = request.page_size.min(remaining.len());
            remaining.drain(..take).collect()
        };

        let scroll_id = Uuid::new_v4().to_string();
        state.scrolls.insert(
            scroll_id.clone(),
            ScrollState {
                remaining,
                page_size: request.page_size,
            },
        );

        Ok(SearchPage {
            scroll_id: Some(scroll_id),
            hits: first_page,
        })
    }

    async fn search_scroll(&self, scroll_id: &str, _keep_alive: Duration) -> Result<SearchPage> {
        let mut state = self.state.lock();
        let scroll = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| Error::StoreUnavailable(format!("unknown scroll id [{}]", scroll_id)))?;

        let take = scroll.page_size.min(scroll.remaining.len());
        let hits: Vec<Hit> = scroll.remaining.drain(..take).collect();

        Ok(SearchPage {
            scroll_id: Some(scroll_id.to_string()),
            hits,
        })
    }

    async fn clear_scroll(&self, scroll_ids: Vec<String>) -> Result<()> {
        let mut state = self.state.lock();
        for scroll_id in scroll_ids {
            state.scrolls.remove(&scroll_id);
        }
        Ok(())
    }
}
