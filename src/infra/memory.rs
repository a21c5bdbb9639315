//! In-memory reference adapters for the repository traits.
//!
//! `MemoryNodeStore` backs the engine's test suites and small embedded
//! deployments: a `BTreeMap` of rows behind a `tokio` mutex, with
//! checkpoint-based transactions (`begin` snapshots the map, `rollback`
//! restores it). Filtering and ordering mirror what a SQL adapter would
//! express as indexed range queries.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::repos::{
    ContentFilter, NodeStore, PayloadRepo, RepoError, SearchNotifier, SiteRegistry, TrashScope,
};
use crate::domain::content::{ContentId, ContentRecord, ContentType, SiteId};
use crate::domain::site::SiteRecord;

#[derive(Default)]
struct StoreState {
    rows: BTreeMap<ContentId, ContentRecord>,
    next_id: ContentId,
    checkpoint: Option<BTreeMap<ContentId, ContentRecord>>,
}

#[derive(Default)]
pub struct MemoryNodeStore {
    state: Mutex<StoreState>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row verbatim, bypassing validation. Fixture helper.
    pub async fn seed(&self, record: ContentRecord) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(record.id);
        state.rows.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.rows.is_empty()
    }

    fn matches(filter: &ContentFilter, row: &ContentRecord) -> bool {
        match filter.trash {
            TrashScope::LiveOnly if row.is_trashed() => return false,
            TrashScope::TrashOnly if !row.is_trashed() => return false,
            _ => {}
        }
        if filter.site_id.is_some_and(|v| row.site_id != v) {
            return false;
        }
        if filter.parent_id.is_some_and(|v| row.parent_id != Some(v)) {
            return false;
        }
        if filter.content_type.is_some_and(|v| row.content_type != v) {
            return false;
        }
        if filter.not_content_type.is_some_and(|v| row.content_type == v) {
            return false;
        }
        if filter.name.as_deref().is_some_and(|v| row.name != v) {
            return false;
        }
        if filter.url.as_deref().is_some_and(|v| row.url != v) {
            return false;
        }
        if filter.alias_of.is_some_and(|v| row.alias_id != Some(v)) {
            return false;
        }
        if filter.site_root.is_some_and(|v| row.site_root != v) {
            return false;
        }
        if let Some((lft, rght)) = filter.range_within
            && !(row.lft > lft && row.lft < rght)
        {
            return false;
        }
        true
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn find(&self, filter: &ContentFilter) -> Result<Vec<ContentRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut rows: Vec<ContentRecord> = state
            .rows
            .values()
            .filter(|row| Self::matches(filter, row))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.lft, r.id));
        Ok(rows)
    }

    async fn get(&self, id: ContentId) -> Result<Option<ContentRecord>, RepoError> {
        Ok(self.state.lock().await.rows.get(&id).cloned())
    }

    async fn save(&self, record: ContentRecord) -> Result<ContentRecord, RepoError> {
        if record.title.trim().is_empty() {
            return Err(RepoError::rejected("title must not be empty", record));
        }
        if record.rght <= record.lft {
            return Err(RepoError::rejected(
                "nested-set bounds out of order",
                record,
            ));
        }
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(record.id);
        state.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: ContentId) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state.rows.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }

    async fn next_id(&self) -> Result<ContentId, RepoError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        Ok(state.next_id)
    }

    async fn begin(&self) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        if state.checkpoint.is_some() {
            return Err(RepoError::Conflict("transaction already open".to_string()));
        }
        state.checkpoint = Some(state.rows.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state
            .checkpoint
            .take()
            .map(|_| ())
            .ok_or_else(|| RepoError::Conflict("no open transaction".to_string()))
    }

    async fn rollback(&self) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let snapshot = state
            .checkpoint
            .take()
            .ok_or_else(|| RepoError::Conflict("no open transaction".to_string()))?;
        state.rows = snapshot;
        Ok(())
    }
}

pub struct MemorySiteRegistry {
    sites: Vec<SiteRecord>,
}

impl MemorySiteRegistry {
    pub fn new(sites: Vec<SiteRecord>) -> Self {
        Self { sites }
    }
}

#[async_trait]
impl SiteRegistry for MemorySiteRegistry {
    async fn resolve(
        &self,
        host: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<SiteRecord, RepoError> {
        if let Some(agent) = user_agent
            && let Some(site) = self
                .sites
                .iter()
                .find(|s| s.status && s.matches_user_agent(agent))
        {
            return Ok(site.clone());
        }
        if let Some(host) = host
            && let Some(site) = self.sites.iter().find(|s| s.status && s.matches_host(host))
        {
            return Ok(site.clone());
        }
        self.main_site().await
    }

    async fn find(&self, id: SiteId) -> Result<Option<SiteRecord>, RepoError> {
        Ok(self.sites.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RepoError> {
        Ok(self.sites.clone())
    }

    async fn main_site(&self) -> Result<SiteRecord, RepoError> {
        self.sites
            .iter()
            .find(|s| s.is_main())
            .cloned()
            .ok_or_else(|| RepoError::from_persistence("no main site registered"))
    }
}

/// Payload rows keyed by `(type, entity_id)`, with injectable delete
/// failures for exercising purge warnings.
#[derive(Default)]
pub struct MemoryPayloadRepo {
    rows: Mutex<HashSet<(ContentType, i64)>>,
    failing: Mutex<HashSet<(ContentType, i64)>>,
}

impl MemoryPayloadRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, content_type: ContentType, entity_id: i64) {
        self.rows.lock().await.insert((content_type, entity_id));
    }

    pub async fn fail_delete(&self, content_type: ContentType, entity_id: i64) {
        self.failing.lock().await.insert((content_type, entity_id));
    }
}

#[async_trait]
impl PayloadRepo for MemoryPayloadRepo {
    async fn exists(&self, content_type: ContentType, entity_id: i64) -> Result<bool, RepoError> {
        Ok(self.rows.lock().await.contains(&(content_type, entity_id)))
    }

    async fn delete_payload(
        &self,
        content_type: ContentType,
        entity_id: i64,
    ) -> Result<(), RepoError> {
        if self
            .failing
            .lock()
            .await
            .contains(&(content_type, entity_id))
        {
            return Err(RepoError::from_persistence(format!(
                "payload {}/{entity_id} is locked",
                content_type.as_str()
            )));
        }
        self.rows.lock().await.remove(&(content_type, entity_id));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    Upserted(ContentId),
    Removed(ContentId),
}

/// Records search notifications; can be flipped to fail for testing the
/// best-effort contract.
#[derive(Default)]
pub struct RecordingSearchNotifier {
    events: Mutex<Vec<SearchEvent>>,
    failing: AtomicBool,
}

impl RecordingSearchNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub async fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl SearchNotifier for RecordingSearchNotifier {
    async fn upsert(&self, record: &ContentRecord) -> Result<(), RepoError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(RepoError::from_persistence("search index unavailable"));
        }
        self.events
            .lock()
            .await
            .push(SearchEvent::Upserted(record.id));
        Ok(())
    }

    async fn remove(&self, id: ContentId) -> Result<(), RepoError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(RepoError::from_persistence("search index unavailable"));
        }
        self.events.lock().await.push(SearchEvent::Removed(id));
        Ok(())
    }
}
