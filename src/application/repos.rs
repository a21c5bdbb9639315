//! Repository traits describing the persistence and collaborator boundaries.
//!
//! The engine never touches a concrete store: every structural mutation goes
//! through [`NodeStore`], site lookup through [`SiteRegistry`], plugin payload
//! ownership through [`PayloadRepo`], and search indexing through the
//! best-effort [`SearchNotifier`]. `infra::memory` provides the reference
//! in-memory adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::content::{ContentId, ContentRecord, ContentType, SiteId};
use crate::domain::site::SiteRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    /// The store rejected a write. The rejected record travels with the
    /// error so a caller can re-render it.
    #[error("record rejected: {message}")]
    Rejected {
        message: String,
        record: Box<ContentRecord>,
    },
    #[error("conflicting transaction state: {0}")]
    Conflict(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn rejected(message: impl Into<String>, record: ContentRecord) -> Self {
        Self::Rejected {
            message: message.into(),
            record: Box::new(record),
        }
    }
}

/// Which deletion states a query observes. Live queries are the default;
/// trashed rows are logically detached and never appear in them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashScope {
    #[default]
    LiveOnly,
    TrashOnly,
    WithTrash,
}

/// Field filters for [`NodeStore::find`]. All set fields are ANDed. Results
/// are ordered by ascending `lft` (trashed rows by their stale bounds).
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub site_id: Option<SiteId>,
    pub parent_id: Option<ContentId>,
    pub content_type: Option<ContentType>,
    pub not_content_type: Option<ContentType>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub alias_of: Option<ContentId>,
    pub site_root: Option<bool>,
    /// Nodes whose `lft` lies strictly inside the given `(lft, rght)` range,
    /// i.e. the descendants of the node owning that range.
    pub range_within: Option<(i64, i64)>,
    pub trash: TrashScope,
}

impl ContentFilter {
    pub fn live() -> Self {
        Self::default()
    }

    pub fn trashed() -> Self {
        Self {
            trash: TrashScope::TrashOnly,
            ..Self::default()
        }
    }

    pub fn children_of(parent_id: ContentId) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    pub fn descendants_of(record: &ContentRecord) -> Self {
        Self {
            range_within: Some((record.lft, record.rght)),
            ..Self::default()
        }
    }
}

/// Transactional CRUD over content rows backing the nested-set columns.
///
/// `find` must honor every [`ContentFilter`] field; a SQL adapter is expected
/// to express `range_within` as a bound comparison, not a recursive query.
/// `begin`/`commit`/`rollback` frame structural mutations; the engine never
/// nests transactions.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn find(&self, filter: &ContentFilter) -> Result<Vec<ContentRecord>, RepoError>;

    async fn get(&self, id: ContentId) -> Result<Option<ContentRecord>, RepoError>;

    async fn save(&self, record: ContentRecord) -> Result<ContentRecord, RepoError>;

    async fn delete(&self, id: ContentId) -> Result<(), RepoError>;

    async fn next_id(&self) -> Result<ContentId, RepoError>;

    async fn begin(&self) -> Result<(), RepoError>;

    async fn commit(&self) -> Result<(), RepoError>;

    async fn rollback(&self) -> Result<(), RepoError>;
}

/// Host/device-aware site lookup.
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// Resolve the active site for a request. Device match wins over host
    /// match; falls back to the main site.
    async fn resolve(
        &self,
        host: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<SiteRecord, RepoError>;

    async fn find(&self, id: SiteId) -> Result<Option<SiteRecord>, RepoError>;

    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RepoError>;

    async fn main_site(&self) -> Result<SiteRecord, RepoError>;
}

/// Per-plugin payload rows owned by non-folder nodes. The tree only tracks
/// existence; creation and rendering belong to the plugin collaborators.
#[async_trait]
pub trait PayloadRepo: Send + Sync {
    async fn exists(&self, content_type: ContentType, entity_id: i64) -> Result<bool, RepoError>;

    async fn delete_payload(
        &self,
        content_type: ContentType,
        entity_id: i64,
    ) -> Result<(), RepoError>;
}

/// Best-effort search index consumer. Failures are logged by the caller and
/// never fail the tree mutation.
#[async_trait]
pub trait SearchNotifier: Send + Sync {
    async fn upsert(&self, record: &ContentRecord) -> Result<(), RepoError>;

    async fn remove(&self, id: ContentId) -> Result<(), RepoError>;
}
