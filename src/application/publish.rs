//! Publish visibility: per-node schedule plus ancestor aggregation.
//!
//! A node is visible iff its own flag is set, `now` lies inside its
//! open-ended publish window, and every live ancestor up to the site root is
//! itself visible. The persisted `status` column caches the aggregate at
//! write time; `is_changed_status` decides whether dependent caches (URL map,
//! search index) must be refreshed after an edit.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use crate::application::error::AppError;
use crate::application::indexer::TreeIndexer;
use crate::application::repos::{ContentFilter, NodeStore};
use crate::domain::content::{ContentId, ContentRecord};

/// Self-visibility: own flag set and `now` inside the open-ended window.
pub fn allow_publish(record: &ContentRecord, now: OffsetDateTime) -> bool {
    record.self_status
        && record.self_publish_begin.is_none_or(|begin| begin <= now)
        && record.self_publish_end.is_none_or(|end| end > now)
}

/// Incoming edit, compared field-by-field against the stored row. Outer
/// `None` means "not part of this edit"; the inner `Option` on the window
/// fields carries "clear the bound".
#[derive(Debug, Clone, Default)]
pub struct StatusFields {
    pub title: Option<String>,
    pub url: Option<String>,
    pub self_status: Option<bool>,
    pub self_publish_begin: Option<Option<OffsetDateTime>>,
    pub self_publish_end: Option<Option<OffsetDateTime>>,
}

#[derive(Clone)]
pub struct PublishStateEvaluator {
    store: Arc<dyn NodeStore>,
    indexer: TreeIndexer,
}

impl PublishStateEvaluator {
    pub fn new(store: Arc<dyn NodeStore>, indexer: TreeIndexer) -> Self {
        Self { store, indexer }
    }

    /// Aggregate visibility: the node and every live ancestor allow publish.
    pub async fn effective_status(
        &self,
        record: &ContentRecord,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        if !allow_publish(record, now) {
            return Ok(false);
        }
        let rows = self.store.find(&ContentFilter::live()).await?;
        Ok(rows
            .iter()
            .filter(|r| r.contains(record))
            .all(|ancestor| allow_publish(ancestor, now)))
    }

    /// Set the node's own flag, drop whichever window edge blocks it (an end
    /// already past, a begin still in the future), recompute the aggregate.
    pub async fn publish(
        &self,
        id: ContentId,
        now: OffsetDateTime,
    ) -> Result<ContentRecord, AppError> {
        let mut record = self.indexer.live(id).await?;
        record.self_status = true;
        if record.self_publish_end.is_some_and(|end| end <= now) {
            record.self_publish_end = None;
        }
        if record.self_publish_begin.is_some_and(|begin| begin > now) {
            record.self_publish_begin = None;
        }
        record.status = self.effective_status(&record, now).await?;
        record.modified = now;
        debug!(id, status = record.status, "publish content");
        Ok(self.store.save(record).await?)
    }

    pub async fn unpublish(
        &self,
        id: ContentId,
        now: OffsetDateTime,
    ) -> Result<ContentRecord, AppError> {
        let mut record = self.indexer.live(id).await?;
        record.self_status = false;
        record.status = false;
        record.modified = now;
        debug!(id, "unpublish content");
        Ok(self.store.save(record).await?)
    }

    /// Whether an edit touches any field dependent caches key on. A missing
    /// id always counts as changed.
    pub async fn is_changed_status(
        &self,
        id: ContentId,
        fields: &StatusFields,
    ) -> Result<bool, AppError> {
        let Some(stored) = self.store.get(id).await? else {
            return Ok(true);
        };
        if fields.title.as_deref().is_some_and(|t| t != stored.title) {
            return Ok(true);
        }
        if fields.url.as_deref().is_some_and(|u| u != stored.url) {
            return Ok(true);
        }
        if fields.self_status.is_some_and(|s| s != stored.self_status) {
            return Ok(true);
        }
        if fields
            .self_publish_begin
            .is_some_and(|b| b != stored.self_publish_begin)
        {
            return Ok(true);
        }
        if fields
            .self_publish_end
            .is_some_and(|e| e != stored.self_publish_end)
        {
            return Ok(true);
        }
        Ok(false)
    }
}
