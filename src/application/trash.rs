//! Trash lifecycle: Live → Trashed → (Restored | Purged).
//!
//! Soft delete detaches a subtree from live numbering and stamps every row
//! with one shared `deleted_date`; that stamp is the batch marker restore
//! uses to bring back exactly the rows trashed together, in their original
//! relative order. Hard delete purges rows permanently and asks the payload
//! repository to drop owned payload rows; payload failures are reported, not
//! fatal.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::application::indexer::TreeIndexer;
use crate::application::repos::{ContentFilter, NodeStore, PayloadRepo, RepoError, TrashScope};
use crate::domain::content::{ContentId, ContentRecord, ContentType};
use crate::domain::error::DomainError;

/// Non-fatal payload purge failure, surfaced alongside the purge result.
#[derive(Debug, Clone)]
pub struct PurgeWarning {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub entity_id: i64,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct PurgeOutcome {
    pub purged: Vec<ContentId>,
    pub warnings: Vec<PurgeWarning>,
}

#[derive(Clone)]
pub struct TrashManager {
    store: Arc<dyn NodeStore>,
    payloads: Arc<dyn PayloadRepo>,
    indexer: TreeIndexer,
}

impl TrashManager {
    pub fn new(
        store: Arc<dyn NodeStore>,
        payloads: Arc<dyn PayloadRepo>,
        indexer: TreeIndexer,
    ) -> Self {
        Self {
            store,
            payloads,
            indexer,
        }
    }

    /// Detach the subtree rooted at `id` and mark every row trashed with one
    /// shared timestamp. Trashing an already-trashed node is a no-op.
    pub async fn soft_delete(&self, id: ContentId) -> Result<Vec<ContentRecord>, AppError> {
        let row = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(id))?;
        if row.is_trashed() {
            return Ok(Vec::new());
        }

        let now = OffsetDateTime::now_utc();
        let detached = self.indexer.detach(id).await?;
        let mut trashed = Vec::with_capacity(detached.len());
        for mut record in detached {
            record.deleted_date = Some(now);
            record.status = false;
            record.modified = now;
            trashed.push(self.store.save(record).await?);
        }
        info!(id, nodes = trashed.len(), "moved subtree to trash");
        Ok(trashed)
    }

    /// Re-insert a trashed node under its original parent, then the
    /// descendants trashed in the same operation, in their original sibling
    /// order. Restoring a live node is a no-op.
    pub async fn restore(&self, id: ContentId) -> Result<Option<ContentRecord>, AppError> {
        let row = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(id))?;
        if !row.is_trashed() {
            return Ok(Some(row));
        }

        if let Some(parent_id) = row.parent_id {
            let parent_live = self
                .store
                .get(parent_id)
                .await?
                .is_some_and(|p| !p.is_trashed());
            if !parent_live {
                return Err(DomainError::orphaned_restore(id, parent_id).into());
            }
        }

        let batch_mark = row.deleted_date;
        let mut batch: Vec<ContentRecord> = self
            .store
            .find(&ContentFilter::trashed())
            .await?
            .into_iter()
            .filter(|r| r.deleted_date == batch_mark && r.lft >= row.lft && r.rght <= row.rght)
            .collect();
        // Stale bounds still encode the original ordering: ascending lft
        // visits parents before children and siblings in display order.
        batch.sort_by_key(|r| r.lft);

        let mut restored_root = None;
        for mut record in batch {
            record.deleted_date = None;
            let parent_id = record.parent_id;
            let saved = match parent_id {
                Some(parent_id) => self.indexer.insert(record, parent_id, None).await?,
                None => self.indexer.insert_root(record).await?,
            };
            if saved.id == id {
                restored_root = Some(saved);
            }
        }
        info!(id, "restored subtree from trash");
        Ok(restored_root)
    }

    /// Restore every trashed node matching `filter` whose parent is live.
    /// Returns the number of rows brought back.
    pub async fn restore_all(&self, filter: &ContentFilter) -> Result<usize, AppError> {
        let mut filter = filter.clone();
        filter.trash = TrashScope::TrashOnly;
        let mut count = 0;
        loop {
            let mut progressed = false;
            for row in self.store.find(&filter).await? {
                let parent_live = match row.parent_id {
                    None => true,
                    Some(parent_id) => self
                        .store
                        .get(parent_id)
                        .await?
                        .is_some_and(|p| !p.is_trashed()),
                };
                if !parent_live {
                    continue;
                }
                let before = self.trash_len().await?;
                self.restore(row.id).await?;
                let after = self.trash_len().await?;
                if before > after {
                    count += before - after;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(count)
    }

    /// Permanently remove a row (and with `cascade`, all live or trashed
    /// descendants), dropping owned payload rows. A live node that still has
    /// children requires `cascade` so the numbering can never orphan a
    /// subtree. Missing ids always error.
    pub async fn hard_delete(
        &self,
        id: ContentId,
        cascade: bool,
    ) -> Result<PurgeOutcome, AppError> {
        let row = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(id))?;

        let mut targets = vec![row.clone()];
        if cascade {
            targets.extend(self.collect_descendants(id).await?);
        } else {
            let children = self
                .store
                .find(&ContentFilter {
                    parent_id: Some(id),
                    trash: TrashScope::WithTrash,
                    ..ContentFilter::default()
                })
                .await?;
            if !children.is_empty() {
                return Err(AppError::validation(format!(
                    "content `{id}` still has descendants; cascade is required"
                )));
            }
        }

        if !row.is_trashed() {
            self.indexer.detach(id).await?;
        }

        let mut outcome = PurgeOutcome::default();
        for target in targets {
            if target.content_type.owns_payload()
                && !target.is_alias()
                && let Some(entity_id) = target.entity_id
                && let Err(err) = self
                    .payloads
                    .delete_payload(target.content_type, entity_id)
                    .await
            {
                warn!(
                    content_id = target.id,
                    entity_id,
                    error = %err,
                    "failed to purge associated payload"
                );
                outcome.warnings.push(PurgeWarning {
                    content_id: target.id,
                    content_type: target.content_type,
                    entity_id,
                    message: err.to_string(),
                });
            }
            match self.store.delete(target.id).await {
                Ok(()) => outcome.purged.push(target.id),
                // Already purged by an overlapping cascade: idempotent.
                Err(RepoError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }
        info!(id, purged = outcome.purged.len(), "hard-deleted content");
        Ok(outcome)
    }

    /// All descendants of `id`, live or trashed, by parent-chain walk (stale
    /// bounds on trashed rows cannot be trusted for range queries).
    async fn collect_descendants(&self, id: ContentId) -> Result<Vec<ContentRecord>, AppError> {
        let mut frontier = vec![id];
        let mut collected = Vec::new();
        while let Some(current) = frontier.pop() {
            let children = self
                .store
                .find(&ContentFilter {
                    parent_id: Some(current),
                    trash: TrashScope::WithTrash,
                    ..ContentFilter::default()
                })
                .await?;
            for child in children {
                frontier.push(child.id);
                collected.push(child);
            }
        }
        Ok(collected)
    }

    async fn trash_len(&self) -> Result<usize, AppError> {
        Ok(self.store.find(&ContentFilter::trashed()).await?.len())
    }
}
