//! Nested-set index maintenance.
//!
//! All structural mutation of the live tree funnels through here: placing a
//! node opens a gap of width 2, moving a subtree closes the gap at the origin
//! and opens one of the same width at the destination, detaching closes the
//! gap entirely. Each operation leaves every live node satisfying the range
//! invariant; callers frame the operation in a `NodeStore` transaction so a
//! half-applied shift is never observable.

use std::sync::Arc;

use tracing::debug;

use crate::application::error::AppError;
use crate::application::repos::{ContentFilter, NodeStore};
use crate::domain::content::{ContentId, ContentRecord};
use crate::domain::error::DomainError;

#[derive(Clone)]
pub struct TreeIndexer {
    store: Arc<dyn NodeStore>,
}

impl TreeIndexer {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// Fetch a live node or fail with `NotFound`. Trashed rows are detached
    /// from the numbering space and count as absent here.
    pub async fn live(&self, id: ContentId) -> Result<ContentRecord, AppError> {
        match self.store.get(id).await? {
            Some(record) if !record.is_trashed() => Ok(record),
            _ => Err(AppError::not_found(id)),
        }
    }

    /// Place `node` under `parent_id`, either as the last child or
    /// immediately before the named sibling. Bounds at or after the insertion
    /// point shift right by 2.
    pub async fn insert(
        &self,
        mut node: ContentRecord,
        parent_id: ContentId,
        before: Option<ContentId>,
    ) -> Result<ContentRecord, AppError> {
        let parent = self.live(parent_id).await?;
        let pos = match before {
            Some(sibling_id) => self.sibling_position(parent_id, sibling_id).await?,
            None => parent.rght,
        };

        for mut row in self.store.find(&ContentFilter::live()).await? {
            let mut changed = false;
            if row.lft >= pos {
                row.lft += 2;
                changed = true;
            }
            if row.rght >= pos {
                row.rght += 2;
                changed = true;
            }
            if changed {
                self.store.save(row).await?;
            }
        }

        node.parent_id = Some(parent.id);
        node.level = parent.level + 1;
        node.lft = pos;
        node.rght = pos + 1;
        debug!(id = node.id, parent = parent.id, lft = pos, "insert node");
        Ok(self.store.save(node).await?)
    }

    /// Place a level-0 node (a site root) after the current maximum bound.
    pub async fn insert_root(&self, mut node: ContentRecord) -> Result<ContentRecord, AppError> {
        let rows = self.store.find(&ContentFilter::live()).await?;
        let pos = rows.iter().map(|r| r.rght).max().unwrap_or(0) + 1;
        node.parent_id = None;
        node.level = 0;
        node.lft = pos;
        node.rght = pos + 1;
        debug!(id = node.id, lft = pos, "insert root node");
        Ok(self.store.save(node).await?)
    }

    /// Relocate the subtree rooted at `id` under `new_parent_id`, optionally
    /// before a named sibling. Rejects moves into the node's own subtree with
    /// `CyclicMove`. All-or-nothing under the caller's transaction.
    pub async fn move_node(
        &self,
        id: ContentId,
        new_parent_id: ContentId,
        before: Option<ContentId>,
    ) -> Result<ContentRecord, AppError> {
        let node = self.live(id).await?;
        let parent = self.live(new_parent_id).await?;
        if parent.id == node.id || node.contains(&parent) {
            return Err(DomainError::cyclic_move(id, new_parent_id).into());
        }

        let pos = match before {
            Some(sibling_id) if sibling_id == id => return Ok(node),
            Some(sibling_id) => {
                let sibling = self.live(sibling_id).await?;
                if node.contains(&sibling) {
                    return Err(DomainError::cyclic_move(id, sibling_id).into());
                }
                self.sibling_position(new_parent_id, sibling_id).await?
            }
            None => parent.rght,
        };

        let old_lft = node.lft;
        let old_rght = node.rght;
        let width = node.width();
        let level_delta = parent.level + 1 - node.level;

        let rows = self.store.find(&ContentFilter::live()).await?;
        let (mut subtree, mut rest): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|r| r.lft >= old_lft && r.rght <= old_rght);

        // Close the gap at the origin.
        for row in &mut rest {
            if row.lft > old_rght {
                row.lft -= width;
            }
            if row.rght > old_rght {
                row.rght -= width;
            }
        }
        let pos = if pos > old_rght { pos - width } else { pos };

        // Open a gap of the subtree's width at the destination.
        for row in &mut rest {
            if row.lft >= pos {
                row.lft += width;
            }
            if row.rght >= pos {
                row.rght += width;
            }
        }

        let offset = pos - old_lft;
        for row in &mut subtree {
            row.lft += offset;
            row.rght += offset;
            row.level += level_delta;
            if row.id == id {
                row.parent_id = Some(parent.id);
            }
        }

        for row in rest {
            self.store.save(row).await?;
        }
        let mut moved = None;
        for row in subtree {
            let saved = self.store.save(row).await?;
            if saved.id == id {
                moved = Some(saved);
            }
        }
        debug!(id, new_parent = new_parent_id, offset, "move subtree");
        moved.ok_or_else(|| DomainError::invariant(format!("moved node `{id}` vanished")).into())
    }

    /// Remove the subtree rooted at `id` from live numbering and close the
    /// gap. Returns the affected rows with their bounds left stale; the
    /// caller must mark or delete them before the transaction commits.
    pub async fn detach(&self, id: ContentId) -> Result<Vec<ContentRecord>, AppError> {
        let node = self.live(id).await?;
        let old_lft = node.lft;
        let old_rght = node.rght;
        let width = node.width();

        let rows = self.store.find(&ContentFilter::live()).await?;
        let (subtree, rest): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|r| r.lft >= old_lft && r.rght <= old_rght);

        for mut row in rest {
            let mut changed = false;
            if row.lft > old_rght {
                row.lft -= width;
                changed = true;
            }
            if row.rght > old_rght {
                row.rght -= width;
                changed = true;
            }
            if changed {
                self.store.save(row).await?;
            }
        }
        debug!(id, width, nodes = subtree.len(), "detach subtree");
        Ok(subtree)
    }

    /// Insertion point immediately before `sibling_id`, validating that it is
    /// actually a child of `parent_id`.
    async fn sibling_position(
        &self,
        parent_id: ContentId,
        sibling_id: ContentId,
    ) -> Result<i64, AppError> {
        let sibling = self.live(sibling_id).await?;
        if sibling.parent_id != Some(parent_id) {
            return Err(AppError::validation(format!(
                "content `{sibling_id}` is not a child of `{parent_id}`"
            )));
        }
        Ok(sibling.lft)
    }
}
