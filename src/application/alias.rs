//! Cross-site aliasing: secondary tree entries mirroring a canonical node.
//!
//! An alias owns its own position, `url` and `site_id` but borrows the
//! canonical node's payload identity. The back-reference is a non-owning
//! foreign key (`alias_id`); cascades are explicit join queries, never
//! pointer traversal. Chains are rejected at creation, so resolution is
//! always a single hop.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use crate::application::error::AppError;
use crate::application::indexer::TreeIndexer;
use crate::application::repos::{ContentFilter, NodeStore};
use crate::application::urls::derive_url;
use crate::domain::content::{ContentId, ContentRecord, SiteId};
use crate::domain::error::DomainError;

/// Placement and overrides for a new alias.
#[derive(Debug, Clone)]
pub struct AliasParams {
    pub site_id: SiteId,
    pub parent_id: ContentId,
    pub title: Option<String>,
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct AliasResolver {
    store: Arc<dyn NodeStore>,
    indexer: TreeIndexer,
}

impl AliasResolver {
    pub fn new(store: Arc<dyn NodeStore>, indexer: TreeIndexer) -> Self {
        Self { store, indexer }
    }

    /// Create an alias of `canonical_id` under `params.parent_id`, copying
    /// the canonical node's payload identity. The target must not itself be
    /// an alias.
    pub async fn create_alias(
        &self,
        canonical_id: ContentId,
        params: AliasParams,
    ) -> Result<ContentRecord, AppError> {
        let canonical = self.indexer.live(canonical_id).await?;
        if canonical.is_alias() {
            return Err(DomainError::validation(format!(
                "content `{canonical_id}` is itself an alias; alias its canonical node instead"
            ))
            .into());
        }
        let parent = self.indexer.live(params.parent_id).await?;
        if !parent.content_type.is_folder() {
            return Err(AppError::validation(format!(
                "content `{}` is not a folder", parent.id
            )));
        }

        let now = OffsetDateTime::now_utc();
        let name = params.name.unwrap_or_else(|| canonical.name.clone());
        let record = ContentRecord {
            id: self.store.next_id().await?,
            site_id: params.site_id,
            parent_id: Some(parent.id),
            lft: 0,
            rght: 0,
            level: 0,
            content_type: canonical.content_type,
            plugin: canonical.plugin.clone(),
            entity_id: canonical.entity_id,
            url: derive_url(&parent.url, &name),
            name,
            title: params.title.unwrap_or_else(|| canonical.title.clone()),
            status: canonical.status,
            self_status: canonical.self_status,
            self_publish_begin: None,
            self_publish_end: None,
            alias_id: Some(canonical.id),
            main_site_content_id: None,
            site_root: false,
            deleted_date: None,
            exclude_menu: false,
            exclude_search: false,
            blank_link: false,
            layout_template: None,
            created: now,
            modified: now,
        };
        let saved = self.indexer.insert(record, parent.id, None).await?;
        debug!(alias = saved.id, canonical = canonical.id, "created alias");
        Ok(saved)
    }

    /// Read view of a node with alias indirection applied: payload identity
    /// comes from the canonical node, position / `url` / `site_id` stay the
    /// alias's own. Non-aliases pass through unchanged.
    pub async fn resolve(&self, id: ContentId) -> Result<ContentRecord, AppError> {
        let row = self.indexer.live(id).await?;
        let Some(canonical_id) = row.alias_id else {
            return Ok(row);
        };
        let canonical = self
            .store
            .get(canonical_id)
            .await?
            .ok_or_else(|| {
                DomainError::invariant(format!(
                    "alias `{id}` references missing canonical `{canonical_id}`"
                ))
            })?;
        let mut merged = row;
        merged.content_type = canonical.content_type;
        merged.plugin = canonical.plugin;
        merged.entity_id = canonical.entity_id;
        merged.title = canonical.title;
        Ok(merged)
    }

    /// Every live alias pointing at `id`. The explicit join query delete
    /// cascades are built on.
    pub async fn aliases_of(&self, id: ContentId) -> Result<Vec<ContentRecord>, AppError> {
        Ok(self
            .store
            .find(&ContentFilter {
                alias_of: Some(id),
                ..ContentFilter::default()
            })
            .await?)
    }
}
