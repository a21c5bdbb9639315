//! The public contract of the content tree engine.
//!
//! `ContentTreeService` orchestrates the indexer, trash manager, alias
//! resolver, publish evaluator and URL resolver behind one API. Every
//! structural mutation runs between `NodeStore::begin` and `commit`, rolling
//! back on any error, so a half-applied reindex is never observable. Search
//! notification is best-effort: failures are logged at WARN and never fail
//! the mutation. Registered observers run synchronously; a `before_save`
//! hook may rewrite the record or abort the mutation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::warn;
use url::Url;

use crate::application::alias::{AliasParams, AliasResolver};
use crate::application::error::AppError;
use crate::application::indexer::TreeIndexer;
use crate::application::publish::{PublishStateEvaluator, StatusFields};
use crate::application::repos::{
    ContentFilter, NodeStore, PayloadRepo, SearchNotifier, SiteRegistry,
};
use crate::application::trash::{PurgeOutcome, TrashManager};
use crate::application::urls::{UrlResolver, derive_url};
use crate::domain::content::{ContentId, ContentRecord, ContentType, SiteId};
use crate::domain::error::DomainError;

/// Synchronous extension hooks around mutations. `before_save` may rewrite
/// the record, or abort by returning an error; aborts surface to the caller
/// as [`AppError::Aborted`] and roll the mutation back.
#[async_trait]
pub trait ContentObserver: Send + Sync {
    async fn before_save(&self, record: ContentRecord) -> Result<ContentRecord, AppError> {
        Ok(record)
    }

    async fn after_save(&self, _record: &ContentRecord) {}

    async fn after_delete(&self, _id: ContentId) {}
}

#[derive(Debug, Clone)]
pub struct CreateContent {
    pub site_id: SiteId,
    pub parent_id: ContentId,
    pub content_type: ContentType,
    pub plugin: String,
    pub entity_id: Option<i64>,
    pub name: String,
    pub title: String,
    pub self_status: bool,
}

#[derive(Debug, Clone)]
pub struct RenameContent {
    pub title: String,
    /// Explicit new name; wins over `regenerate_name`.
    pub name: Option<String>,
    /// Re-derive `name` from the new title.
    pub regenerate_name: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Publish,
    Unpublish,
    Delete,
}

/// Per-item batch outcome. Items commit independently; processing stops at
/// the first failure, leaving earlier ids committed.
#[derive(Debug)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub first_error: Option<(ContentId, AppError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborField {
    Lft,
    Id,
}

#[derive(Debug, Clone)]
pub struct NeighborQuery {
    pub field: NeighborField,
    pub value: i64,
    pub conditions: ContentFilter,
}

#[derive(Debug, Clone)]
pub struct Neighbors {
    pub prev: Option<ContentRecord>,
    pub next: Option<ContentRecord>,
}

/// One entry of a rendered navigation tree.
#[derive(Debug, Clone)]
pub struct NaviNode {
    pub record: ContentRecord,
    pub children: Vec<NaviNode>,
}

pub struct ContentTreeService {
    store: Arc<dyn NodeStore>,
    search: Arc<dyn SearchNotifier>,
    indexer: TreeIndexer,
    trash: TrashManager,
    aliases: AliasResolver,
    publisher: PublishStateEvaluator,
    urls: UrlResolver,
    observers: Vec<Arc<dyn ContentObserver>>,
}

impl ContentTreeService {
    pub fn new(
        store: Arc<dyn NodeStore>,
        sites: Arc<dyn SiteRegistry>,
        payloads: Arc<dyn PayloadRepo>,
        search: Arc<dyn SearchNotifier>,
        base_url: Url,
    ) -> Self {
        let indexer = TreeIndexer::new(store.clone());
        let trash = TrashManager::new(store.clone(), payloads, indexer.clone());
        let aliases = AliasResolver::new(store.clone(), indexer.clone());
        let publisher = PublishStateEvaluator::new(store.clone(), indexer.clone());
        let urls = UrlResolver::new(store.clone(), sites, base_url);
        Self {
            store,
            search,
            indexer,
            trash,
            aliases,
            publisher,
            urls,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ContentObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// URL encode/decode entry points.
    pub fn urls(&self) -> &UrlResolver {
        &self.urls
    }

    // ----- read path -----

    /// A live node, or `NotFound` when absent or trashed.
    pub async fn get(&self, id: ContentId) -> Result<ContentRecord, AppError> {
        self.indexer.live(id).await
    }

    /// A trashed node, or `NotFound` when absent or still live.
    pub async fn get_trash(&self, id: ContentId) -> Result<ContentRecord, AppError> {
        match self.store.get(id).await? {
            Some(record) if record.is_trashed() => Ok(record),
            _ => Err(AppError::not_found(id)),
        }
    }

    pub async fn exists(&self, id: ContentId) -> Result<bool, AppError> {
        Ok(self
            .store
            .get(id)
            .await?
            .is_some_and(|record| !record.is_trashed()))
    }

    /// Direct children in sibling order; `None` when `id` is absent, trashed
    /// or not a folder.
    pub async fn get_children(
        &self,
        id: ContentId,
    ) -> Result<Option<Vec<ContentRecord>>, AppError> {
        match self.store.get(id).await? {
            Some(record) if !record.is_trashed() && record.content_type.is_folder() => Ok(Some(
                self.store.find(&ContentFilter::children_of(id)).await?,
            )),
            _ => Ok(None),
        }
    }

    /// Parent node; `None` for a root. Absent/trashed `id` is `NotFound`.
    pub async fn get_parent(&self, id: ContentId) -> Result<Option<ContentRecord>, AppError> {
        let record = self.indexer.live(id).await?;
        match record.parent_id {
            Some(parent_id) => Ok(Some(self.indexer.live(parent_id).await?)),
            None => Ok(None),
        }
    }

    /// Ancestor chain root → node, including the node itself.
    pub async fn get_path(&self, id: ContentId) -> Result<Vec<ContentRecord>, AppError> {
        let record = self.indexer.live(id).await?;
        let mut chain: Vec<ContentRecord> = self
            .store
            .find(&ContentFilter::live())
            .await?
            .into_iter()
            .filter(|row| row.contains(&record))
            .collect();
        chain.push(record);
        Ok(chain)
    }

    /// Nearest rows before and after `value` on the given ordering field,
    /// among rows matching the extra conditions.
    pub async fn get_neighbors(&self, query: &NeighborQuery) -> Result<Neighbors, AppError> {
        let rows = self.store.find(&query.conditions).await?;
        let key = |row: &ContentRecord| match query.field {
            NeighborField::Lft => row.lft,
            NeighborField::Id => row.id,
        };
        let prev = rows
            .iter()
            .filter(|row| key(row) < query.value)
            .max_by_key(|row| key(row))
            .cloned();
        let next = rows
            .iter()
            .filter(|row| key(row) > query.value)
            .min_by_key(|row| key(row))
            .cloned();
        Ok(Neighbors { prev, next })
    }

    /// Breadcrumb chain: the path with `exclude_menu` entries dropped, except
    /// for the queried node's immediate parent.
    pub async fn get_crumbs(&self, id: ContentId) -> Result<Vec<ContentRecord>, AppError> {
        let record = self.indexer.live(id).await?;
        let parent_id = record.parent_id;
        Ok(self
            .get_path(id)
            .await?
            .into_iter()
            .filter(|row| !row.exclude_menu || Some(row.id) == parent_id)
            .collect())
    }

    /// Visible siblings of `id` (same parent, published, not menu-excluded),
    /// in sibling order.
    pub async fn get_local_navi(&self, id: ContentId) -> Result<Vec<ContentRecord>, AppError> {
        let record = self.indexer.live(id).await?;
        let siblings = match record.parent_id {
            Some(parent_id) => {
                self.store
                    .find(&ContentFilter::children_of(parent_id))
                    .await?
            }
            None => self
                .store
                .find(&ContentFilter::live())
                .await?
                .into_iter()
                .filter(|row| row.parent_id.is_none())
                .collect(),
        };
        Ok(siblings
            .into_iter()
            .filter(|row| row.status && !row.exclude_menu)
            .collect())
    }

    /// Menu tree under a site's root: published, not menu-excluded nodes; an
    /// invisible branch hides its whole subtree.
    pub async fn get_global_navi(&self, site_id: SiteId) -> Result<Vec<NaviNode>, AppError> {
        let root = self.get_site_root(site_id).await?;
        let visible: Vec<ContentRecord> = self
            .store
            .find(&ContentFilter::descendants_of(&root))
            .await?
            .into_iter()
            .filter(|row| row.status && !row.exclude_menu)
            .collect();

        // Assemble bottom-up: rows arrive in ascending lft (parents first),
        // so in reverse every node's children are already collected.
        let mut children_of: BTreeMap<ContentId, Vec<NaviNode>> = BTreeMap::new();
        for record in visible.into_iter().rev() {
            let Some(parent_id) = record.parent_id else {
                continue;
            };
            let mut children = children_of.remove(&record.id).unwrap_or_default();
            children.reverse();
            children_of
                .entry(parent_id)
                .or_default()
                .push(NaviNode { record, children });
        }
        let mut top = children_of.remove(&root.id).unwrap_or_default();
        top.reverse();
        Ok(top)
    }

    pub async fn get_site_root(&self, site_id: SiteId) -> Result<ContentRecord, AppError> {
        self.store
            .find(&ContentFilter {
                site_id: Some(site_id),
                site_root: Some(true),
                ..ContentFilter::default()
            })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DomainError::invariant(format!("site `{site_id}` has no root node")).into()
            })
    }

    /// Nearest ancestor's layout template, if any ancestor sets one.
    pub async fn get_parent_layout_template(
        &self,
        id: ContentId,
    ) -> Result<Option<String>, AppError> {
        let mut path = self.get_path(id).await?;
        path.pop();
        Ok(path
            .into_iter()
            .rev()
            .find_map(|row| row.layout_template.filter(|t| !t.is_empty())))
    }

    pub async fn get_titles_by_id(
        &self,
        ids: &[ContentId],
    ) -> Result<BTreeMap<ContentId, String>, AppError> {
        let mut titles = BTreeMap::new();
        for &id in ids {
            if let Some(record) = self.store.get(id).await?
                && !record.is_trashed()
            {
                titles.insert(id, record.title);
            }
        }
        Ok(titles)
    }

    pub async fn exists_content_by_url(&self, url: &str) -> Result<bool, AppError> {
        Ok(!self
            .store
            .find(&ContentFilter {
                url: Some(url.to_string()),
                ..ContentFilter::default()
            })
            .await?
            .is_empty())
    }

    /// Alias-transparent read view of a node.
    pub async fn resolve_alias(&self, id: ContentId) -> Result<ContentRecord, AppError> {
        self.aliases.resolve(id).await
    }

    // ----- mutations -----

    /// Create a node under a live folder, derive its `url`, compute its
    /// aggregate publish status, index it for search.
    pub async fn create(&self, command: CreateContent) -> Result<ContentRecord, AppError> {
        self.store.begin().await?;
        let result = self.create_inner(command).await;
        let created = self.finish(result).await?;
        self.observers_after_save(&created).await;
        self.notify_upsert(&created).await;
        Ok(created)
    }

    async fn create_inner(&self, command: CreateContent) -> Result<ContentRecord, AppError> {
        let parent = self.indexer.live(command.parent_id).await?;
        if !parent.content_type.is_folder() {
            return Err(AppError::validation(format!(
                "content `{}` is not a folder",
                parent.id
            )));
        }
        let now = OffsetDateTime::now_utc();
        let record = ContentRecord {
            id: self.store.next_id().await?,
            site_id: command.site_id,
            parent_id: Some(parent.id),
            lft: 0,
            rght: 0,
            level: 0,
            content_type: command.content_type,
            plugin: command.plugin,
            entity_id: command.entity_id,
            url: derive_url(&parent.url, &command.name),
            name: command.name,
            title: command.title,
            status: false,
            self_status: command.self_status,
            self_publish_begin: None,
            self_publish_end: None,
            alias_id: None,
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
        let record = self.run_before_save(record).await?;
        let mut saved = self.indexer.insert(record, parent.id, None).await?;
        saved.status = self.publisher.effective_status(&saved, now).await?;
        Ok(self.store.save(saved).await?)
    }

    /// Relocate a subtree and recompute its persisted URLs. Sub-site
    /// counterparts linked through `main_site_content_id` follow best-effort
    /// when their own destination parent exists.
    pub async fn move_content(
        &self,
        id: ContentId,
        new_parent_id: ContentId,
        before: Option<ContentId>,
    ) -> Result<ContentRecord, AppError> {
        self.store.begin().await?;
        let result = self.move_inner(id, new_parent_id, before).await;
        let moved = self.finish(result).await?;
        self.observers_after_save(&moved).await;
        self.move_counterparts(id, new_parent_id).await;
        self.notify_upsert(&moved).await;
        Ok(moved)
    }

    async fn move_inner(
        &self,
        id: ContentId,
        new_parent_id: ContentId,
        before: Option<ContentId>,
    ) -> Result<ContentRecord, AppError> {
        self.indexer.move_node(id, new_parent_id, before).await?;
        self.refresh_subtree_urls(id).await?;
        self.indexer.live(id).await
    }

    async fn move_counterparts(&self, id: ContentId, new_parent_id: ContentId) {
        let rows = match self.store.find(&ContentFilter::live()).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "counterpart lookup failed after move");
                return;
            }
        };
        for counterpart in rows.iter().filter(|r| r.main_site_content_id == Some(id)) {
            let Some(target_parent) = rows.iter().find(|r| {
                r.main_site_content_id == Some(new_parent_id) && r.site_id == counterpart.site_id
            }) else {
                continue;
            };
            let begun = self.store.begin().await;
            if let Err(err) = begun {
                warn!(error = %err, "skipping counterpart move");
                continue;
            }
            let result = self.move_inner(counterpart.id, target_parent.id, None).await;
            if let Err(err) = self.finish(result).await {
                warn!(
                    counterpart = counterpart.id,
                    error = %err,
                    "counterpart move failed"
                );
            }
        }
    }

    /// Deep-copy a subtree under a new parent. Copies get fresh ids and
    /// derived URLs; payload references are shared with the source.
    pub async fn copy(
        &self,
        id: ContentId,
        new_parent_id: ContentId,
        title: Option<String>,
        site_id: Option<SiteId>,
    ) -> Result<ContentRecord, AppError> {
        self.store.begin().await?;
        let result = self.copy_inner(id, new_parent_id, title, site_id).await;
        let copied = self.finish(result).await?;
        self.observers_after_save(&copied).await;
        self.notify_upsert(&copied).await;
        Ok(copied)
    }

    async fn copy_inner(
        &self,
        id: ContentId,
        new_parent_id: ContentId,
        title: Option<String>,
        site_id: Option<SiteId>,
    ) -> Result<ContentRecord, AppError> {
        let source = self.indexer.live(id).await?;
        let parent = self.indexer.live(new_parent_id).await?;
        if !parent.content_type.is_folder() {
            return Err(AppError::validation(format!(
                "content `{new_parent_id}` is not a folder"
            )));
        }
        if parent.id == source.id || source.contains(&parent) {
            return Err(AppError::validation(format!(
                "cannot copy `{id}` into its own subtree"
            )));
        }

        let mut rows = vec![source.clone()];
        rows.extend(self.store.find(&ContentFilter::descendants_of(&source)).await?);
        let now = OffsetDateTime::now_utc();
        let target_site = site_id.unwrap_or(parent.site_id);
        let mut new_ids: BTreeMap<ContentId, ContentId> = BTreeMap::new();
        let mut paths: BTreeMap<ContentId, String> = BTreeMap::new();
        let mut copied_root = None;

        // Ascending lft: every row's parent is copied before the row itself.
        for row in rows {
            let (target_parent, base_url) = if row.id == source.id {
                (parent.id, parent.url.clone())
            } else {
                let old_parent = row.parent_id.ok_or_else(|| {
                    DomainError::invariant(format!("descendant `{}` has no parent", row.id))
                })?;
                let mapped = *new_ids.get(&old_parent).ok_or_else(|| {
                    DomainError::invariant(format!("copy order broken at `{}`", row.id))
                })?;
                (mapped, paths[&mapped].clone())
            };

            let mut copy = row.clone();
            copy.id = self.store.next_id().await?;
            copy.site_id = target_site;
            copy.main_site_content_id = None;
            copy.site_root = false;
            copy.url = derive_url(&base_url, &copy.name);
            copy.created = now;
            copy.modified = now;
            if row.id == source.id {
                if let Some(title) = &title {
                    copy.title = title.clone();
                }
                copy = self.run_before_save(copy).await?;
            }
            new_ids.insert(row.id, copy.id);
            let saved = self.indexer.insert(copy, target_parent, None).await?;
            paths.insert(saved.id, saved.url.clone());
            if row.id == source.id {
                copied_root = Some(saved);
            }
        }
        copied_root
            .ok_or_else(|| DomainError::invariant(format!("copy of `{id}` produced no root")).into())
    }

    /// Create an alias of `canonical_id`; see [`AliasResolver::create_alias`].
    pub async fn alias(
        &self,
        canonical_id: ContentId,
        params: AliasParams,
    ) -> Result<ContentRecord, AppError> {
        self.store.begin().await?;
        let result = self.aliases.create_alias(canonical_id, params).await;
        let created = self.finish(result).await?;
        self.observers_after_save(&created).await;
        self.notify_upsert(&created).await;
        Ok(created)
    }

    pub async fn publish(&self, id: ContentId) -> Result<ContentRecord, AppError> {
        let now = OffsetDateTime::now_utc();
        self.store.begin().await?;
        let result = self.publisher.publish(id, now).await;
        let record = self.finish(result).await?;
        self.observers_after_save(&record).await;
        self.notify_upsert(&record).await;
        Ok(record)
    }

    pub async fn unpublish(&self, id: ContentId) -> Result<ContentRecord, AppError> {
        let now = OffsetDateTime::now_utc();
        self.store.begin().await?;
        let result = self.publisher.unpublish(id, now).await;
        let record = self.finish(result).await?;
        self.observers_after_save(&record).await;
        self.notify_upsert(&record).await;
        Ok(record)
    }

    /// Delete a node: an alias is removed permanently (aliases never enter
    /// the trash); anything else is soft-deleted with its subtree, and every
    /// alias of the subtree is removed permanently alongside.
    pub async fn delete(&self, id: ContentId) -> Result<(), AppError> {
        self.store.begin().await?;
        let result = self.delete_inner(id).await;
        let removed = self.finish(result).await?;
        for removed_id in removed {
            self.observers_after_delete(removed_id).await;
            self.notify_remove(removed_id).await;
        }
        Ok(())
    }

    /// Explicitly-recursive spelling of [`delete`](Self::delete); the
    /// nested-set delete always carries the subtree.
    pub async fn delete_recursive(&self, id: ContentId) -> Result<(), AppError> {
        self.delete(id).await
    }

    async fn delete_inner(&self, id: ContentId) -> Result<Vec<ContentId>, AppError> {
        let row = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(id))?;
        if row.is_alias() {
            self.trash.hard_delete(id, false).await?;
            return Ok(vec![id]);
        }
        // Already trashed: stale bounds must not drive a second cascade.
        if row.is_trashed() {
            return Ok(Vec::new());
        }

        let descendants = self.store.find(&ContentFilter::descendants_of(&row)).await?;
        let mut canonical_ids = vec![row.id];
        let mut alias_ids = BTreeSet::new();
        for descendant in &descendants {
            if descendant.is_alias() {
                alias_ids.insert(descendant.id);
            } else {
                canonical_ids.push(descendant.id);
            }
        }
        // Mirrors elsewhere pointing into the doomed subtree go with it.
        for &canonical_id in &canonical_ids {
            for alias in self.aliases.aliases_of(canonical_id).await? {
                alias_ids.insert(alias.id);
            }
        }

        let mut removed: Vec<ContentId> = Vec::new();
        for alias_id in alias_ids {
            self.trash.hard_delete(alias_id, false).await?;
            removed.push(alias_id);
        }
        self.trash.soft_delete(id).await?;
        removed.extend(canonical_ids);
        Ok(removed)
    }

    /// Permanently purge a node (and with `cascade`, its subtree), together
    /// with every alias of a purged node.
    pub async fn hard_delete(
        &self,
        id: ContentId,
        cascade: bool,
    ) -> Result<PurgeOutcome, AppError> {
        self.store.begin().await?;
        let result = self.hard_delete_inner(id, cascade).await;
        let outcome = self.finish(result).await?;
        for &purged_id in &outcome.purged {
            self.observers_after_delete(purged_id).await;
            self.notify_remove(purged_id).await;
        }
        Ok(outcome)
    }

    async fn hard_delete_inner(
        &self,
        id: ContentId,
        cascade: bool,
    ) -> Result<PurgeOutcome, AppError> {
        let row = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(id))?;

        let mut canonical_ids = vec![row.id];
        if cascade && !row.is_trashed() {
            let descendants = self.store.find(&ContentFilter::descendants_of(&row)).await?;
            canonical_ids.extend(descendants.iter().map(|r| r.id));
        }
        let mut alias_ids = BTreeSet::new();
        for &canonical_id in &canonical_ids {
            for alias in self.aliases.aliases_of(canonical_id).await? {
                if !canonical_ids.contains(&alias.id) {
                    alias_ids.insert(alias.id);
                }
            }
        }

        let mut outcome = PurgeOutcome::default();
        for alias_id in alias_ids {
            let alias_outcome = self.trash.hard_delete(alias_id, false).await?;
            outcome.purged.extend(alias_outcome.purged);
            outcome.warnings.extend(alias_outcome.warnings);
        }
        let root_outcome = self.trash.hard_delete(id, cascade).await?;
        outcome.purged.extend(root_outcome.purged);
        outcome.warnings.extend(root_outcome.warnings);
        Ok(outcome)
    }

    pub async fn restore(&self, id: ContentId) -> Result<Option<ContentRecord>, AppError> {
        self.store.begin().await?;
        let result = self.trash.restore(id).await;
        let restored = self.finish(result).await?;
        if let Some(record) = &restored {
            self.observers_after_save(record).await;
            self.notify_upsert(record).await;
        }
        Ok(restored)
    }

    pub async fn restore_all(&self, filter: &ContentFilter) -> Result<usize, AppError> {
        self.store.begin().await?;
        let result = self.trash.restore_all(filter).await;
        self.finish(result).await
    }

    /// Apply one action to many ids. Not transactional across ids: each item
    /// commits on its own, and processing stops at the first failure.
    pub async fn batch(&self, action: BatchAction, ids: &[ContentId]) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            attempted: 0,
            succeeded: 0,
            first_error: None,
        };
        for &id in ids {
            outcome.attempted += 1;
            let result = match action {
                BatchAction::Publish => self.publish(id).await.map(|_| ()),
                BatchAction::Unpublish => self.unpublish(id).await.map(|_| ()),
                BatchAction::Delete => self.delete(id).await,
            };
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(err) => {
                    outcome.first_error = Some((id, err));
                    break;
                }
            }
        }
        outcome
    }

    /// Retitle a node, optionally re-deriving its `name`. A name change
    /// recomputes the persisted URL of the node and every descendant. Search
    /// is only notified when a tracked field actually changed.
    pub async fn rename(
        &self,
        id: ContentId,
        command: RenameContent,
    ) -> Result<ContentRecord, AppError> {
        let current = self.indexer.live(id).await?;
        let name = match (command.name, command.regenerate_name) {
            (Some(name), _) => name,
            (None, true) => derive_name(&command.title),
            (None, false) => current.name.clone(),
        };
        let parent_url = match current.parent_id {
            Some(parent_id) => self.indexer.live(parent_id).await?.url,
            None => "/".to_string(),
        };
        let fields = StatusFields {
            title: Some(command.title.clone()),
            url: Some(derive_url(&parent_url, &name)),
            ..StatusFields::default()
        };
        let changed = self.publisher.is_changed_status(id, &fields).await?;

        self.store.begin().await?;
        let result = self.rename_inner(id, command.title, name).await;
        let renamed = self.finish(result).await?;
        self.observers_after_save(&renamed).await;
        if changed {
            self.notify_upsert(&renamed).await;
        }
        Ok(renamed)
    }

    async fn rename_inner(
        &self,
        id: ContentId,
        title: String,
        name: String,
    ) -> Result<ContentRecord, AppError> {
        let mut record = self.indexer.live(id).await?;
        let old_name = record.name.clone();
        record.title = title;
        record.name = name;
        record.modified = OffsetDateTime::now_utc();
        let record = self.run_before_save(record).await?;
        let saved = self.store.save(record).await?;
        if saved.name != old_name {
            self.refresh_subtree_urls(id).await?;
            return self.indexer.live(id).await;
        }
        Ok(saved)
    }

    // ----- internals -----

    /// Recompute persisted URLs for a subtree after its position or a name
    /// changed, walking parents before children.
    async fn refresh_subtree_urls(&self, root_id: ContentId) -> Result<(), AppError> {
        let node = self.indexer.live(root_id).await?;
        let parent_url = match node.parent_id {
            Some(parent_id) => self.indexer.live(parent_id).await?.url,
            None => "/".to_string(),
        };
        let mut rows = vec![node.clone()];
        rows.extend(self.store.find(&ContentFilter::descendants_of(&node)).await?);

        let mut paths: BTreeMap<ContentId, String> = BTreeMap::new();
        for mut row in rows {
            let base = if row.id == root_id {
                parent_url.clone()
            } else {
                let parent_id = row.parent_id.ok_or_else(|| {
                    DomainError::invariant(format!("descendant `{}` has no parent", row.id))
                })?;
                paths.get(&parent_id).cloned().ok_or_else(|| {
                    DomainError::invariant(format!("no recomputed path above `{}`", row.id))
                })?
            };
            let url = derive_url(&base, &row.name);
            paths.insert(row.id, url.clone());
            if row.url != url {
                row.url = url;
                self.store.save(row).await?;
            }
        }
        Ok(())
    }

    async fn finish<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        match result {
            Ok(value) => {
                self.store.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after aborted mutation");
                }
                Err(err)
            }
        }
    }

    async fn run_before_save(&self, mut record: ContentRecord) -> Result<ContentRecord, AppError> {
        for observer in &self.observers {
            record = observer.before_save(record).await.map_err(|err| match err {
                aborted @ AppError::Aborted(_) => aborted,
                other => AppError::Aborted(other.to_string()),
            })?;
        }
        Ok(record)
    }

    async fn observers_after_save(&self, record: &ContentRecord) {
        for observer in &self.observers {
            observer.after_save(record).await;
        }
    }

    async fn observers_after_delete(&self, id: ContentId) {
        for observer in &self.observers {
            observer.after_delete(id).await;
        }
    }

    async fn notify_upsert(&self, record: &ContentRecord) {
        if record.exclude_search {
            self.notify_remove(record.id).await;
            return;
        }
        if let Err(err) = self.search.upsert(record).await {
            warn!(id = record.id, error = %err, "search index update failed");
        }
    }

    async fn notify_remove(&self, id: ContentId) {
        if let Err(err) = self.search.remove(id).await {
            warn!(id, error = %err, "search index removal failed");
        }
    }
}

/// Derived-name rule for `rename`: the title with whitespace collapsed to
/// underscores, lowercased.
fn derive_name(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}
