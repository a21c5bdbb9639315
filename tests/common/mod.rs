//! Shared harness for the integration suites: in-memory adapters, a seeded
//! site layout, and a structural soundness check for the nested-set index.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use time::macros::datetime;
use url::Url;

use canopy::application::repos::{ContentFilter, NodeStore};
use canopy::application::service::{ContentTreeService, CreateContent};
use canopy::domain::content::{ContentId, ContentRecord, ContentType};
use canopy::domain::site::SiteRecord;
use canopy::infra::memory::{
    MemoryNodeStore, MemoryPayloadRepo, MemorySiteRegistry, RecordingSearchNotifier,
};

pub struct Harness {
    pub store: Arc<MemoryNodeStore>,
    pub payloads: Arc<MemoryPayloadRepo>,
    pub search: Arc<RecordingSearchNotifier>,
    pub service: ContentTreeService,
}

pub fn main_site() -> SiteRecord {
    SiteRecord {
        id: 0,
        name: "main".to_string(),
        title: "Main".to_string(),
        alias: String::new(),
        use_subdomain: false,
        secure: false,
        device: None,
        main_site_id: None,
        same_main_url: false,
        status: true,
    }
}

pub fn sub_site(id: i64, alias: &str, use_subdomain: bool) -> SiteRecord {
    SiteRecord {
        id,
        name: alias.to_string(),
        title: alias.to_string(),
        alias: alias.to_string(),
        use_subdomain,
        secure: false,
        device: None,
        main_site_id: Some(0),
        same_main_url: false,
        status: true,
    }
}

pub async fn harness(sites: Vec<SiteRecord>) -> Harness {
    let store = Arc::new(MemoryNodeStore::new());
    let payloads = Arc::new(MemoryPayloadRepo::new());
    let search = RecordingSearchNotifier::shared();
    let service = ContentTreeService::new(
        store.clone(),
        Arc::new(MemorySiteRegistry::new(sites)),
        payloads.clone(),
        search.clone(),
        Url::parse("https://main.com/").expect("static URL parses"),
    );
    Harness {
        store,
        payloads,
        search,
        service,
    }
}

/// Seed the main site's root folder (id 1) directly; everything else should
/// go through the service so the index stays maintained.
pub async fn seed_root(harness: &Harness) -> ContentRecord {
    let root = ContentRecord {
        id: 1,
        site_id: 0,
        parent_id: None,
        lft: 1,
        rght: 2,
        level: 0,
        content_type: ContentType::ContentFolder,
        plugin: "core".to_string(),
        entity_id: None,
        url: "/".to_string(),
        name: String::new(),
        title: "Home".to_string(),
        status: true,
        self_status: true,
        self_publish_begin: None,
        self_publish_end: None,
        alias_id: None,
        main_site_content_id: None,
        site_root: true,
        deleted_date: None,
        exclude_menu: false,
        exclude_search: false,
        blank_link: false,
        layout_template: None,
        created: datetime!(2024-01-01 00:00 UTC),
        modified: datetime!(2024-01-01 00:00 UTC),
    };
    harness.store.seed(root.clone()).await;
    root
}

pub fn create_folder(parent_id: ContentId, name: &str, title: &str) -> CreateContent {
    CreateContent {
        site_id: 0,
        parent_id,
        content_type: ContentType::ContentFolder,
        plugin: "core".to_string(),
        entity_id: None,
        name: name.to_string(),
        title: title.to_string(),
        self_status: true,
    }
}

pub fn create_page(
    parent_id: ContentId,
    name: &str,
    title: &str,
    entity_id: i64,
) -> CreateContent {
    CreateContent {
        site_id: 0,
        parent_id,
        content_type: ContentType::Page,
        plugin: "core".to_string(),
        entity_id: Some(entity_id),
        name: name.to_string(),
        title: title.to_string(),
        self_status: true,
    }
}

/// Assert the structural invariants of the live tree: unique in-order
/// bounds, containment iff parent-chain ancestry, odd widths matching the
/// descendant count, and levels derived from the parent.
pub async fn assert_tree_sound(store: &MemoryNodeStore) {
    let rows = store
        .find(&ContentFilter::live())
        .await
        .expect("live query");
    let by_id: BTreeMap<ContentId, &ContentRecord> =
        rows.iter().map(|row| (row.id, row)).collect();

    let mut bounds: Vec<i64> = Vec::new();
    for row in &rows {
        assert!(row.rght > row.lft, "bounds out of order on {}", row.id);
        bounds.push(row.lft);
        bounds.push(row.rght);
        if let Some(parent_id) = row.parent_id {
            let parent = by_id
                .get(&parent_id)
                .unwrap_or_else(|| panic!("live node {} has trashed parent {parent_id}", row.id));
            assert_eq!(
                row.level,
                parent.level + 1,
                "level mismatch on {}",
                row.id
            );
        } else {
            assert_eq!(row.level, 0, "root {} must be level 0", row.id);
        }
    }
    let unique: std::collections::BTreeSet<i64> = bounds.iter().copied().collect();
    assert_eq!(unique.len(), bounds.len(), "duplicate nested-set bounds");

    for a in &rows {
        let descendants = rows
            .iter()
            .filter(|b| b.id != a.id && is_ancestor(&by_id, a.id, b.id))
            .count() as i64;
        assert_eq!(
            a.rght - a.lft,
            2 * descendants + 1,
            "width mismatch on {}",
            a.id
        );
        for b in &rows {
            if a.id == b.id {
                continue;
            }
            let contains = a.lft < b.lft && a.rght > b.rght;
            assert_eq!(
                contains,
                is_ancestor(&by_id, a.id, b.id),
                "containment/ancestry disagree for {} and {}",
                a.id,
                b.id
            );
        }
    }
}

fn is_ancestor(
    by_id: &BTreeMap<ContentId, &ContentRecord>,
    ancestor: ContentId,
    descendant: ContentId,
) -> bool {
    let mut current = by_id.get(&descendant).and_then(|row| row.parent_id);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = by_id.get(&id).and_then(|row| row.parent_id);
    }
    false
}

/// Ids of all live rows in tree order.
pub async fn live_ids(store: &MemoryNodeStore) -> Vec<ContentId> {
    store
        .find(&ContentFilter::live())
        .await
        .expect("live query")
        .iter()
        .map(|row| row.id)
        .collect()
}
