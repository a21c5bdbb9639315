//! Shared fixtures for the unit test modules.

use std::sync::Arc;

use time::macros::datetime;
use url::Url;

use crate::application::service::ContentTreeService;
use crate::domain::content::{ContentId, ContentRecord, ContentType};
use crate::domain::site::SiteRecord;
use crate::infra::memory::{
    MemoryNodeStore, MemoryPayloadRepo, MemorySiteRegistry, RecordingSearchNotifier,
};

/// A published folder with placeholder bounds.
pub fn folder(id: ContentId, parent: Option<ContentId>) -> ContentRecord {
    ContentRecord {
        id,
        site_id: 0,
        parent_id: parent,
        lft: 1,
        rght: 2,
        level: 0,
        content_type: ContentType::ContentFolder,
        plugin: "core".to_string(),
        entity_id: None,
        url: "/".to_string(),
        name: String::new(),
        title: format!("node {id}"),
        status: true,
        self_status: true,
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
        created: datetime!(2024-01-01 00:00 UTC),
        modified: datetime!(2024-01-01 00:00 UTC),
    }
}

/// A published page owning a payload row.
pub fn page(id: ContentId, parent: Option<ContentId>, entity_id: i64) -> ContentRecord {
    let mut record = folder(id, parent);
    record.content_type = ContentType::Page;
    record.entity_id = Some(entity_id);
    record.title = format!("page {id}");
    record
}

/// Seed a store with folders at fixed `(id, parent, lft, rght, level)`.
pub async fn seeded_store(
    rows: &[(ContentId, Option<ContentId>, i64, i64, i32)],
) -> Arc<MemoryNodeStore> {
    let store = Arc::new(MemoryNodeStore::new());
    for &(id, parent, lft, rght, level) in rows {
        let mut record = folder(id, parent);
        record.lft = lft;
        record.rght = rght;
        record.level = level;
        store.seed(record).await;
    }
    store
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

/// A service over the given store, a main-site-only registry, and recording
/// collaborators.
pub async fn sample_service(store: Arc<MemoryNodeStore>) -> ContentTreeService {
    ContentTreeService::new(
        store,
        Arc::new(MemorySiteRegistry::new(vec![main_site()])),
        Arc::new(MemoryPayloadRepo::new()),
        Arc::new(RecordingSearchNotifier::new()),
        Url::parse("https://main.com/").expect("static URL parses"),
    )
}
