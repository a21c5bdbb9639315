//! Content tree records mirrored from persistent storage.
//!
//! A `ContentRecord` is one node of the global ordered tree. Ancestry is
//! encoded with nested-set bounds (`lft`/`rght`): a node contains another iff
//! its range strictly contains the other's, so ancestor/descendant tests are
//! plain integer comparisons and never walk parent pointers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of a content node. Stable across moves and renames.
pub type ContentId = i64;

/// Identifier of a site scope. `0` is the shared/main scope.
pub type SiteId = i64;

/// Variant tag of a content node. Non-folder variants own exactly one
/// external payload row, identified by `plugin` + `entity_id`; the tree only
/// tracks that the payload exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    ContentFolder,
    Page,
    MailContent,
    BlogContent,
}

impl ContentType {
    pub fn is_folder(self) -> bool {
        matches!(self, ContentType::ContentFolder)
    }

    /// Folders are pure structure; every other variant owns a payload row.
    pub fn owns_payload(self) -> bool {
        !self.is_folder()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::ContentFolder => "ContentFolder",
            ContentType::Page => "Page",
            ContentType::MailContent => "MailContent",
            ContentType::BlogContent => "BlogContent",
        }
    }
}

impl TryFrom<&str> for ContentType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ContentFolder" => Ok(ContentType::ContentFolder),
            "Page" => Ok(ContentType::Page),
            "MailContent" => Ok(ContentType::MailContent),
            "BlogContent" => Ok(ContentType::BlogContent),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: ContentId,
    pub site_id: SiteId,
    pub parent_id: Option<ContentId>,
    /// Nested-set bounds. Unique across the live tree; stale on trashed rows.
    pub lft: i64,
    pub rght: i64,
    /// Depth, root = 0. Always `parent.level + 1`.
    pub level: i32,
    pub content_type: ContentType,
    pub plugin: String,
    /// Foreign key into the owning plugin's payload table.
    pub entity_id: Option<i64>,
    /// Site-relative path, derived from ancestor names and persisted for
    /// lookup speed. `/` for a site root; a node named `index` collapses to
    /// its parent's path.
    pub url: String,
    pub name: String,
    pub title: String,
    /// Aggregate published flag: own schedule AND every ancestor visible.
    pub status: bool,
    pub self_status: bool,
    pub self_publish_begin: Option<OffsetDateTime>,
    pub self_publish_end: Option<OffsetDateTime>,
    /// When set, this node mirrors the referenced canonical node.
    pub alias_id: Option<ContentId>,
    /// Links a sub-site node to its main-site counterpart.
    pub main_site_content_id: Option<ContentId>,
    pub site_root: bool,
    /// Non-null means the row is in the trash and detached from live
    /// numbering.
    pub deleted_date: Option<OffsetDateTime>,
    pub exclude_menu: bool,
    pub exclude_search: bool,
    pub blank_link: bool,
    pub layout_template: Option<String>,
    pub created: OffsetDateTime,
    pub modified: OffsetDateTime,
}

impl ContentRecord {
    pub fn is_alias(&self) -> bool {
        self.alias_id.is_some()
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_date.is_some()
    }

    /// Strict range containment: `self` is an ancestor of `other`.
    pub fn contains(&self, other: &ContentRecord) -> bool {
        self.lft < other.lft && self.rght > other.rght
    }

    /// Width of the subtree range: `2 * descendants + 2`.
    pub fn width(&self) -> i64 {
        self.rght - self.lft + 1
    }

    pub fn descendant_count(&self) -> i64 {
        (self.rght - self.lft - 1) / 2
    }
}
