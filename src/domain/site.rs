//! Site scopes: independently addressable sub-domains or sub-directories of
//! one installation, each owning exactly one root node in the content tree.

use serde::{Deserialize, Serialize};

use crate::domain::content::SiteId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: SiteId,
    pub name: String,
    pub title: String,
    /// URL prefix segment (`sub` addresses `/sub/...` or `sub.host`). Empty
    /// for the main site.
    pub alias: String,
    /// Addressed as `{alias}.{main host}` instead of a path prefix.
    pub use_subdomain: bool,
    /// Serve fully-qualified URLs over https.
    pub secure: bool,
    /// User-Agent fragment identifying a device-specific site.
    pub device: Option<String>,
    pub main_site_id: Option<SiteId>,
    /// Device site shares canonical content with its desktop counterpart, so
    /// its URLs resolve to the counterpart's canonical paths.
    pub same_main_url: bool,
    pub status: bool,
}

impl SiteRecord {
    pub fn is_main(&self) -> bool {
        self.alias.is_empty()
    }

    /// Path prefix for sub-directory addressing, `""` for the main site.
    pub fn prefix(&self) -> String {
        if self.alias.is_empty() {
            String::new()
        } else {
            format!("/{}", self.alias)
        }
    }

    /// Whether `host` addresses this site: either the bare alias, or the
    /// alias as the leftmost label of a sub-domain host.
    pub fn matches_host(&self, host: &str) -> bool {
        if self.alias.is_empty() {
            return false;
        }
        host == self.alias
            || host
                .strip_prefix(&self.alias)
                .is_some_and(|rest| rest.starts_with('.'))
    }

    pub fn matches_user_agent(&self, user_agent: &str) -> bool {
        self.device
            .as_deref()
            .is_some_and(|fragment| !fragment.is_empty() && user_agent.contains(fragment))
    }
}
