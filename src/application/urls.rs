//! Bidirectional URL mapping between stored site-relative paths and the
//! host/device-qualified URLs the public side serves.
//!
//! Stored `url` values are site-relative (`/` for a site root; a node named
//! `index` collapses to its parent's path). The public form carries the
//! site's address: a path prefix for sub-directory sites, a `{alias}.{host}`
//! host for sub-domain sites. Non-ASCII path segments are percent-encoded
//! through the `url` crate before comparison against stored values.

use std::sync::Arc;

use url::Url;

use crate::application::error::AppError;
use crate::application::repos::{ContentFilter, NodeStore, SiteRegistry};
use crate::domain::content::ContentId;
use crate::domain::site::SiteRecord;

/// Request attributes the resolver needs to pick the active site.
#[derive(Debug, Clone, Default)]
pub struct UrlContext {
    pub host: Option<String>,
    pub user_agent: Option<String>,
}

impl UrlContext {
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            user_agent: None,
        }
    }
}

/// Derived-path rule shared by create, move, copy and rename: a node's path
/// is its parent's path plus its own name, except that an empty or `index`
/// name collapses to the parent path itself.
pub fn derive_url(parent_url: &str, name: &str) -> String {
    if name.is_empty() || name == "index" {
        if parent_url.is_empty() {
            return "/".to_string();
        }
        return parent_url.to_string();
    }
    let base = parent_url.trim_end_matches('/');
    format!("{base}/{name}")
}

/// Percent-encode the non-ASCII segments of a path, leaving already-encoded
/// segments untouched.
pub fn encode_path(path: &str) -> String {
    let mut scratch = Url::parse("http://canonical.invalid/").expect("static URL parses");
    scratch.set_path(path);
    scratch.path().to_string()
}

/// Collapse a trailing `index` segment to the parent path.
fn collapse_index(path: &str) -> String {
    if path == "/index" || path == "index" {
        return "/".to_string();
    }
    match path.strip_suffix("/index") {
        Some(parent) if !parent.is_empty() => parent.to_string(),
        _ => path.to_string(),
    }
}

pub struct UrlResolver {
    store: Arc<dyn NodeStore>,
    sites: Arc<dyn SiteRegistry>,
    base_url: Url,
}

impl UrlResolver {
    pub fn new(store: Arc<dyn NodeStore>, sites: Arc<dyn SiteRegistry>, base_url: Url) -> Self {
        Self {
            store,
            sites,
            base_url,
        }
    }

    /// The site owning `path`, by longest matching prefix. Main site owns
    /// everything unprefixed.
    async fn site_for_path(&self, path: &str) -> Result<SiteRecord, AppError> {
        let mut best: Option<SiteRecord> = None;
        for site in self.sites.list_sites().await? {
            let prefix = site.prefix();
            if prefix.is_empty() {
                continue;
            }
            if (path == prefix || path.starts_with(&format!("{prefix}/")))
                && best
                    .as_ref()
                    .is_none_or(|b| b.prefix().len() < prefix.len())
            {
                best = Some(site);
            }
        }
        match best {
            Some(site) => Ok(site),
            None => Ok(self.sites.main_site().await?),
        }
    }

    /// Turn a prefixed canonical path into the public URL.
    ///
    /// The site comes from the path prefix; an unprefixed path falls back to
    /// the request's host/device. Sub-domain sites (and device sites sharing
    /// canonical content with their desktop counterpart) lose their path
    /// prefix; sub-directory sites keep it. A trailing `index` collapses.
    /// With `full`, the scheme and host are prepended:
    /// `https://{alias}.{main host}` for secure sub-domain sites, the
    /// configured base URL otherwise.
    pub async fn resolve_url(
        &self,
        raw: &str,
        full: bool,
        use_subdomain: bool,
        ctx: &UrlContext,
    ) -> Result<String, AppError> {
        let by_path = self.site_for_path(raw).await?;
        let site = if by_path.is_main() && (ctx.host.is_some() || ctx.user_agent.is_some()) {
            self.sites
                .resolve(ctx.host.as_deref(), ctx.user_agent.as_deref())
                .await?
        } else {
            by_path
        };
        let prefix = site.prefix();
        let prefixed = !prefix.is_empty()
            && (raw == prefix || raw.starts_with(&format!("{prefix}/")));
        let strip = (use_subdomain && site.use_subdomain) || site.same_main_url;
        let mut path = if strip && prefixed {
            let rest = &raw[prefix.len()..];
            if rest.is_empty() {
                "/".to_string()
            } else {
                rest.to_string()
            }
        } else {
            raw.to_string()
        };
        path = collapse_index(&path);

        if !full {
            return Ok(path);
        }
        if strip && site.use_subdomain && !site.alias.is_empty() {
            let scheme = if site.secure { "https" } else { self.base_url.scheme() };
            let host = self
                .base_url
                .host_str()
                .ok_or_else(|| AppError::validation("base URL has no host"))?;
            return Ok(format!("{scheme}://{}.{host}{path}", site.alias));
        }
        let joined = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| AppError::validation(format!("cannot qualify `{path}`: {err}")))?;
        Ok(joined.to_string())
    }

    /// Site-scoped lookup of a public path back to its content id. Non-ASCII
    /// segments are percent-encoded before comparison.
    pub async fn resolve_content_id_by_url(
        &self,
        path: &str,
        ctx: &UrlContext,
    ) -> Result<Option<ContentId>, AppError> {
        let requested = self
            .sites
            .resolve(ctx.host.as_deref(), ctx.user_agent.as_deref())
            .await?;
        let by_path = self.site_for_path(path).await?;
        // A prefixed path names its site explicitly; otherwise the request
        // host/device decides the scope.
        let site = if by_path.is_main() { requested } else { by_path };

        let prefix = site.prefix();
        let relative = if !prefix.is_empty() && path.starts_with(&prefix) {
            let rest = &path[prefix.len()..];
            if rest.is_empty() { "/" } else { rest }
        } else {
            path
        };
        let stored = collapse_index(&encode_path(relative));

        let rows = self
            .store
            .find(&ContentFilter {
                site_id: Some(site.id),
                url: Some(stored),
                ..ContentFilter::default()
            })
            .await?;
        Ok(rows.into_iter().next().map(|r| r.id))
    }

    /// Public URL of a node; `""` when the id does not exist or is trashed.
    pub async fn get_url_by_id(
        &self,
        id: ContentId,
        full: bool,
        ctx: &UrlContext,
    ) -> Result<String, AppError> {
        let Some(record) = self.store.get(id).await? else {
            return Ok(String::new());
        };
        if record.is_trashed() {
            return Ok(String::new());
        }
        let site = match self.sites.find(record.site_id).await? {
            Some(site) => site,
            None => self.sites.main_site().await?,
        };
        let prefixed = format!("{}{}", site.prefix(), record.url);
        self.resolve_url(&prefixed, full, site.use_subdomain, ctx)
            .await
    }

    /// Normalize an absolute URL into the canonical prefixed-path form:
    /// a sub-domain host becomes the `/{alias}` prefix, and non-ASCII path
    /// segments are percent-encoded.
    pub async fn encode_parsed_url(&self, raw: &str) -> Result<String, AppError> {
        let parsed = Url::parse(raw)
            .map_err(|err| AppError::validation(format!("cannot parse `{raw}`: {err}")))?;
        let path = parsed.path().to_string();
        let Some(host) = parsed.host_str() else {
            return Ok(path);
        };
        for site in self.sites.list_sites().await? {
            if site.use_subdomain && site.matches_host(host) {
                let prefix = site.prefix();
                if path.starts_with(&format!("{prefix}/")) || path == prefix {
                    return Ok(path);
                }
                return Ok(format!("{prefix}{path}"));
            }
        }
        Ok(path)
    }
}
