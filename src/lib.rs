//! Content tree engine for a multi-site publishing platform.
//!
//! One global ordered tree of content nodes, indexed as a nested set and
//! scoped across sites. The crate maintains the index under insert / move /
//! copy / delete / restore, layers a trash lifecycle and cross-site aliasing
//! on top, evaluates scheduled publish windows, and maps stored paths to
//! host/device-qualified public URLs. Persistence is reached through the
//! repository traits in [`application::repos`]; [`infra::memory`] ships the
//! in-memory reference adapters.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

#[cfg(test)]
pub(crate) mod test_support;
