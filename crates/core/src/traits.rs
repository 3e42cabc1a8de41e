//! Backend adapter contract
//!
//! The minimal operation set the core requires from every backend. Each
//! adapter wraps its backend's native client, owns pagination (the core
//! never sees partial pages) and translates transport failures into the
//! [`crate::error::Error`] taxonomy before returning.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Object name relative to the container (full key, trailing slash for
    /// directory-like sentinels)
    pub name: String,
    /// Object size in bytes (0 for sentinels and prefix markers)
    pub size: u64,
    /// True for directory-like prefix markers
    pub is_prefix: bool,
}

impl Entry {
    /// An object row
    pub fn object(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_prefix: false,
        }
    }

    /// A directory-like prefix row
    pub fn prefix(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_prefix: true,
        }
    }

    /// Whether this row names a directory rather than an object
    pub fn is_dir_like(&self) -> bool {
        self.is_prefix || self.name.ends_with('/')
    }
}

/// Metadata returned by `stat`
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub size: u64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: Option<jiff::Timestamp>,
    /// Backend-specific metadata passed through untouched
    pub extra: HashMap<String, String>,
}

/// Options applied to a single `put`
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Thin façade over one backend's native client.
///
/// An adapter instance is scoped to one logical account (one set of
/// credentials, one endpoint); the `container` argument selects the bucket,
/// container or project within that account.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// List objects whose names start with `prefix`, complete up to `limit`.
    /// Pagination is folded in; callers never see partial pages.
    async fn list(&self, container: &str, prefix: &str, limit: Option<usize>)
    -> Result<Vec<Entry>>;

    /// Fetch a whole object
    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>>;

    /// Store a whole object, replacing any existing one of the same name
    async fn put(&self, container: &str, name: &str, data: Vec<u8>, options: PutOptions)
    -> Result<()>;

    /// Delete objects by name. Absent names are not an error.
    async fn delete(&self, container: &str, names: &[String]) -> Result<()>;

    /// Metadata for a single object
    async fn stat(&self, container: &str, name: &str) -> Result<ObjectMeta>;
}

/// Name/identifier resolution for backends that alias human-readable names
/// with opaque platform IDs (the project/folder family).
///
/// Resolution failures follow the taxonomy: no match is `NotFound`, more
/// than one match is `Conflict`.
#[async_trait]
pub trait IdResolver: Send + Sync {
    /// Resolve a project name to its unique platform ID
    async fn resolve_project(&self, name: &str) -> Result<String>;

    /// The human-readable name of a project ID
    async fn project_name(&self, id: &str) -> Result<String>;

    /// Resolve an object by folder and name within a project to its ID
    async fn resolve_object(&self, project_id: &str, folder: &str, name: &str) -> Result<String>;

    /// The `(folder, name)` location of an object ID within a project
    async fn object_location(&self, id: &str, project_id: &str) -> Result<(String, String)>;
}
