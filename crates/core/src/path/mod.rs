//! Path dispatch and algebra
//!
//! One immutable, string-backed path value covering the local filesystem
//! and every registered object-storage family. The backend is decided once,
//! from the drive prefix, at construction; every later operation pattern-
//! matches on that tag. Resolution is pure parsing — no network access.
//!
//! Addressing models:
//! - `s3://bucket/key` — bucket/key stores
//! - `swift://tenant/container/object` — tenant/container/object stores
//! - `dx://project:/folder/file` — project/folder platforms, where project
//!   and file may each be a human-readable name or an opaque platform ID
//! - everything else is a local filesystem path

pub(crate) mod algebra;
mod project;

pub use project::is_platform_id;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

use project::ResolvedIds;

/// Which backend family a path addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Backend {
    /// Local filesystem
    Local,
    /// Bucket/key store
    S3,
    /// Tenant/container/object store
    Swift,
    /// Project/folder data platform
    Dx,
}

impl Backend {
    /// The drive prefix for this backend (empty for local paths)
    pub const fn drive(self) -> &'static str {
        match self {
            Backend::Local => "",
            Backend::S3 => "s3://",
            Backend::Swift => "swift://",
            Backend::Dx => "dx://",
        }
    }

    pub const fn is_remote(self) -> bool {
        !matches!(self, Backend::Local)
    }
}

/// The `(root, container, resource)` decomposition of a remote path.
///
/// Meaning varies per family: tenant/container/object, bucket/None/key,
/// project/None/folder-or-file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposed {
    pub root: Option<String>,
    pub container: Option<String>,
    pub resource: Option<String>,
}

/// An immutable path value with a backend tag.
///
/// All algebra operations return new values; equality, ordering and hashing
/// are by value. The only interior state is the project-family resolution
/// cache, which never participates in comparisons.
pub struct ObjectPath {
    backend: Backend,
    raw: String,
    /// Canonical/virtual resolution cache (project family only)
    ids: Arc<Mutex<ResolvedIds>>,
}

impl Clone for ObjectPath {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend,
            raw: self.raw.clone(),
            ids: Arc::clone(&self.ids),
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPath({:?}, {:?})", self.backend, self.raw)
    }
}

impl PartialEq for ObjectPath {
    fn eq(&self, other: &Self) -> bool {
        self.backend == other.backend && self.raw == other.raw
    }
}

impl Eq for ObjectPath {}

impl PartialOrd for ObjectPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw).then(self.backend.cmp(&other.backend))
    }
}

impl Hash for ObjectPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.backend.hash(state);
        self.raw.hash(state);
    }
}

impl std::str::FromStr for ObjectPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl ObjectPath {
    pub(crate) fn new(backend: Backend, raw: impl Into<String>) -> Self {
        Self {
            backend,
            raw: raw.into(),
            ids: Arc::new(Mutex::new(ResolvedIds::default())),
        }
    }

    /// Construct a typed path from a URI string.
    ///
    /// The drive prefix selects the backend; a recognized prefix with a
    /// malformed remainder is `InvalidPath`. Strings without a registered
    /// prefix — including unknown `name://` schemes — are local paths.
    pub fn resolve(s: &str) -> Result<ObjectPath> {
        if s.starts_with(Backend::S3.drive()) {
            Ok(Self::new(Backend::S3, s))
        } else if s.starts_with(Backend::Swift.drive()) {
            Ok(Self::new(Backend::Swift, s))
        } else if s.starts_with(Backend::Dx.drive()) {
            project::parse(s)?;
            Ok(Self::new(Backend::Dx, s))
        } else {
            Ok(Self::new(Backend::Local, s))
        }
    }

    /// A local path value
    pub fn from_local(path: impl AsRef<std::path::Path>) -> ObjectPath {
        Self::new(Backend::Local, path.as_ref().to_string_lossy().into_owned())
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_remote(&self) -> bool {
        self.backend.is_remote()
    }

    pub fn is_local(&self) -> bool {
        self.backend == Backend::Local
    }

    /// The portion after the drive prefix
    pub(crate) fn rest(&self) -> &str {
        &self.raw[self.backend.drive().len()..]
    }

    /// The local filesystem path, for local values
    pub fn to_local(&self) -> Option<PathBuf> {
        self.is_local().then(|| PathBuf::from(&self.raw))
    }

    /// Tenant, bucket or project — the first addressing level
    pub fn root(&self) -> Option<String> {
        match self.backend {
            Backend::Local => None,
            Backend::S3 | Backend::Swift => {
                self.rest().split('/').next().filter(|p| !p.is_empty()).map(str::to_string)
            }
            Backend::Dx => project::parse(&self.raw).ok().map(|(project, _)| project),
        }
    }

    /// Container name (tenant/container family only)
    pub fn container(&self) -> Option<String> {
        match self.backend {
            Backend::Swift => {
                self.rest().split('/').nth(1).filter(|p| !p.is_empty()).map(str::to_string)
            }
            _ => None,
        }
    }

    /// Object name or prefix under the container level. Trailing slashes are
    /// kept: they mark directory-like prefixes.
    pub fn resource(&self) -> Option<String> {
        let skip = match self.backend {
            Backend::Local => return None,
            Backend::S3 => 1,
            Backend::Swift => 2,
            Backend::Dx => {
                return project::parse(&self.raw)
                    .ok()
                    .map(|(_, resource)| resource)
                    .filter(|r| !r.is_empty());
            }
        };
        let parts: Vec<&str> = self.rest().split('/').collect();
        if parts.len() <= skip {
            return None;
        }
        let joined = parts[skip..].join("/");
        (!joined.is_empty()).then_some(joined)
    }

    /// Split into `(root, container, resource)`.
    ///
    /// Local paths have no drive to decompose and fail with `InvalidPath`;
    /// there is never a silent fallback to another backend.
    pub fn decompose(&self) -> Result<Decomposed> {
        if self.is_local() {
            return Err(Error::InvalidPath(format!(
                "cannot decompose local path (no drive prefix): {}",
                self.raw
            )));
        }
        Ok(Decomposed {
            root: self.root(),
            container: self.container(),
            resource: self.resource(),
        })
    }

    /// The `(container, resource)` pair a [`crate::traits::BackendAdapter`]
    /// addresses: bucket/key, container/object or project/resource.
    pub(crate) fn adapter_scope(&self) -> Result<(String, String)> {
        match self.backend {
            Backend::Local => Err(Error::InvalidPath(format!(
                "not an object-storage path: {}",
                self.raw
            ))),
            Backend::S3 => {
                let bucket = self.root().ok_or_else(|| {
                    Error::InvalidPath(format!("path has no bucket: {}", self.raw))
                })?;
                Ok((bucket, self.resource().unwrap_or_default()))
            }
            Backend::Swift => {
                let container = self.container().ok_or_else(|| {
                    Error::InvalidPath(format!("path has no container: {}", self.raw))
                })?;
                Ok((container, self.resource().unwrap_or_default()))
            }
            Backend::Dx => {
                let project = self.root().ok_or_else(|| {
                    Error::InvalidPath(format!("path has no project: {}", self.raw))
                })?;
                Ok((project, self.resource().unwrap_or_default()))
            }
        }
    }

    /// Append one component, adding a separator if needed
    pub fn join(&self, part: &str) -> ObjectPath {
        if part.is_empty() {
            return self.clone();
        }
        let part = part.trim_start_matches('/');
        match self.backend {
            Backend::Dx => {
                // normalize first so `dx://proj` and `dx://proj:` join alike
                let base = self.normalize().raw;
                let joined = if base.ends_with(':') || base.ends_with(":/") {
                    format!("{base}{part}")
                } else {
                    format!("{base}/{part}")
                };
                Self::new(Backend::Dx, joined)
            }
            _ => {
                let joined = if self.raw.is_empty() || self.raw.ends_with("://") {
                    format!("{}{part}", self.raw)
                } else {
                    format!("{}/{part}", self.raw.trim_end_matches('/'))
                };
                Self::new(self.backend, joined)
            }
        }
    }

    /// Append several components
    pub fn join_all<'a>(&self, parts: impl IntoIterator<Item = &'a str>) -> ObjectPath {
        parts.into_iter().fold(self.clone(), |p, part| p.join(part))
    }

    /// Normalize separators and dot components, keeping the drive prefix.
    /// `..` never escapes past the root of a remote path.
    pub fn normalize(&self) -> ObjectPath {
        match self.backend {
            Backend::Local => Self::new(Backend::Local, algebra::normalize_local(&self.raw)),
            Backend::S3 | Backend::Swift => {
                let drive = self.backend.drive();
                Self::new(
                    self.backend,
                    format!("{drive}{}", algebra::normalize_rooted(self.rest())),
                )
            }
            Backend::Dx => {
                // parse cannot fail here: resolve validated the shape
                let (project, resource) =
                    project::parse(&self.raw).unwrap_or((self.rest().to_string(), String::new()));
                let drive = self.backend.drive();
                if project::is_canonical_pair(&project, &resource) {
                    let resource = resource.trim_end_matches('/');
                    Self::new(Backend::Dx, format!("{drive}{project}:{resource}"))
                } else {
                    let resource = algebra::normalize_rooted(&resource);
                    Self::new(Backend::Dx, format!("{drive}{project}:/{resource}"))
                }
            }
        }
    }

    /// Split the normalized path into `(parent, name)`.
    ///
    /// A root-only path — no container and no resource — is its own parent
    /// and has an empty name; directory walks terminate on this.
    pub fn split(&self) -> (ObjectPath, String) {
        match self.backend {
            Backend::Local => {
                let n = algebra::normalize_local(&self.raw);
                if n == "/" {
                    return (self.clone(), String::new());
                }
                match n.rfind('/') {
                    None => (Self::new(Backend::Local, ""), n),
                    Some(0) => (Self::new(Backend::Local, "/"), n[1..].to_string()),
                    Some(i) => (
                        Self::new(Backend::Local, &n[..i]),
                        n[i + 1..].to_string(),
                    ),
                }
            }
            Backend::S3 | Backend::Swift => {
                let rest = algebra::normalize_rooted(self.rest());
                let segments: Vec<&str> = if rest.is_empty() {
                    Vec::new()
                } else {
                    rest.split('/').collect()
                };
                if segments.len() <= 1 {
                    return (self.clone(), String::new());
                }
                let drive = self.backend.drive();
                let parent = format!("{drive}{}", segments[..segments.len() - 1].join("/"));
                (
                    Self::new(self.backend, parent),
                    segments[segments.len() - 1].to_string(),
                )
            }
            Backend::Dx => {
                let normalized = self.normalize();
                let Ok((project, resource)) = project::parse(&normalized.raw) else {
                    return (self.clone(), String::new());
                };
                if resource.is_empty() {
                    return (self.clone(), String::new());
                }
                let drive = self.backend.drive();
                let segments: Vec<&str> = resource.split('/').collect();
                if segments.len() == 1 {
                    let parent = if normalized.raw.contains(":/") {
                        format!("{drive}{project}:/")
                    } else {
                        format!("{drive}{project}:")
                    };
                    return (Self::new(Backend::Dx, parent), segments[0].to_string());
                }
                let parent = format!(
                    "{drive}{project}:/{}",
                    segments[..segments.len() - 1].join("/")
                );
                (
                    Self::new(Backend::Dx, parent),
                    segments[segments.len() - 1].to_string(),
                )
            }
        }
    }

    /// The containing path; self-referential for root-only paths
    pub fn parent(&self) -> ObjectPath {
        self.split().0
    }

    /// The last component of the normalized path; empty for roots
    pub fn name(&self) -> String {
        self.split().1
    }

    /// The file extension of the name, dot included
    pub fn ext(&self) -> Option<String> {
        let name = self.name();
        algebra::ext_of(&name).map(str::to_string)
    }

    /// True when the path could denote either a file or a directory: no
    /// trailing separator and no file-extension-like suffix. Ambiguous
    /// destinations are rejected before any transfer is attempted.
    pub fn is_ambiguous(&self) -> bool {
        !algebra::has_trailing_slash(&self.raw) && self.ext().is_none()
    }

    /// A copy carrying exactly one trailing slash
    pub fn with_trailing_slash(&self) -> ObjectPath {
        Self::new(self.backend, algebra::with_trailing_slash(&self.raw))
    }

    /// A copy with trailing slashes removed
    pub fn without_trailing_slash(&self) -> ObjectPath {
        Self::new(self.backend, self.raw.trim_end_matches('/'))
    }

    pub(crate) fn ids(&self) -> &Mutex<ResolvedIds> {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> ObjectPath {
        ObjectPath::resolve(s).unwrap()
    }

    #[test]
    fn test_resolve_dispatch() {
        assert_eq!(p("s3://bucket/key").backend(), Backend::S3);
        assert_eq!(p("swift://tenant/cont/obj").backend(), Backend::Swift);
        assert_eq!(p("dx://proj:/a/b").backend(), Backend::Dx);
        assert_eq!(p("/usr/local/data").backend(), Backend::Local);
        assert_eq!(p("relative/file.txt").backend(), Backend::Local);
        // unknown schemes fall back to local strings
        assert_eq!(p("ftp://host/file").backend(), Backend::Local);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        for uri in [
            "s3://bucket/a/b.txt",
            "swift://tenant/cont/dir/",
            "dx://proj:/folder/file.txt",
            "/local/dir/file",
        ] {
            let once = p(uri);
            let twice = ObjectPath::resolve(&once.to_string()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_malformed_project_paths_rejected() {
        assert!(matches!(
            ObjectPath::resolve("dx://"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            ObjectPath::resolve("dx://:/a/b"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            ObjectPath::resolve("dx://proj/a/b"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_decomposition_per_family() {
        let s3 = p("s3://bucket/dir/key.txt").decompose().unwrap();
        assert_eq!(s3.root.as_deref(), Some("bucket"));
        assert_eq!(s3.container, None);
        assert_eq!(s3.resource.as_deref(), Some("dir/key.txt"));

        let swift = p("swift://tenant/cont/dir/obj").decompose().unwrap();
        assert_eq!(swift.root.as_deref(), Some("tenant"));
        assert_eq!(swift.container.as_deref(), Some("cont"));
        assert_eq!(swift.resource.as_deref(), Some("dir/obj"));

        let dx = p("dx://proj:/folder/file.txt").decompose().unwrap();
        assert_eq!(dx.root.as_deref(), Some("proj"));
        assert_eq!(dx.container, None);
        assert_eq!(dx.resource.as_deref(), Some("folder/file.txt"));
    }

    #[test]
    fn test_decompose_local_fails() {
        assert!(matches!(
            p("/local/file").decompose(),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_resource_keeps_trailing_slash() {
        assert_eq!(p("s3://bucket/dir/").resource().as_deref(), Some("dir/"));
        assert_eq!(
            p("swift://t/c/prefix/").resource().as_deref(),
            Some("prefix/")
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(p("s3://bucket//a/./b/../c").normalize().as_str(), "s3://bucket/a/c");
        assert_eq!(p("swift://t/c/obj/").normalize().as_str(), "swift://t/c/obj");
        assert_eq!(p("dx://proj:a/b").normalize().as_str(), "dx://proj:/a/b");
        assert_eq!(p("dx://proj").normalize().as_str(), "dx://proj:/");
        assert_eq!(p("/a//b/../c").normalize().as_str(), "/a/c");
    }

    #[test]
    fn test_normalize_keeps_canonical_form() {
        let canonical = format!(
            "dx://project-{}:file-{}",
            "a".repeat(24),
            "b".repeat(24)
        );
        assert_eq!(p(&canonical).normalize().as_str(), canonical);
    }

    #[test]
    fn test_join() {
        assert_eq!(p("s3://bucket").join("key").as_str(), "s3://bucket/key");
        assert_eq!(p("s3://bucket/dir/").join("key").as_str(), "s3://bucket/dir/key");
        assert_eq!(p("swift://t/c").join("/abs").as_str(), "swift://t/c/abs");
        assert_eq!(p("dx://proj").join("file.txt").as_str(), "dx://proj:/file.txt");
        assert_eq!(p("a/b").join("c").as_str(), "a/b/c");
        assert_eq!(p("a/b").join_all(["c", "d"]).as_str(), "a/b/c/d");
    }

    #[test]
    fn test_split_and_parent() {
        let (parent, name) = p("s3://bucket/dir/key.txt").split();
        assert_eq!(parent.as_str(), "s3://bucket/dir");
        assert_eq!(name, "key.txt");

        let (parent, name) = p("swift://tenant/cont").split();
        assert_eq!(parent.as_str(), "swift://tenant");
        assert_eq!(name, "cont");

        let (parent, name) = p("dx://proj:/a/b").split();
        assert_eq!(parent.as_str(), "dx://proj:/a");
        assert_eq!(name, "b");

        let (parent, name) = p("dx://proj:/a").split();
        assert_eq!(parent.as_str(), "dx://proj:/");
        assert_eq!(name, "a");
    }

    #[test]
    fn test_root_only_paths_are_their_own_parent() {
        for uri in ["swift://tenant/", "swift://tenant", "s3://bucket", "dx://proj:/"] {
            let path = p(uri);
            assert_eq!(path.parent(), path, "parent of {uri} should be itself");
            assert_eq!(path.name(), "");
        }
    }

    #[test]
    fn test_join_split_round_trip_equals_normalize() {
        for uri in [
            "s3://bucket/a/b.txt",
            "s3://bucket//a/./b.txt",
            "swift://t/c/x/y/",
            "dx://proj:/folder/file.txt",
            "/local/a/b",
        ] {
            let path = p(uri);
            let (parent, name) = path.split();
            assert_eq!(
                parent.join(&name),
                path.normalize(),
                "round-trip failed for {uri}"
            );
        }
    }

    #[test]
    fn test_is_ambiguous() {
        assert!(p("s3://bucket/thing").is_ambiguous());
        assert!(!p("s3://bucket/thing/").is_ambiguous());
        assert!(!p("s3://bucket/thing.txt").is_ambiguous());
        assert!(p("swift://t/c/dir").is_ambiguous());
    }

    #[test]
    fn test_ext() {
        assert_eq!(p("s3://b/a.tar.gz").ext().as_deref(), Some(".gz"));
        assert_eq!(p("s3://b/.hidden").ext(), None);
        assert_eq!(p("s3://b/dir/").ext(), None);
    }

    #[test]
    fn test_value_semantics() {
        use std::collections::BTreeSet;

        let a = p("s3://bucket/a");
        let b = p("s3://bucket/a");
        let c = p("s3://bucket/b");
        assert_eq!(a, b);
        assert!(a < c);

        let set: BTreeSet<ObjectPath> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_trailing_slash_helpers() {
        assert_eq!(p("s3://b/dir").with_trailing_slash().as_str(), "s3://b/dir/");
        assert_eq!(p("s3://b/dir//").with_trailing_slash().as_str(), "s3://b/dir/");
        assert_eq!(p("s3://b/dir/").without_trailing_slash().as_str(), "s3://b/dir");
    }
}
