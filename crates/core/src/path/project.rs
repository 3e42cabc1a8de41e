//! Project/folder platform paths
//!
//! `dx://project:/folder/file` paths address a data platform where the
//! project and the file each have two spellings: a human-readable name (the
//! virtual form) and an immutable opaque identifier (the canonical form,
//! `project-…`/`file-…`). Conversion between the forms needs a platform
//! lookup, so resolution results are cached per path instance and thrown
//! away whenever a mutating operation touches the path.

use crate::error::{Error, Result};
use crate::traits::IdResolver;

use super::{Backend, ObjectPath};

/// Length of the opaque part of a platform identifier
const PLATFORM_ID_LEN: usize = 24;

/// Whether `s` is an opaque platform identifier of the given class,
/// e.g. `is_platform_id("project-…", "project")`.
pub fn is_platform_id(s: &str, class: &str) -> bool {
    match s.strip_prefix(class).and_then(|rest| rest.strip_prefix('-')) {
        Some(tail) => {
            tail.len() == PLATFORM_ID_LEN && tail.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Whether a `(project, resource)` pair is fully canonical
pub(crate) fn is_canonical_pair(project: &str, resource: &str) -> bool {
    is_platform_id(project, "project")
        && (resource.is_empty() || is_platform_id(resource.trim_end_matches('/'), "file"))
}

/// Parse a project-scoped URI into `(project, resource)`.
///
/// The project sits between the drive and a `:`; the resource follows the
/// colon with any leading slashes stripped. A bare `dx://project` form is
/// accepted. A missing or empty project is malformed.
pub(crate) fn parse(s: &str) -> Result<(String, String)> {
    let drive = Backend::Dx.drive();
    let rest = s.strip_prefix(drive).ok_or_else(|| {
        Error::InvalidPath(format!("path must start with {drive}: {s}"))
    })?;
    if rest.is_empty() {
        return Err(Error::InvalidPath(format!(
            "project-scoped path has no project: {s}"
        )));
    }
    let (project, resource) = match rest.split_once(':') {
        Some((project, resource)) => (project, resource.trim_start_matches('/')),
        None => (rest, ""),
    };
    if project.is_empty() {
        return Err(Error::InvalidPath(format!(
            "project-scoped path has no project: {s}"
        )));
    }
    if project.contains('/') {
        return Err(Error::InvalidPath(format!(
            "project name must be followed by ':': {s}"
        )));
    }
    Ok((project.to_string(), resource.to_string()))
}

/// Cached canonical/virtual resolution results for one path instance
#[derive(Debug, Default, Clone)]
pub(crate) struct ResolvedIds {
    pub project_id: Option<String>,
    pub resource_id: Option<String>,
    pub project_name: Option<String>,
    pub resource_path: Option<String>,
}

impl ObjectPath {
    /// True when every addressable component is an opaque platform ID
    pub fn is_canonical_form(&self) -> bool {
        if self.backend() != Backend::Dx {
            return false;
        }
        match parse(self.as_str()) {
            Ok((project, resource)) => is_canonical_pair(&project, &resource),
            Err(_) => false,
        }
    }

    /// Drop every cached resolution result.
    ///
    /// Must be called after any mutating operation (remove, rename, move) on
    /// this path: the platform may now bind the same names to different IDs.
    pub fn invalidate_cache(&self) {
        *self.ids().lock().expect("path resolution cache lock") = ResolvedIds::default();
    }

    /// The opaque ID of this path's project, resolving the human-readable
    /// name on first use
    pub async fn canonical_project(&self, resolver: &dyn IdResolver) -> Result<String> {
        let (project, _) = self.require_dx()?;
        if is_platform_id(&project, "project") {
            return Ok(project);
        }
        if let Some(id) = self.ids().lock().expect("path resolution cache lock").project_id.clone()
        {
            return Ok(id);
        }
        let id = resolver.resolve_project(&project).await?;
        self.ids().lock().expect("path resolution cache lock").project_id = Some(id.clone());
        Ok(id)
    }

    /// The opaque ID of the file this path names, or `None` for a project
    /// root. Folder paths (trailing slash) have no canonical ID.
    pub async fn canonical_resource(&self, resolver: &dyn IdResolver) -> Result<Option<String>> {
        let (_, resource) = self.require_dx()?;
        if resource.is_empty() {
            return Ok(None);
        }
        if resource.ends_with('/') {
            return Err(Error::InvalidArgument(format!(
                "folder path has no canonical id: {self}"
            )));
        }
        if is_platform_id(&resource, "file") {
            return Ok(Some(resource));
        }
        if let Some(id) =
            self.ids().lock().expect("path resolution cache lock").resource_id.clone()
        {
            return Ok(Some(id));
        }

        let project_id = self.canonical_project(resolver).await?;
        let (folder, name) = split_resource(&resource);
        let id = resolver.resolve_object(&project_id, &folder, &name).await?;
        self.ids().lock().expect("path resolution cache lock").resource_id = Some(id.clone());
        Ok(Some(id))
    }

    /// This path spelled entirely with opaque platform IDs
    pub async fn to_canonical(&self, resolver: &dyn IdResolver) -> Result<ObjectPath> {
        let project_id = self.canonical_project(resolver).await?;
        let drive = Backend::Dx.drive();
        match self.canonical_resource(resolver).await? {
            Some(resource_id) => Ok(Self::new(
                Backend::Dx,
                format!("{drive}{project_id}:{resource_id}"),
            )),
            None => Ok(Self::new(Backend::Dx, format!("{drive}{project_id}:"))),
        }
    }

    /// This path spelled with human-readable names
    pub async fn to_virtual(&self, resolver: &dyn IdResolver) -> Result<ObjectPath> {
        let (project, resource) = self.require_dx()?;

        let project_name = if is_platform_id(&project, "project") {
            let cached =
                self.ids().lock().expect("path resolution cache lock").project_name.clone();
            match cached {
                Some(name) => name,
                None => {
                    let name = resolver.project_name(&project).await?;
                    self.ids().lock().expect("path resolution cache lock").project_name =
                        Some(name.clone());
                    name
                }
            }
        } else {
            project.clone()
        };

        let resource_path = if is_platform_id(&resource, "file") {
            let cached =
                self.ids().lock().expect("path resolution cache lock").resource_path.clone();
            match cached {
                Some(path) => path,
                None => {
                    let project_id = self.canonical_project(resolver).await?;
                    let (folder, name) = resolver.object_location(&resource, &project_id).await?;
                    let path = match folder.trim_matches('/') {
                        "" => name,
                        trimmed => format!("{trimmed}/{name}"),
                    };
                    self.ids().lock().expect("path resolution cache lock").resource_path =
                        Some(path.clone());
                    path
                }
            }
        } else {
            resource.clone()
        };

        let drive = Backend::Dx.drive();
        Ok(Self::new(
            Backend::Dx,
            format!("{drive}{project_name}:/{resource_path}"),
        ))
    }

    fn require_dx(&self) -> Result<(String, String)> {
        if self.backend() != Backend::Dx {
            return Err(Error::InvalidPath(format!(
                "not a project-scoped path: {self}"
            )));
        }
        parse(self.as_str())
    }
}

/// Split a virtual resource into the platform's `(folder, name)` view:
/// `a/b/c.txt` lives in folder `/a/b` under name `c.txt`.
fn split_resource(resource: &str) -> (String, String) {
    match resource.rsplit_once('/') {
        Some((folder, name)) => (format!("/{folder}"), name.to_string()),
        None => ("/".to_string(), resource.to_string()),
    }
}
