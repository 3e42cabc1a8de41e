//! The operation vocabulary: list, copy, upload, download, remove, exists,
//! glob — one surface across every backend a path can name.
//!
//! A client borrows one adapter (one logical account) and dispatches on the
//! path's backend tag. Bulk verbs delegate to the transfer engine; single-
//! object verbs talk to the adapter directly, with transient-failure retry
//! and the one-shot credential-invalidation retry applied per call.

use std::path::{Path, PathBuf};

use crate::condition::{self, Condition};
use crate::config::Settings;
use crate::creds::{self, CredentialCache};
use crate::error::{Error, Result};
use crate::manifest;
use crate::path::{ObjectPath, algebra};
use crate::retry;
use crate::traits::{BackendAdapter, Entry, PutOptions};
use crate::transfer::{
    DownloadOptions, TransferEngine, TransferOutcome, UploadOptions, entry_names,
};

/// Options for [`Client::list_with`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Extra search path appended under the resource, which is then treated
    /// as a directory
    pub starts_with: Option<String>,
    /// Cap on the number of results
    pub limit: Option<usize>,
    /// Gate the listing until this condition holds over the results
    pub condition: Option<Condition<Vec<Entry>>>,
    /// Also require every manifested name to appear in the listing
    pub use_manifest: bool,
}

/// One adapter, the whole vocabulary
pub struct Client<'a> {
    adapter: &'a dyn BackendAdapter,
    settings: Settings,
    engine: TransferEngine,
}

impl<'a> Client<'a> {
    pub fn new(adapter: &'a dyn BackendAdapter) -> Self {
        Self::with_settings(adapter, Settings::default())
    }

    pub fn with_settings(adapter: &'a dyn BackendAdapter, settings: Settings) -> Self {
        let engine = TransferEngine::from_settings(&settings);
        Self {
            adapter,
            settings,
            engine,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// List everything under the path's resource prefix
    pub async fn list(&self, path: &ObjectPath) -> Result<Vec<Entry>> {
        self.list_with(path, ListOptions::default()).await
    }

    /// List with prefix/limit/condition controls.
    ///
    /// Transient backend failures and an unmet condition both re-run the
    /// listing on the configured retry budget.
    pub async fn list_with(&self, path: &ObjectPath, options: ListOptions) -> Result<Vec<Entry>> {
        let (container, resource) = path.adapter_scope()?;

        let prefix = match &options.starts_with {
            Some(starts_with) => {
                format!("{}{starts_with}", algebra::with_trailing_slash(&resource))
            }
            None => resource.clone(),
        };

        let mut condition = options.condition.clone();
        if options.use_manifest {
            let base = algebra::with_trailing_slash(&resource);
            let expected = manifest::read(
                self.adapter,
                &container,
                &base,
                &self.settings.manifest.file_name,
            )
            .await?;
            let verify = manifest::verify_listing(expected.into_iter().collect());
            condition = Some(match condition {
                Some(cond) => cond.and(verify),
                None => verify,
            });
        }

        let adapter = self.adapter;
        let container_str = container.as_str();
        let prefix_str = prefix.as_str();
        let limit = options.limit;
        condition::run_until(
            &self.settings.retry,
            move || adapter.list(container_str, prefix_str, limit),
            condition.as_ref(),
            None,
        )
        .await
        .map_err(|e| e.into_error(entry_names))
    }

    /// Whether the path names an existing file, object, directory-like
    /// prefix or container
    pub async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        if path.is_local() {
            return Ok(path.to_local().map(|p| p.exists()).unwrap_or(false));
        }
        let (container, resource) = path.adapter_scope()?;

        if resource.is_empty() {
            return match self.adapter.list(&container, "", Some(1)).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e),
            };
        }

        match self.adapter.stat(&container, &resource).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                // not an object; it may still be a directory-like prefix
                let prefix = algebra::with_trailing_slash(&resource);
                match self.adapter.list(&container, &prefix, Some(1)).await {
                    Ok(entries) => Ok(!entries.is_empty()),
                    Err(e) if e.is_not_found() => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Glob objects under the path.
    ///
    /// Backends only answer prefix queries, so patterns may carry at most
    /// one `*`, and only at the end.
    pub async fn glob(
        &self,
        path: &ObjectPath,
        pattern: &str,
        condition: Option<Condition<Vec<Entry>>>,
    ) -> Result<Vec<Entry>> {
        if pattern.matches('*').count() > 1 {
            return Err(Error::InvalidArgument(
                "multiple pattern globs not supported".to_string(),
            ));
        }
        if pattern.contains('*') && !pattern.ends_with('*') {
            return Err(Error::InvalidArgument(
                "only prefix queries are supported".to_string(),
            ));
        }
        let options = ListOptions {
            starts_with: Some(pattern.trim_end_matches('*').to_string()),
            condition,
            ..Default::default()
        };
        self.list_with(path, options).await
    }

    /// Read a whole object
    pub async fn read_object(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        let (container, resource) = path.adapter_scope()?;
        if resource.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "can only read an object path: {path}"
            )));
        }
        let adapter = self.adapter;
        let container_str = container.as_str();
        let name = resource.as_str();
        retry::retry_with_backoff(
            &self.settings.retry,
            move || async move {
                creds::with_auth_retry(CredentialCache::global(), || {
                    adapter.get(container_str, name)
                })
                .await
            },
            Error::is_retryable,
        )
        .await
    }

    /// Write a whole object, replacing any existing one
    pub async fn write_object(&self, path: &ObjectPath, data: Vec<u8>) -> Result<()> {
        let (container, resource) = path.adapter_scope()?;
        if resource.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "cannot write without an object name: {path}"
            )));
        }
        let adapter = self.adapter;
        let container_str = container.as_str();
        let name = resource.as_str();
        let data_ref = &data;
        retry::retry_with_backoff(
            &self.settings.retry,
            move || async move {
                creds::with_auth_retry(CredentialCache::global(), || {
                    adapter.put(container_str, name, data_ref.clone(), PutOptions::default())
                })
                .await
            },
            Error::is_retryable,
        )
        .await?;
        path.invalidate_cache();
        Ok(())
    }

    /// Delete a single object
    pub async fn remove(&self, path: &ObjectPath) -> Result<()> {
        let (container, resource) = path.adapter_scope()?;
        if resource.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "cannot remove a container: {path}"
            )));
        }
        let adapter = self.adapter;
        let container_str = container.as_str();
        let names = [resource.clone()];
        let names_ref = &names[..];
        creds::with_auth_retry(CredentialCache::global(), || {
            adapter.delete(container_str, names_ref)
        })
        .await?;
        path.invalidate_cache();
        Ok(())
    }

    /// Delete every object under the path's prefix, batching deletes
    pub async fn remove_tree(&self, path: &ObjectPath) -> Result<()> {
        let (container, resource) = path.adapter_scope()?;
        let prefix = algebra::with_trailing_slash(&resource);
        let entries = self.adapter.list(&container, &prefix, None).await?;
        let names: Vec<String> = entries.into_iter().map(|e| e.name).collect();
        for chunk in names.chunks(1000) {
            self.adapter.delete(&container, chunk).await?;
        }
        path.invalidate_cache();
        Ok(())
    }

    /// Copy one file between a local path and an object path (either way),
    /// or between two local paths.
    ///
    /// An object destination must be spelled unambiguously: a file with an
    /// extension, or a directory with a trailing slash. Ambiguity is
    /// rejected before any transfer starts.
    pub async fn copy(&self, src: &ObjectPath, dest: &ObjectPath) -> Result<()> {
        match (src.is_remote(), dest.is_remote()) {
            (true, true) => Err(Error::InvalidArgument(
                "cannot copy one object-storage path to another object-storage path".to_string(),
            )),
            (false, false) => self.copy_local(src, dest).await,
            (false, true) => self.copy_up(src, dest).await,
            (true, false) => self.copy_down(src, dest).await,
        }
    }

    async fn copy_local(&self, src: &ObjectPath, dest: &ObjectPath) -> Result<()> {
        let src_path = local_of(src)?;
        let mut dest_path = local_of(dest)?;
        if dest_path.is_dir() || dest.as_str().ends_with('/') {
            dest_path = dest_path.join(file_name(&src_path)?);
        }
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src_path, &dest_path).await?;
        Ok(())
    }

    async fn copy_up(&self, src: &ObjectPath, dest: &ObjectPath) -> Result<()> {
        if dest.is_ambiguous() {
            return Err(Error::InvalidPath(format!(
                "destination must be a file with an extension or a directory with a trailing slash: {dest}"
            )));
        }
        let src_path = local_of(src)?;
        let (container, resource) = dest.adapter_scope()?;
        let name = if dest.as_str().ends_with('/') {
            format!(
                "{}{}",
                algebra::with_trailing_slash(&resource),
                file_name(&src_path)?
            )
        } else {
            resource
        };

        let data = tokio::fs::read(&src_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("source file not found: {}", src_path.display()))
            } else {
                Error::Io(e)
            }
        })?;

        let adapter = self.adapter;
        let container_str = container.as_str();
        let name_str = name.as_str();
        let data_ref = &data;
        retry::retry_with_backoff(
            &self.settings.retry,
            move || async move {
                creds::with_auth_retry(CredentialCache::global(), || {
                    adapter.put(container_str, name_str, data_ref.clone(), PutOptions::default())
                })
                .await
            },
            Error::is_retryable,
        )
        .await?;
        dest.invalidate_cache();
        Ok(())
    }

    async fn copy_down(&self, src: &ObjectPath, dest: &ObjectPath) -> Result<()> {
        let (_, resource) = src.adapter_scope()?;
        if resource.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "can only copy an object path: {src}"
            )));
        }
        let data = self.read_object(src).await?;

        let mut dest_path = local_of(dest)?;
        if dest_path.is_dir() || dest.as_str().ends_with('/') {
            dest_path = dest_path.join(src.name());
        }
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest_path, &data).await?;
        Ok(())
    }

    /// Bulk upload under the destination prefix
    pub async fn upload(
        &self,
        dest: &ObjectPath,
        sources: &[PathBuf],
        options: &UploadOptions,
    ) -> Result<TransferOutcome> {
        self.engine.upload(self.adapter, dest, sources, options).await
    }

    /// Bulk download into a local directory
    pub async fn download(
        &self,
        src: &ObjectPath,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<TransferOutcome> {
        self.engine.download(self.adapter, src, dest, options).await
    }
}

fn local_of(path: &ObjectPath) -> Result<PathBuf> {
    path.to_local()
        .ok_or_else(|| Error::InvalidPath(format!("expected a local path: {path}")))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(format!("path has no file name: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAdapter;
    use std::fs;

    fn p(s: &str) -> ObjectPath {
        ObjectPath::resolve(s).unwrap()
    }

    async fn seeded() -> MemoryAdapter {
        let adapter = MemoryAdapter::new();
        for (name, data) in [
            ("logs/a.txt", &b"alpha"[..]),
            ("logs/b/c.txt", &b"charlie"[..]),
            ("logs/d/", &b""[..]),
            ("top.txt", &b"top"[..]),
        ] {
            adapter.put("bucket", name, data.to_vec(), PutOptions::default()).await.unwrap();
        }
        adapter
    }

    #[tokio::test]
    async fn test_list_and_prefix() {
        let adapter = seeded().await;
        let client = Client::new(&adapter);

        let all = client.list(&p("s3://bucket")).await.unwrap();
        assert_eq!(all.len(), 4);

        let logs = client.list(&p("s3://bucket/logs/")).await.unwrap();
        assert_eq!(logs.len(), 3);

        let limited = client
            .list_with(&p("s3://bucket"), ListOptions { limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_list_starts_with_treats_resource_as_dir() {
        let adapter = seeded().await;
        let client = Client::new(&adapter);

        let options = ListOptions {
            starts_with: Some("b".to_string()),
            ..Default::default()
        };
        let entries = client.list_with(&p("s3://bucket/logs"), options).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "logs/b/c.txt");
    }

    #[tokio::test]
    async fn test_exists() {
        let adapter = seeded().await;
        let client = Client::new(&adapter);

        assert!(client.exists(&p("s3://bucket/top.txt")).await.unwrap());
        assert!(client.exists(&p("s3://bucket/logs")).await.unwrap()); // prefix probe
        assert!(!client.exists(&p("s3://bucket/nope.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_glob_prefix_queries_only() {
        let adapter = seeded().await;
        let client = Client::new(&adapter);
        let path = p("s3://bucket/logs");

        let matched = client.glob(&path, "b*", None).await.unwrap();
        assert_eq!(matched.len(), 1);

        assert!(matches!(
            client.glob(&path, "a*b*", None).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.glob(&path, "*middle", None).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_read_write_object() {
        let adapter = MemoryAdapter::new();
        let client = Client::new(&adapter);
        let path = p("s3://bucket/notes/today.txt");

        client.write_object(&path, b"remember".to_vec()).await.unwrap();
        assert_eq!(client.read_object(&path).await.unwrap(), b"remember");

        assert!(matches!(
            client.read_object(&p("s3://bucket")).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_object_but_not_container() {
        let adapter = seeded().await;
        let client = Client::new(&adapter);

        client.remove(&p("s3://bucket/top.txt")).await.unwrap();
        assert!(!client.exists(&p("s3://bucket/top.txt")).await.unwrap());

        assert!(matches!(
            client.remove(&p("s3://bucket")).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_tree() {
        let adapter = seeded().await;
        let client = Client::new(&adapter);

        client.remove_tree(&p("s3://bucket/logs")).await.unwrap();
        assert_eq!(adapter.names("bucket"), vec!["top.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_copy_rejects_ambiguous_destination() {
        let adapter = MemoryAdapter::new();
        let client = Client::new(&adapter);
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("f.txt");
        fs::write(&src, b"x").unwrap();

        let result = client
            .copy(&p(src.to_str().unwrap()), &p("s3://bucket/could-be-either"))
            .await;
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_copy_round_trip() {
        let adapter = MemoryAdapter::new();
        let client = Client::new(&adapter);
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("report.csv");
        fs::write(&src, b"1,2,3").unwrap();

        // up, into a directory destination
        client
            .copy(&p(src.to_str().unwrap()), &p("s3://bucket/in/"))
            .await
            .unwrap();
        assert_eq!(
            client.read_object(&p("s3://bucket/in/report.csv")).await.unwrap(),
            b"1,2,3"
        );

        // down, to an explicit file destination
        let back = tmp.path().join("back.csv");
        client
            .copy(&p("s3://bucket/in/report.csv"), &p(back.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(fs::read(&back).unwrap(), b"1,2,3");
    }

    #[tokio::test]
    async fn test_copy_remote_to_remote_rejected() {
        let adapter = MemoryAdapter::new();
        let client = Client::new(&adapter);
        let result = client
            .copy(&p("s3://bucket/a.txt"), &p("swift://t/c/b.txt"))
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_local_ops_on_remote_verbs_fail_cleanly() {
        let adapter = MemoryAdapter::new();
        let client = Client::new(&adapter);
        assert!(matches!(
            client.list(&p("/local/dir")).await,
            Err(Error::InvalidPath(_))
        ));
    }
}
