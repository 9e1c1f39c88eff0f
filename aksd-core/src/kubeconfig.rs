//! Persistent kubeconfig store
//!
//! Cluster logins are merged into one kubeconfig file (by default
//! `~/.kube/config`) so that plain `kubectl` keeps working after a deploy.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use fslock::LockFile;
use kube::config::Kubeconfig;
use snafu::{OptionExt, ResultExt};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{
    KubeConfigEncodingSnafu, NoHomeDirectorySnafu, ParseKubeConfigSnafu, ReadFileSnafu, Result,
    SerializeKubeConfigSnafu, WriteFileSnafu,
};

/// Persists merged kubeconfig documents.
#[async_trait]
pub trait KubeConfigStore: Send + Sync {
    /// Upsert the clusters, users and contexts of `config` and return the
    /// location of the merged file.
    async fn add_or_update_context(&self, name: &str, config: Kubeconfig) -> Result<PathBuf>;
}

/// Parse a kubeconfig blob as returned by the credential provider.
pub fn parse_kube_config(blob: &[u8]) -> Result<Kubeconfig> {
    let text = String::from_utf8(blob.to_vec()).context(KubeConfigEncodingSnafu)?;
    Kubeconfig::from_yaml(&text).context(ParseKubeConfigSnafu)
}

/// Merge `incoming` into `existing`: entries are keyed by name, an incoming
/// entry replaces the existing one in place, new names are appended.
pub fn merge_kube_config(existing: &mut Kubeconfig, incoming: Kubeconfig) {
    upsert(&mut existing.clusters, incoming.clusters, |c| &c.name);
    upsert(&mut existing.auth_infos, incoming.auth_infos, |u| &u.name);
    upsert(&mut existing.contexts, incoming.contexts, |c| &c.name);
    if existing.api_version.is_none() {
        existing.api_version = Some("v1".to_string());
    }
    if existing.kind.is_none() {
        existing.kind = Some("Config".to_string());
    }
}

fn upsert<T>(items: &mut Vec<T>, incoming: Vec<T>, name: impl Fn(&T) -> &String) {
    for item in incoming {
        match items.iter().position(|existing| name(existing) == name(&item)) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
    }
}

/// In-process locks, one per kubeconfig file. Stores built independently on
/// the same path share the entry.
static FILE_LOCKS: LazyLock<StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(StdMutex::default);

fn lock_for(key: &Path) -> Arc<Mutex<()>> {
    let mut locks = FILE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key.to_path_buf()).or_default())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Canonical location of `path`. The file itself may not exist yet, so the
/// parent is created and canonicalized instead.
fn canonical_location(path: &Path) -> Result<PathBuf> {
    let parent = parent_dir(path);
    std::fs::create_dir_all(&parent).context(WriteFileSnafu { path })?;
    let parent = parent.canonicalize().context(WriteFileSnafu { path })?;
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

/// Sibling advisory lock file: `config` -> `config.lock`.
fn lock_file_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn read_kube_config(path: &Path) -> Result<Kubeconfig> {
    if !path.exists() {
        return Ok(Kubeconfig::default());
    }
    let content = std::fs::read(path).context(ReadFileSnafu { path })?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Kubeconfig::default());
    }
    parse_kube_config(&content)
}

fn write_kube_config(path: &Path, config: &Kubeconfig) -> Result<()> {
    let content = serde_yaml::to_string(config).context(SerializeKubeConfigSnafu)?;
    let parent = parent_dir(path);
    std::fs::create_dir_all(&parent).context(WriteFileSnafu { path })?;

    let mut file = tempfile::NamedTempFile::new_in(&parent).context(WriteFileSnafu { path })?;
    file.write_all(content.as_bytes())
        .context(WriteFileSnafu { path })?;
    file.persist(path)
        .map_err(|err| err.error)
        .context(WriteFileSnafu { path })?;
    Ok(())
}

/// Read, merge and write while holding the cross-process file lock.
fn upsert_file(path: &Path, config: Kubeconfig) -> Result<()> {
    let lock_path = lock_file_path(path);
    let mut lock = LockFile::open(&lock_path).context(WriteFileSnafu { path: &lock_path })?;
    lock.lock().context(WriteFileSnafu { path: &lock_path })?;

    let mut merged = read_kube_config(path)?;
    merge_kube_config(&mut merged, config);
    write_kube_config(path, &merged)
}

async fn blocking<T, F>(path: &Path, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(std::io::Error::other)
        .context(WriteFileSnafu { path })?
}

/// Kubeconfig store backed by a single file.
///
/// Upserts are serialized per file: across store instances in this process
/// through a shared lock keyed by the canonical path, and across processes
/// through an advisory lock on `<file>.lock`.
#[derive(Debug, Clone)]
pub struct FileKubeConfigStore {
    path: PathBuf,
}

impl FileKubeConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.kube/config`
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().context(NoHomeDirectorySnafu)?;
        Ok(Self::new(home.join(".kube").join("config")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents; a missing file is an empty kubeconfig.
    pub async fn load(&self) -> Result<Kubeconfig> {
        let path = self.path.clone();
        blocking(&self.path, move || read_kube_config(&path)).await
    }
}

#[async_trait]
impl KubeConfigStore for FileKubeConfigStore {
    async fn add_or_update_context(&self, name: &str, config: Kubeconfig) -> Result<PathBuf> {
        let path = self.path.clone();
        let key = blocking(&self.path, move || canonical_location(&path)).await?;

        let lock = lock_for(&key);
        let _guard = lock.lock().await;

        let path = self.path.clone();
        blocking(&self.path, move || upsert_file(&path, config)).await?;

        info!(context = name, path = %self.path.display(), "kube context added/updated");
        Ok(self.path.clone())
    }
}
