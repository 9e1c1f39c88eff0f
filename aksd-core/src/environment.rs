//! Persisted environment values
//!
//! Provisioning publishes its outputs (cluster name, subscription, ...) into a
//! dotenv file; deploy reads them back and records per-service properties
//! such as the endpoint URL.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::debug;

use crate::error::{InvalidEnvLineSnafu, ReadFileSnafu, Result, WriteFileSnafu};

pub const SUBSCRIPTION_ID_ENV_VAR: &str = "AZURE_SUBSCRIPTION_ID";
pub const RESOURCE_GROUP_ENV_VAR: &str = "AZURE_RESOURCE_GROUP";

/// Key/value environment with per-service properties.
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Snapshot of every value, used to seed child process environments.
    fn dotenv(&self) -> HashMap<String, String>;

    fn set(&self, key: &str, value: &str);

    fn set_service_property(&self, service: &str, key: &str, value: &str) {
        self.set(&service_property_key(service, key), value);
    }

    /// Durably persist the current values.
    async fn save(&self) -> Result<()>;
}

/// `SERVICE_<NAME>_<KEY>` with the name upper-cased and `-` mapped to `_`.
pub fn service_property_key(service: &str, key: &str) -> String {
    let service = service.to_uppercase().replace('-', "_");
    format!("SERVICE_{service}_{key}")
}

/// Environment backed by a dotenv file.
#[derive(Debug)]
pub struct DotenvEnvironment {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl DotenvEnvironment {
    /// Load `path`; a missing file is an empty environment.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path).context(ReadFileSnafu { path: &path })?;
            parse_dotenv(&path, &content)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self) -> String {
        let values = self.values.read().map(|v| v.clone()).unwrap_or_default();
        values
            .iter()
            .map(|(key, value)| format!("{key}=\"{}\"\n", escape(value)))
            .collect()
    }
}

#[async_trait]
impl EnvironmentStore for DotenvEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn dotenv(&self) -> HashMap<String, String> {
        self.values
            .read()
            .map(|values| values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    async fn save(&self) -> Result<()> {
        let content = self.render();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &content))
            .await
            .map_err(std::io::Error::other)
            .context(WriteFileSnafu { path: &self.path })??;

        debug!(path = %self.path.display(), "saved environment");
        Ok(())
    }
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).context(WriteFileSnafu { path })?;

    let mut file = tempfile::NamedTempFile::new_in(&parent).context(WriteFileSnafu { path })?;
    file.write_all(content.as_bytes())
        .context(WriteFileSnafu { path })?;
    file.persist(path)
        .map_err(|err| err.error)
        .context(WriteFileSnafu { path })?;
    Ok(())
}

fn parse_dotenv(path: &Path, content: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return InvalidEnvLineSnafu {
                path,
                line: index + 1,
                content: raw,
            }
            .fail();
        };
        values.insert(key.trim().to_string(), unquote(value.trim()));
    }
    Ok(values)
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        out
    } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
