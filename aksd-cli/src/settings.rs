//! Tool settings persisted with confy

use std::path::{Path, PathBuf};
use std::time::Duration;

use aksd_core::PollOptions;
use aksd_core::kubeconfig::FileKubeConfigStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "aksd";
const FILE_STEM: &str = "settings";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// kubectl binary
    pub kubectl: String,
    /// Azure CLI binary
    pub az: String,
    /// docker compatible binary used to tag and push images
    pub docker: String,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    /// Progress labels buffered for the console before new ones are dropped
    pub progress_capacity: usize,
    /// Kubeconfig file cluster logins are merged into
    pub kubeconfig: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            az: "az".to_string(),
            docker: "docker".to_string(),
            poll_interval_secs: 5,
            poll_timeout_secs: 10 * 60,
            progress_capacity: 64,
            kubeconfig: "~/.kube/config".to_string(),
        }
    }
}

impl Settings {
    pub fn poll_options(&self) -> PollOptions {
        PollOptions::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.poll_timeout_secs),
        )
    }

    /// Kubeconfig store location with `~` and `$VARS` expanded, `None` when
    /// the setting is blank.
    pub fn kubeconfig_path(&self) -> Result<Option<PathBuf>> {
        let expanded = shellexpand::full(&self.kubeconfig)
            .with_context(|| format!("unable to expand kubeconfig path '{}'", self.kubeconfig))?;
        let expanded = expanded.trim();
        Ok((!expanded.is_empty()).then(|| PathBuf::from(expanded)))
    }

    /// Store for the configured kubeconfig, `~/.kube/config` when unset.
    pub fn kubeconfig_store(&self) -> Result<FileKubeConfigStore> {
        match self.kubeconfig_path()? {
            Some(path) => Ok(FileKubeConfigStore::new(path)),
            None => FileKubeConfigStore::default_location()
                .context("no kubeconfig configured and no home directory"),
        }
    }
}

pub fn path() -> Result<PathBuf> {
    confy::get_configuration_file_path(APP_NAME, FILE_STEM)
        .with_context(|| "unable to find the settings file")
}

pub fn load() -> Result<Settings> {
    confy::load(APP_NAME, FILE_STEM).with_context(|| "unable to load settings")
}

/// Load from an explicit file; a missing file is created with defaults.
pub fn load_path(path: &Path) -> Result<Settings> {
    confy::load_path(path)
        .with_context(|| format!("unable to load settings from {}", path.display()))
}
