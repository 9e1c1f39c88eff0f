//! Service configuration
//!
//! A service is described by a small YAML document:
//!
//! ```yaml
//! name: api
//! project: todo
//! relativePath: ./src/api
//! k8s:
//!   namespace: todo
//!   deploymentPath: manifests
//!   deployment:
//!     name: api-deployment
//!   service:
//!     name: api-service
//!   ingress:
//!     name: api-ingress
//!     relativePath: /api
//! ```
//!
//! Every `k8s` field is optional; names fall back to the service name and the
//! namespace falls back to the project name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{ParseServiceConfigSnafu, ReadFileSnafu, Result};

/// Folder under the service holding its manifests when none is configured.
pub const DEFAULT_DEPLOYMENT_PATH: &str = "manifests";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AksOptions {
    /// Namespace for the service's resources. Defaults to the project name
    pub namespace: String,
    /// Manifest folder relative to the service. Defaults to `manifests`
    pub deployment_path: String,
    pub ingress: AksIngressOptions,
    pub deployment: AksDeploymentOptions,
    pub service: AksServiceOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AksIngressOptions {
    pub name: String,
    pub relative_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AksDeploymentOptions {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AksServiceOptions {
    pub name: String,
}

/// A deployable service and its AKS options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub relative_path: PathBuf,
    #[serde(default)]
    pub k8s: AksOptions,
}

impl ServiceConfig {
    /// Load a service config; a relative `relativePath` is resolved against
    /// the config file's folder.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        let mut config: ServiceConfig =
            serde_yaml::from_str(&content).context(ParseServiceConfigSnafu { path })?;

        if config.relative_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.relative_path = parent.join(&config.relative_path);
            }
        }

        Ok(config)
    }

    pub fn namespace(&self) -> &str {
        if self.k8s.namespace.is_empty() {
            &self.project
        } else {
            &self.k8s.namespace
        }
    }

    /// Folder holding the manifests to apply.
    pub fn deployment_path(&self) -> PathBuf {
        let folder = if self.k8s.deployment_path.is_empty() {
            DEFAULT_DEPLOYMENT_PATH
        } else {
            &self.k8s.deployment_path
        };
        self.relative_path.join(folder)
    }

    pub fn deployment_name(&self) -> &str {
        or_service_name(&self.k8s.deployment.name, &self.name)
    }

    pub fn service_name(&self) -> &str {
        or_service_name(&self.k8s.service.name, &self.name)
    }

    pub fn ingress_name(&self) -> &str {
        or_service_name(&self.k8s.ingress.name, &self.name)
    }

    pub fn ingress_relative_path(&self) -> &str {
        &self.k8s.ingress.relative_path
    }
}

fn or_service_name<'a>(name: &'a str, service: &'a str) -> &'a str {
    if name.is_empty() { service } else { name }
}
