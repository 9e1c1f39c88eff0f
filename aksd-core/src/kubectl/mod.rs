//! Cluster access contracts
//!
//! The engine never talks to the API server directly. It reads and applies
//! through these traits; [`KubectlCli`] implements all of them on top of the
//! `kubectl` binary, and tests drive the engine with doubles.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use serde::de::DeserializeOwned;

use crate::error::Result;
pub use crate::exec::CommandOutput;

mod cli;

pub use cli::KubectlCli;

/// The resource kinds the engine waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Deployment,
    Service,
    Ingress,
}

impl ResourceType {
    /// Name accepted by `kubectl get`.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Deployment => "deployment",
            ResourceType::Service => "svc",
            ResourceType::Ingress => "ing",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Kubernetes object the poller can list and identify by name.
pub trait KubeResource: DeserializeOwned + Send + 'static {
    /// Kind tag used when listing.
    const RESOURCE_TYPE: ResourceType;

    /// `metadata.name`, empty when unset.
    fn resource_name(&self) -> &str;
}

impl KubeResource for Deployment {
    const RESOURCE_TYPE: ResourceType = ResourceType::Deployment;

    fn resource_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl KubeResource for Service {
    const RESOURCE_TYPE: ResourceType = ResourceType::Service;

    fn resource_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl KubeResource for Ingress {
    const RESOURCE_TYPE: ResourceType = ResourceType::Ingress;

    fn resource_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunType {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Json,
    Yaml,
}

/// Optional flags appended to a kubectl invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeCliFlags {
    pub namespace: Option<String>,
    pub dry_run: Option<DryRunType>,
    pub output: Option<OutputType>,
}

impl KubeCliFlags {
    /// Flags for rendering a manifest locally instead of sending it.
    pub fn dry_run_yaml() -> Self {
        Self {
            dry_run: Some(DryRunType::Client),
            output: Some(OutputType::Yaml),
            ..Self::default()
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(namespace) = &self.namespace {
            args.push("-n".to_string());
            args.push(namespace.clone());
        }
        if let Some(dry_run) = self.dry_run {
            let value = match dry_run {
                DryRunType::Client => "client",
                DryRunType::Server => "server",
            };
            args.push(format!("--dry-run={value}"));
        }
        if let Some(output) = self.output {
            let value = match output {
                OutputType::Json => "json",
                OutputType::Yaml => "yaml",
            };
            args.push("-o".to_string());
            args.push(value.to_string());
        }
        args
    }
}

/// Applies manifests to the cluster.
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// `kubectl apply -f <path>`; `path` may be a file or a directory.
    async fn apply(&self, path: &Path, flags: Option<&KubeCliFlags>) -> Result<CommandOutput>;

    /// `kubectl apply -f -` fed from `input`.
    async fn apply_with_stdin(
        &self,
        input: &str,
        flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput>;

    /// `kubectl create namespace`; with dry-run flags this only renders it.
    async fn create_namespace(
        &self,
        namespace: &str,
        flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput>;
}

/// Reads cluster state.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    /// Current objects of `kind` as raw JSON documents. An empty list is not
    /// an error.
    async fn list(
        &self,
        kind: ResourceType,
        flags: Option<&KubeCliFlags>,
    ) -> Result<Vec<serde_json::Value>>;

    /// Blocks until the named deployment finishes rolling out.
    async fn rollout_status(
        &self,
        deployment: &str,
        flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput>;
}

/// Session level state of the cluster CLI.
#[async_trait]
pub trait KubectlSession: Send + Sync {
    /// Extra environment passed to every subsequent invocation.
    fn set_env(&self, env: HashMap<String, String>);

    /// Use an explicit kubeconfig file for subsequent invocations.
    fn set_kube_config(&self, path: &Path);

    /// `kubectl config use-context <name>`
    async fn use_context(&self, name: &str) -> Result<CommandOutput>;
}

/// Everything the deploy flow needs from the cluster CLI.
pub trait Kubectl: ManifestApplier + ResourceReader + KubectlSession {}

impl<T> Kubectl for T where T: ManifestApplier + ResourceReader + KubectlSession + ?Sized {}
