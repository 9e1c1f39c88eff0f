//! `kubectl` backed implementation of the cluster access traits

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use snafu::ResultExt;
use tracing::debug;

use super::{
    CommandOutput, KubeCliFlags, KubectlSession, ManifestApplier, ResourceReader, ResourceType,
};
use crate::error::{DecodeResourceSnafu, Result};
use crate::exec::run_command;

/// Shape of `kubectl get <kind> -o json`.
#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Default)]
struct Session {
    env: HashMap<String, String>,
    kube_config: Option<PathBuf>,
}

/// Talks to the cluster through the `kubectl` binary.
#[derive(Debug)]
pub struct KubectlCli {
    program: String,
    session: RwLock<Session>,
}

impl KubectlCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            session: RwLock::new(Session::default()),
        }
    }

    /// Kubeconfig passed with `--kubeconfig`, if one was set.
    pub fn kube_config(&self) -> Option<PathBuf> {
        self.session
            .read()
            .ok()
            .and_then(|session| session.kube_config.clone())
    }

    fn build_args(&self, args: &[&str], flags: Option<&KubeCliFlags>) -> Vec<String> {
        let mut all = Vec::new();
        if let Some(path) = self.kube_config() {
            all.push("--kubeconfig".to_string());
            all.push(path.display().to_string());
        }
        all.extend(args.iter().map(|arg| (*arg).to_string()));
        if let Some(flags) = flags {
            all.extend(flags.to_args());
        }
        all
    }

    async fn exec(
        &self,
        args: &[&str],
        flags: Option<&KubeCliFlags>,
        stdin: Option<String>,
    ) -> Result<CommandOutput> {
        let args = self.build_args(args, flags);
        let env: Vec<(String, String)> = self
            .session
            .read()
            .map(|session| {
                session
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        run_command(&self.program, &args, &env, stdin).await
    }
}

#[async_trait]
impl ManifestApplier for KubectlCli {
    async fn apply(&self, path: &Path, flags: Option<&KubeCliFlags>) -> Result<CommandOutput> {
        let path = path.display().to_string();
        self.exec(&["apply", "-f", &path], flags, None).await
    }

    async fn apply_with_stdin(
        &self,
        input: &str,
        flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput> {
        self.exec(&["apply", "-f", "-"], flags, Some(input.to_string()))
            .await
    }

    async fn create_namespace(
        &self,
        namespace: &str,
        flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput> {
        self.exec(&["create", "namespace", namespace], flags, None)
            .await
    }
}

#[async_trait]
impl ResourceReader for KubectlCli {
    async fn list(
        &self,
        kind: ResourceType,
        flags: Option<&KubeCliFlags>,
    ) -> Result<Vec<serde_json::Value>> {
        let output = self
            .exec(&["get", kind.as_str(), "-o", "json"], flags, None)
            .await?;
        if output.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }

        let list: ResourceList =
            serde_json::from_str(&output.stdout).context(DecodeResourceSnafu { kind })?;
        debug!(%kind, count = list.items.len(), "listed resources");
        Ok(list.items)
    }

    async fn rollout_status(
        &self,
        deployment: &str,
        flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput> {
        let resource = format!("deployment/{deployment}");
        self.exec(&["rollout", "status", &resource], flags, None)
            .await
    }
}

#[async_trait]
impl KubectlSession for KubectlCli {
    fn set_env(&self, env: HashMap<String, String>) {
        if let Ok(mut session) = self.session.write() {
            session.env = env;
        }
    }

    fn set_kube_config(&self, path: &Path) {
        if let Ok(mut session) = self.session.write() {
            session.kube_config = Some(path.to_path_buf());
        }
    }

    async fn use_context(&self, name: &str) -> Result<CommandOutput> {
        self.exec(&["config", "use-context", name], None, None)
            .await
    }
}
