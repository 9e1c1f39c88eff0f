//! Cluster context bootstrap
//!
//! Establishes connectivity to the target cluster before anything is read or
//! applied: fetch user credentials, merge them into the kubeconfig store,
//! switch to the cluster context and make sure the service namespace exists.
//!
//! ```text
//! NoConfig -> CredentialsFetched -> ContextMerged -> NamespaceEnsured -> Ready
//! ```
//!
//! An explicit kubeconfig override skips straight from `NoConfig` to the
//! namespace step.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use snafu::{OptionExt, ResultExt};
use tokio::sync::{OnceCell, watch};
use tracing::{info, instrument, warn};

use crate::credentials::CredentialProvider;
use crate::environment::EnvironmentStore;
use crate::error::{
    ApplyNamespaceSnafu, BootstrapSnafu, CreateNamespaceSnafu, EmptyCredentialsSnafu,
    FetchCredentialsSnafu, MissingClusterNameSnafu, MissingContextSnafu, Result,
    UpdateKubeContextSnafu, UseKubeContextSnafu,
};
use crate::kubeconfig::{KubeConfigStore, parse_kube_config};
use crate::kubectl::{KubeCliFlags, Kubectl};
use crate::target::TargetResource;

/// Explicit kubeconfig path that bypasses credential retrieval.
pub const KUBECONFIG_ENV_VAR: &str = "KUBECONFIG";
/// Provisioning output naming the managed cluster.
pub const AKS_CLUSTER_ENV_VAR: &str = "AZURE_AKS_CLUSTER_NAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    NoConfig,
    CredentialsFetched,
    ContextMerged,
    NamespaceEnsured,
    Ready,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapState::NoConfig => "NoConfig",
            BootstrapState::CredentialsFetched => "CredentialsFetched",
            BootstrapState::ContextMerged => "ContextMerged",
            BootstrapState::NamespaceEnsured => "NamespaceEnsured",
            BootstrapState::Ready => "Ready",
        };
        f.write_str(name)
    }
}

/// Project lifecycle point the bootstrap runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    PostProvision,
    PreDeploy,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::PostProvision => f.write_str("postprovision"),
            LifecycleEvent::PreDeploy => f.write_str("predeploy"),
        }
    }
}

/// Everything the bootstrap reads, resolved up front by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub kubeconfig_override: Option<PathBuf>,
    pub cluster_name: Option<String>,
    pub namespace: String,
}

impl BootstrapConfig {
    /// Read the override and cluster name from the environment store. Empty
    /// values count as unset.
    pub fn from_environment(env: &dyn EnvironmentStore, namespace: impl Into<String>) -> Self {
        let lookup = |key: &str| env.get(key).filter(|value| !value.is_empty());
        Self {
            kubeconfig_override: lookup(KUBECONFIG_ENV_VAR).map(PathBuf::from),
            cluster_name: lookup(AKS_CLUSTER_ENV_VAR),
            namespace: namespace.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    /// Kubeconfig file kubectl now uses.
    pub kube_config: PathBuf,
    pub namespace: String,
    pub used_override: bool,
}

pub struct ClusterContextBootstrapper {
    kubectl: Arc<dyn Kubectl>,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn KubeConfigStore>,
    config: BootstrapConfig,
    target: TargetResource,
    state: watch::Sender<BootstrapState>,
    ready: OnceCell<BootstrapOutcome>,
}

impl ClusterContextBootstrapper {
    pub fn new(
        kubectl: Arc<dyn Kubectl>,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn KubeConfigStore>,
        config: BootstrapConfig,
        target: TargetResource,
    ) -> Self {
        Self {
            kubectl,
            credentials,
            store,
            config,
            target,
            state: watch::Sender::new(BootstrapState::NoConfig),
            ready: OnceCell::new(),
        }
    }

    /// Last state reached.
    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    /// Bootstrap once; later calls return the cached outcome. A failed
    /// attempt is not cached.
    pub async fn ensure(&self) -> Result<BootstrapOutcome> {
        self.ready
            .get_or_try_init(|| self.run(LifecycleEvent::PreDeploy))
            .await
            .cloned()
    }

    /// Run the whole machine again from `NoConfig`.
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn run(&self, event: LifecycleEvent) -> Result<BootstrapOutcome> {
        self.advance(BootstrapState::NoConfig);

        let (kube_config, used_override) = match &self.config.kubeconfig_override {
            Some(path) => {
                self.kubectl.set_kube_config(path);
                (path.clone(), true)
            }
            None => (self.login().await?, false),
        };

        self.ensure_namespace()
            .await
            .context(BootstrapSnafu {
                state: BootstrapState::NamespaceEnsured,
            })?;
        self.advance(BootstrapState::NamespaceEnsured);

        if used_override && event == LifecycleEvent::PreDeploy {
            warn!("Using KUBECONFIG @ {}", kube_config.display());
        }

        self.advance(BootstrapState::Ready);
        Ok(BootstrapOutcome {
            kube_config,
            namespace: self.config.namespace.clone(),
            used_override,
        })
    }

    fn advance(&self, state: BootstrapState) {
        self.state.send_replace(state);
    }

    async fn login(&self) -> Result<PathBuf> {
        let cluster = self
            .config
            .cluster_name
            .as_deref()
            .context(MissingClusterNameSnafu {
                variable: AKS_CLUSTER_ENV_VAR,
            })
            .context(BootstrapSnafu {
                state: BootstrapState::CredentialsFetched,
            })?;

        let blob = self
            .fetch_credentials(cluster)
            .await
            .context(BootstrapSnafu {
                state: BootstrapState::CredentialsFetched,
            })?;
        self.advance(BootstrapState::CredentialsFetched);

        let path = self
            .merge_context(cluster, &blob)
            .await
            .context(BootstrapSnafu {
                state: BootstrapState::ContextMerged,
            })?;
        self.advance(BootstrapState::ContextMerged);
        Ok(path)
    }

    async fn fetch_credentials(&self, cluster: &str) -> Result<Vec<u8>> {
        info!(cluster, "getting AKS credentials");
        let credentials = self
            .credentials
            .get_user_credentials(
                self.target.subscription_id(),
                self.target.resource_group_name(),
                cluster,
            )
            .await
            .context(FetchCredentialsSnafu)?;

        // only the first kubeconfig is used
        credentials
            .kubeconfigs
            .into_iter()
            .next()
            .context(EmptyCredentialsSnafu)
    }

    async fn merge_context(&self, cluster: &str, blob: &[u8]) -> Result<PathBuf> {
        let mut config = parse_kube_config(blob)?;

        let mut context = config
            .contexts
            .into_iter()
            .next()
            .context(MissingContextSnafu { cluster })?;
        context.name = cluster.to_string();
        context.context.get_or_insert_with(Default::default).namespace =
            Some(self.config.namespace.clone());
        config.contexts = vec![context];
        config.current_context = Some(cluster.to_string());

        let path = self
            .store
            .add_or_update_context(cluster, config)
            .await
            .context(UpdateKubeContextSnafu { name: cluster })?;
        self.kubectl.set_kube_config(&path);
        self.kubectl
            .use_context(cluster)
            .await
            .context(UseKubeContextSnafu { name: cluster })?;
        Ok(path)
    }

    async fn ensure_namespace(&self) -> Result<()> {
        let namespace = self.config.namespace.as_str();
        let rendered = self
            .kubectl
            .create_namespace(namespace, Some(&KubeCliFlags::dry_run_yaml()))
            .await
            .context(CreateNamespaceSnafu { namespace })?;
        self.kubectl
            .apply_with_stdin(&rendered.stdout, None)
            .await
            .context(ApplyNamespaceSnafu { namespace })?;
        info!(namespace, "namespace ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{FakeCredentials, FakeKubectl, MemoryEnvironment, MemoryKubeConfigStore};

    struct Harness {
        kubectl: Arc<FakeKubectl>,
        credentials: Arc<FakeCredentials>,
        store: Arc<MemoryKubeConfigStore>,
    }

    impl Harness {
        fn new(credentials: FakeCredentials) -> Self {
            Self {
                kubectl: Arc::new(FakeKubectl::new()),
                credentials: Arc::new(credentials),
                store: Arc::new(MemoryKubeConfigStore::default()),
            }
        }

        fn bootstrapper(&self, config: BootstrapConfig) -> ClusterContextBootstrapper {
            ClusterContextBootstrapper::new(
                self.kubectl.clone(),
                self.credentials.clone(),
                self.store.clone(),
                config,
                TargetResource::new("sub-1", "rg-todo", "aks-todo"),
            )
        }
    }

    fn cluster_config(cluster: &str) -> BootstrapConfig {
        BootstrapConfig {
            kubeconfig_override: None,
            cluster_name: Some(cluster.to_string()),
            namespace: "todo".to_string(),
        }
    }

    #[test]
    fn test_config_from_environment() {
        let env = MemoryEnvironment::default();
        env.set(AKS_CLUSTER_ENV_VAR, "aks-todo");
        env.set(KUBECONFIG_ENV_VAR, "");

        let config = BootstrapConfig::from_environment(&env, "todo");
        assert_eq!(config.cluster_name.as_deref(), Some("aks-todo"));
        assert_eq!(config.kubeconfig_override, None);
        assert_eq!(config.namespace, "todo");
    }

    #[tokio::test]
    async fn test_full_bootstrap() {
        let harness = Harness::new(FakeCredentials::for_cluster("aks-todo-admin"));
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));

        let outcome = bootstrapper.run(LifecycleEvent::PostProvision).await.unwrap();

        assert_eq!(bootstrapper.state(), BootstrapState::Ready);
        assert!(!outcome.used_override);
        assert_eq!(outcome.kube_config, PathBuf::from("/home/test/.kube/config"));
        assert_eq!(
            *harness.credentials.requests.lock().unwrap(),
            vec![(
                "sub-1".to_string(),
                "rg-todo".to_string(),
                "aks-todo".to_string()
            )]
        );

        let merged = harness.store.merged.lock().unwrap();
        let (name, config) = &merged[0];
        assert_eq!(name, "aks-todo");
        assert_eq!(config.contexts.len(), 1);
        assert_eq!(config.contexts[0].name, "aks-todo");
        assert_eq!(
            config.contexts[0]
                .context
                .as_ref()
                .and_then(|c| c.namespace.as_deref()),
            Some("todo")
        );

        let calls = harness.kubectl.calls();
        assert_eq!(calls[0], "set-kube-config /home/test/.kube/config");
        assert_eq!(calls[1], "use-context aks-todo");
        assert_eq!(calls[2], "create namespace todo --dry-run=client -o yaml");
        assert!(calls[3].starts_with("apply -f - <<apiVersion: v1"));
        assert!(calls[3].contains("name: todo"));
    }

    #[tokio::test]
    async fn test_context_without_body_still_gets_namespace() {
        let bare = "apiVersion: v1\nkind: Config\ncontexts:\n- name: aks-todo-admin\n";
        let harness = Harness::new(FakeCredentials {
            kubeconfigs: vec![bare.as_bytes().to_vec()],
            ..FakeCredentials::default()
        });
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));

        bootstrapper.run(LifecycleEvent::PostProvision).await.unwrap();

        let merged = harness.store.merged.lock().unwrap();
        let (_, config) = &merged[0];
        assert_eq!(config.contexts[0].name, "aks-todo");
        assert_eq!(
            config.contexts[0]
                .context
                .as_ref()
                .and_then(|c| c.namespace.as_deref()),
            Some("todo")
        );
    }

    #[tokio::test]
    async fn test_override_skips_credentials_and_merge() {
        let harness = Harness::new(FakeCredentials {
            fail: true,
            ..FakeCredentials::default()
        });
        let bootstrapper = harness.bootstrapper(BootstrapConfig {
            kubeconfig_override: Some(PathBuf::from("/tmp/custom-kubeconfig")),
            cluster_name: None,
            namespace: "todo".to_string(),
        });

        let outcome = bootstrapper.run(LifecycleEvent::PreDeploy).await.unwrap();

        assert!(outcome.used_override);
        assert_eq!(outcome.kube_config, PathBuf::from("/tmp/custom-kubeconfig"));
        assert!(harness.credentials.requests.lock().unwrap().is_empty());
        assert!(harness.store.merged.lock().unwrap().is_empty());
        assert_eq!(
            harness.kubectl.calls()[..2],
            [
                "set-kube-config /tmp/custom-kubeconfig".to_string(),
                "create namespace todo --dry-run=client -o yaml".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_cluster_name() {
        let harness = Harness::new(FakeCredentials::default());
        let bootstrapper = harness.bootstrapper(BootstrapConfig {
            namespace: "todo".to_string(),
            ..BootstrapConfig::default()
        });

        let err = bootstrapper.run(LifecycleEvent::PreDeploy).await.unwrap_err();
        match err {
            Error::Bootstrap { state, source } => {
                assert_eq!(state, BootstrapState::CredentialsFetched);
                assert!(matches!(*source, Error::MissingClusterName { .. }));
                assert!(source.to_string().contains(AKS_CLUSTER_ENV_VAR));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(bootstrapper.state(), BootstrapState::NoConfig);
    }

    #[tokio::test]
    async fn test_empty_credentials() {
        let harness = Harness::new(FakeCredentials::default());
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));

        let err = bootstrapper.run(LifecycleEvent::PreDeploy).await.unwrap_err();
        assert!(
            matches!(err, Error::Bootstrap { ref source, .. } if matches!(**source, Error::EmptyCredentials)),
            "{err:?}"
        );
        assert!(harness.store.merged.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credential_failure_is_wrapped() {
        let harness = Harness::new(FakeCredentials {
            fail: true,
            ..FakeCredentials::default()
        });
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));

        let err = bootstrapper.run(LifecycleEvent::PreDeploy).await.unwrap_err();
        assert!(
            matches!(err, Error::Bootstrap { ref source, .. } if matches!(**source, Error::FetchCredentials { .. })),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_use_context_failure_reports_merge_state() {
        let harness = Harness::new(FakeCredentials::for_cluster("aks-todo"));
        harness.kubectl.fail_use_context("error: no context exists");
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));

        let err = bootstrapper.run(LifecycleEvent::PreDeploy).await.unwrap_err();
        assert!(
            matches!(err, Error::Bootstrap { state: BootstrapState::ContextMerged, .. }),
            "{err:?}"
        );
        assert_eq!(bootstrapper.state(), BootstrapState::CredentialsFetched);
    }

    #[tokio::test]
    async fn test_namespace_failure() {
        let harness = Harness::new(FakeCredentials::for_cluster("aks-todo"));
        harness.kubectl.fail_apply("namespaces is forbidden");
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));

        let err = bootstrapper.run(LifecycleEvent::PreDeploy).await.unwrap_err();
        match err {
            Error::Bootstrap { state, source } => {
                assert_eq!(state, BootstrapState::NamespaceEnsured);
                assert!(matches!(*source, Error::ApplyNamespace { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_runs_once_and_run_repeats() {
        let harness = Harness::new(FakeCredentials::for_cluster("aks-todo"));
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));

        let first = bootstrapper.ensure().await.unwrap();
        let second = bootstrapper.ensure().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(harness.credentials.requests.lock().unwrap().len(), 1);

        // re-running merges the same context again without duplicating it
        bootstrapper.run(LifecycleEvent::PostProvision).await.unwrap();
        assert_eq!(harness.credentials.requests.lock().unwrap().len(), 2);
        let merged = harness.store.merged.lock().unwrap();
        assert!(merged.iter().all(|(_, config)| config.contexts.len() == 1));
    }

    #[tokio::test]
    async fn test_state_transitions_are_observable() {
        let harness = Harness::new(FakeCredentials::for_cluster("aks-todo"));
        let bootstrapper = harness.bootstrapper(cluster_config("aks-todo"));
        let receiver = bootstrapper.watch_state();

        bootstrapper.ensure().await.unwrap();
        assert_eq!(*receiver.borrow(), BootstrapState::Ready);
    }
}
