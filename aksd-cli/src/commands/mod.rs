//! Command handlers and the wiring of concrete collaborators

pub mod context;
pub mod deploy;
pub mod endpoints;

use std::path::Path;
use std::sync::Arc;

use aksd_core::bootstrap::AKS_CLUSTER_ENV_VAR;
use aksd_core::container::ContainerPipeline;
use aksd_core::credentials::AzCliCredentials;
use aksd_core::environment::{
    DotenvEnvironment, EnvironmentStore, RESOURCE_GROUP_ENV_VAR, SUBSCRIPTION_ID_ENV_VAR,
};
use aksd_core::kubectl::{KubectlCli, KubectlSession};
use aksd_core::{
    AksTarget, BootstrapConfig, ClusterContextBootstrapper, ServiceConfig, ServiceProgress,
    TargetResource,
};
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::docker::DockerPush;
use crate::settings::{self, Settings};
use crate::{Cli, Commands};

/// Handle a parsed command line
pub async fn handle(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Deploy {
            service,
            image,
            remote_image,
        } => deploy::handle_deploy(&cli, service, image, remote_image.as_deref()).await,
        Commands::Endpoints { service } => endpoints::handle_endpoints(&cli, service).await,
        Commands::Context { service } => context::handle_context(&cli, service).await,
    }
}

/// Collaborators for one command invocation.
pub struct CommandContext {
    pub settings: Settings,
    pub service: ServiceConfig,
    pub target: TargetResource,
    pub env: Arc<DotenvEnvironment>,
    pub kubectl: Arc<KubectlCli>,
    pub cancel: CancellationToken,
    cluster: Option<String>,
}

impl CommandContext {
    pub fn load(cli: &Cli, service_path: &Path) -> Result<Self> {
        let settings = match &cli.settings {
            Some(path) => settings::load_path(path)?,
            None => settings::load()?,
        };
        let service = ServiceConfig::load(service_path).with_context(|| {
            format!("failed to load service config {}", service_path.display())
        })?;
        let env = DotenvEnvironment::load(&cli.env_file)
            .with_context(|| format!("failed to load environment {}", cli.env_file.display()))?;

        let lookup = |flag: &Option<String>, key: &str| {
            flag.clone()
                .or_else(|| env.get(key))
                .unwrap_or_default()
        };
        let cluster = lookup(&cli.cluster, AKS_CLUSTER_ENV_VAR);
        let target = TargetResource::new(
            lookup(&cli.subscription, SUBSCRIPTION_ID_ENV_VAR),
            lookup(&cli.resource_group, RESOURCE_GROUP_ENV_VAR),
            cluster.clone(),
        );
        debug!(?target, service = %service.name, "command context loaded");

        let kubectl = Arc::new(KubectlCli::new(settings.kubectl.clone()));
        kubectl.set_env(env.dotenv());

        Ok(Self {
            settings,
            service,
            target,
            env: Arc::new(env),
            kubectl,
            cancel: cancel_on_ctrl_c(),
            cluster: (!cluster.is_empty()).then_some(cluster),
        })
    }

    pub fn bootstrapper(&self) -> Result<ClusterContextBootstrapper> {
        let mut config = BootstrapConfig::from_environment(&*self.env, self.service.namespace());
        if config.cluster_name.is_none() {
            config.cluster_name.clone_from(&self.cluster);
        }
        let store = self.settings.kubeconfig_store()?;

        Ok(ClusterContextBootstrapper::new(
            self.kubectl.clone(),
            Arc::new(AzCliCredentials::new(self.settings.az.clone())),
            Arc::new(store),
            config,
            self.target.clone(),
        ))
    }

    pub fn aks_target(&self) -> AksTarget {
        let container: Arc<dyn ContainerPipeline> =
            Arc::new(DockerPush::new(self.settings.docker.clone()));
        AksTarget::new(self.kubectl.clone(), self.env.clone(), container)
            .with_poll_options(self.settings.poll_options())
            .with_cancellation(self.cancel.clone())
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("🛑 Cancelling...");
            trigger.cancel();
        }
    });
    cancel
}

/// Print progress labels until the reporter is dropped.
pub async fn print_progress(mut receiver: mpsc::Receiver<ServiceProgress>) {
    while let Some(progress) = receiver.recv().await {
        println!("  ⏳ {}", progress.message);
    }
}
